//! Prefix-indexed node registry
//!
//! The registry is read-mostly. Every mutation builds a new snapshot and
//! swaps it in under a short write lock, so a reader either sees a node
//! fully registered or not at all. Resolution walks the path's segments from
//! longest to shortest prefix, which is bounded by the path depth.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::AHashMap;
use serde::Serialize;

use crate::core::error::{RegistryError, ResolutionError};
use crate::node::Node;
use crate::path::{parse_prefix, Path, Pattern};

/// What happened to a prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationAction {
    Registered,
    Replaced,
    Unregistered,
}

/// One entry in a prefix's audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationRecord {
    pub action: RegistrationAction,
    pub revision: u32,
    /// Seconds since the Unix epoch
    pub at: u64,
    pub aspects: Vec<String>,
}

/// Returned by a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub revision: u32,
    /// Registry-wide generation stamped on the binding
    pub generation: u64,
}

#[derive(Clone)]
struct Binding {
    node: Arc<dyn Node>,
    revision: u32,
    generation: u64,
    segments: Vec<String>,
}

#[derive(Clone, Default)]
struct Snapshot {
    bindings: AHashMap<String, Binding>,
    /// Prefixes in registration order
    order: Vec<String>,
    history: AHashMap<String, Vec<RegistrationRecord>>,
    generation: u64,
}

/// A node matched by longest-prefix resolution
#[derive(Clone)]
pub struct Resolved {
    pub node: Arc<dyn Node>,
    pub prefix: String,
    /// Path segments past the matched prefix
    pub subpath: Vec<String>,
    pub generation: u64,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("prefix", &self.prefix)
            .field("subpath", &self.subpath)
            .field("generation", &self.generation)
            .finish()
    }
}

pub struct NodeRegistry {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Snapshot) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Snapshot::clone(&guard);
        let out = f(&mut next)?;
        *guard = Arc::new(next);
        Ok(out)
    }

    /// Bind a node to its prefix
    ///
    /// Fails if the prefix is bound to a different node. Registering the
    /// identical node again is a no-op returning the existing revision.
    pub fn register(&self, node: Arc<dyn Node>) -> Result<Registration, RegistryError> {
        self.bind(node, false)
    }

    /// Bind a node, replacing whatever the prefix was bound to
    pub fn replace(&self, node: Arc<dyn Node>) -> Result<Registration, RegistryError> {
        self.bind(node, true)
    }

    fn bind(&self, node: Arc<dyn Node>, replace: bool) -> Result<Registration, RegistryError> {
        let prefix = node.prefix().to_string();
        let (context, tail) =
            parse_prefix(&prefix).map_err(|reason| RegistryError::InvalidPrefix {
                prefix: prefix.clone(),
                reason,
            })?;
        let segments: Vec<String> = std::iter::once(context.token().to_string())
            .chain(tail)
            .collect();
        let aspects: Vec<String> = node.aspects().iter().map(|e| e.name.clone()).collect();

        let registration = self.mutate(|snapshot| {
            let (action, revision) = match snapshot.bindings.get(&prefix) {
                Some(existing) if Arc::ptr_eq(&existing.node, &node) => {
                    return Ok(Registration {
                        revision: existing.revision,
                        generation: existing.generation,
                    });
                }
                Some(_) if !replace => {
                    return Err(RegistryError::AlreadyRegistered {
                        prefix: prefix.clone(),
                    });
                }
                Some(existing) => (RegistrationAction::Replaced, existing.revision + 1),
                None => {
                    snapshot.order.push(prefix.clone());
                    let revision = snapshot
                        .history
                        .get(&prefix)
                        .and_then(|records| records.last())
                        .map_or(1, |record| record.revision + 1);
                    (RegistrationAction::Registered, revision)
                }
            };

            snapshot.generation += 1;
            let generation = snapshot.generation;
            snapshot.bindings.insert(
                prefix.clone(),
                Binding {
                    node,
                    revision,
                    generation,
                    segments,
                },
            );
            snapshot
                .history
                .entry(prefix.clone())
                .or_default()
                .push(RegistrationRecord {
                    action,
                    revision,
                    at: unix_now(),
                    aspects,
                });

            Ok(Registration {
                revision,
                generation,
            })
        })?;

        tracing::info!(
            prefix = %prefix,
            revision = registration.revision,
            "registered node"
        );
        Ok(registration)
    }

    /// Remove a binding, keeping its audit trail
    pub fn unregister(&self, prefix: &str) -> Option<Arc<dyn Node>> {
        let removed = self
            .mutate(|snapshot| {
                let Some(binding) = snapshot.bindings.remove(prefix) else {
                    return Ok(None);
                };
                snapshot.order.retain(|p| p != prefix);
                snapshot.generation += 1;
                snapshot
                    .history
                    .entry(prefix.to_string())
                    .or_default()
                    .push(RegistrationRecord {
                        action: RegistrationAction::Unregistered,
                        revision: binding.revision,
                        at: unix_now(),
                        aspects: Vec::new(),
                    });
                Ok(Some(binding.node))
            })
            .ok()
            .flatten();

        if removed.is_some() {
            tracing::info!(prefix = %prefix, "unregistered node");
        }
        removed
    }

    /// Longest-prefix match of the path's node segments
    pub fn resolve(&self, path: &Path) -> Result<Resolved, ResolutionError> {
        let snapshot = self.current();
        let segments: Vec<&str> = path.prefix_segments().collect();

        // A prefix always has a context plus at least one segment
        for len in (2..=segments.len()).rev() {
            let candidate = segments[..len].join(".");
            if let Some(binding) = snapshot.bindings.get(&candidate) {
                return Ok(Resolved {
                    node: binding.node.clone(),
                    prefix: candidate,
                    subpath: segments[len..].iter().map(|s| s.to_string()).collect(),
                    generation: binding.generation,
                });
            }
        }

        tracing::debug!(path = %path, "no node matched");
        Err(ResolutionError::NoNode {
            path: path.to_string(),
        })
    }

    pub fn get(&self, prefix: &str) -> Option<Arc<dyn Node>> {
        self.current()
            .bindings
            .get(prefix)
            .map(|binding| binding.node.clone())
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.current().bindings.contains_key(prefix)
    }

    pub fn len(&self) -> usize {
        self.current().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered prefixes in registration order
    pub fn prefixes(&self) -> Vec<String> {
        self.current().order.clone()
    }

    /// Audit trail for a prefix, oldest first
    pub fn history(&self, prefix: &str) -> Vec<RegistrationRecord> {
        self.current()
            .history
            .get(prefix)
            .cloned()
            .unwrap_or_default()
    }

    /// Lazily enumerate nodes (and aspects) matching a glob pattern
    ///
    /// `*` matches one segment. A pattern as long as a node prefix yields the
    /// node; one segment longer yields `prefix.aspect` for matching declared
    /// aspects. Each call starts a fresh sequence over the current snapshot.
    pub fn query(&self, pattern: &str) -> Query {
        Query {
            snapshot: self.current(),
            pattern: Pattern::parse(pattern),
            node_index: 0,
            aspect_index: 0,
        }
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Iterator returned by [`NodeRegistry::query`]
pub struct Query {
    snapshot: Arc<Snapshot>,
    pattern: Option<Pattern>,
    node_index: usize,
    aspect_index: usize,
}

impl Iterator for Query {
    type Item = (String, Arc<dyn Node>);

    fn next(&mut self) -> Option<Self::Item> {
        let pattern = self.pattern.as_ref()?;

        while let Some(prefix) = self.snapshot.order.get(self.node_index) {
            let Some(binding) = self.snapshot.bindings.get(prefix) else {
                self.node_index += 1;
                continue;
            };
            let depth = binding.segments.len();
            let leading = pattern.matches_leading(binding.segments.iter().map(String::as_str));

            if leading && pattern.len() == depth {
                self.node_index += 1;
                return Some((prefix.clone(), binding.node.clone()));
            }

            if leading && pattern.len() == depth + 1 {
                let aspects = binding.node.aspects();
                while let Some(entry) = aspects.get(self.aspect_index) {
                    self.aspect_index += 1;
                    if pattern.matches_at(depth, &entry.name) {
                        return Some((format!("{}.{}", prefix, entry.name), binding.node.clone()));
                    }
                }
            }

            self.node_index += 1;
            self.aspect_index = 0;
        }
        None
    }
}
