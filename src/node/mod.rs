//! Nodes: handlers bound to a path prefix, declaring a set of aspects

pub mod aspect;
pub mod handler;

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::core::types::Archetype;
pub use aspect::{AspectCategory, AspectEntry, AspectMetadata, Effect};
pub use handler::{handler_fn, pure_fn, CallContext, FnHandler, Handler, HandlerResult, PureFn};

/// Aspect names the dispatcher answers itself on every node
pub const RESERVED_ASPECTS: [&str; 3] = ["witness", "affordances", "help"];

pub type ExtensionFn = Arc<dyn Fn(&Archetype) -> Vec<String> + Send + Sync>;

/// A registered capability reachable by path
pub trait Node: Send + Sync {
    /// Stable prefix such as `world.house`
    fn prefix(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Declared aspects in declaration order
    fn aspects(&self) -> &[AspectEntry];

    fn metadata(&self, aspect: &str) -> Option<&AspectMetadata> {
        self.aspects()
            .iter()
            .find(|entry| entry.name == aspect)
            .map(|entry| &entry.metadata)
    }

    fn resolve_aspect(&self, aspect: &str) -> Option<Arc<dyn Handler>>;

    /// Additional aspect names the archetype may see on this node
    fn extensions(&self, archetype: &Archetype) -> Vec<String> {
        default_extensions(self.aspects(), archetype)
    }
}

/// Declared aspects that are open or name the archetype explicitly
pub fn default_extensions(aspects: &[AspectEntry], archetype: &Archetype) -> Vec<String> {
    aspects
        .iter()
        .filter(|entry| {
            entry.metadata.is_open()
                || entry
                    .metadata
                    .required_archetypes
                    .contains(archetype.as_str())
        })
        .map(|entry| entry.name.clone())
        .collect()
}

/// A node assembled from a fixed table of handlers
pub struct StaticNode {
    prefix: String,
    description: String,
    aspects: Vec<AspectEntry>,
    handlers: AHashMap<String, Arc<dyn Handler>>,
    extension: Option<ExtensionFn>,
}

impl StaticNode {
    pub fn builder(prefix: impl Into<String>) -> NodeBuilder {
        NodeBuilder {
            node: StaticNode {
                prefix: prefix.into(),
                description: String::new(),
                aspects: Vec::new(),
                handlers: AHashMap::new(),
                extension: None,
            },
        }
    }
}

impl Node for StaticNode {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn aspects(&self) -> &[AspectEntry] {
        &self.aspects
    }

    fn resolve_aspect(&self, aspect: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(aspect).cloned()
    }

    fn extensions(&self, archetype: &Archetype) -> Vec<String> {
        match &self.extension {
            Some(extension) => extension(archetype),
            None => default_extensions(&self.aspects, archetype),
        }
    }
}

impl fmt::Debug for StaticNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticNode")
            .field("prefix", &self.prefix)
            .field("aspects", &self.aspects)
            .finish()
    }
}

pub struct NodeBuilder {
    node: StaticNode,
}

impl NodeBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.node.description = description.into();
        self
    }

    pub fn aspect(
        self,
        name: impl Into<String>,
        metadata: AspectMetadata,
        handler: impl Handler + 'static,
    ) -> Self {
        self.aspect_arc(name, metadata, Arc::new(handler))
    }

    /// Declare an aspect; a later declaration of the same name replaces it
    pub fn aspect_arc(
        mut self,
        name: impl Into<String>,
        metadata: AspectMetadata,
        handler: Arc<dyn Handler>,
    ) -> Self {
        let name = name.into();
        if RESERVED_ASPECTS.contains(&name.as_str()) {
            tracing::warn!(
                prefix = %self.node.prefix,
                aspect = %name,
                "ignoring declaration of reserved aspect"
            );
            return self;
        }

        self.node.aspects.retain(|entry| entry.name != name);
        self.node.aspects.push(AspectEntry {
            name: name.clone(),
            metadata,
        });
        self.node.handlers.insert(name, handler);
        self
    }

    /// Replace the default archetype-extension function
    pub fn extension<F>(mut self, extension: F) -> Self
    where
        F: Fn(&Archetype) -> Vec<String> + Send + Sync + 'static,
    {
        self.node.extension = Some(Arc::new(extension));
        self
    }

    pub fn build(self) -> StaticNode {
        self.node
    }
}
