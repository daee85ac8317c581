//! JIT specialization: a cache-aside layer promoting hot paths
//!
//! Every generic dispatch records a hit against the call's signature. Once
//! a signature crosses the configured threshold a background task asks the
//! [`Specializer`] for a faster handler and stores it when ready. The cache
//! is never needed for correctness: an evicted or still-compiling entry
//! simply sends the dispatcher down the generic path.
//!
//! A candidate for an idempotent aspect is checked against outcomes the
//! generic handler produced during real dispatches. The generic handler
//! itself is never run outside a dispatch.

mod specializer;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::core::config::JitConfig;
use crate::core::types::{Arguments, Value};
use crate::node::{CallContext, Handler, HandlerResult};
pub use specializer::{HandlerSpecializer, Specializer};

/// Canonical key for one path + argument shape
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JitSignature(String);

impl JitSignature {
    /// `prefix[/subpath...]#generation.aspect(sorted,arg,keys)`
    ///
    /// The registry generation is part of the key so a replaced node never
    /// serves a handler specialized from its predecessor.
    pub fn new(
        prefix: &str,
        generation: u64,
        subpath: &[String],
        aspect: &str,
        args: &Arguments,
    ) -> Self {
        let mut keys: Vec<&str> = args.keys().map(String::as_str).collect();
        keys.sort_unstable();

        let mut key = String::from(prefix);
        for segment in subpath {
            key.push('/');
            key.push_str(segment);
        }
        key.push_str(&format!("#{}.{}({})", generation, aspect, keys.join(",")));
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JitSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Cold,
    Compiling,
    Ready,
    /// The specializer declined or the candidate disagreed with a
    /// recorded generic outcome
    Rejected,
}

/// One generic dispatch as seen by the cache
///
/// Only idempotent aspects hand these over; their outcomes are replayed
/// against a specialized candidate before it is promoted.
pub struct Observation<'a> {
    pub cx: &'a CallContext,
    pub input: Value,
    pub outcome: &'a HandlerResult,
}

impl<'a> Observation<'a> {
    pub fn new(cx: &'a CallContext, input: Value, outcome: &'a HandlerResult) -> Self {
        Self { cx, input, outcome }
    }
}

/// Errors are kept rendered; handler errors are not `Clone`
type Recorded = Result<Value, String>;

#[derive(Clone)]
struct Sample {
    cx: CallContext,
    input: Value,
    outcome: Recorded,
}

struct JitEntry {
    hits: AtomicU64,
    last_hit_ms: AtomicU64,
    created_at: Instant,
    state: EntryState,
    idempotent: bool,
    specialized: Option<Arc<dyn Handler>>,
    samples: Vec<Sample>,
}

/// Read-only view of one cache entry
#[derive(Debug, Clone, Serialize)]
pub struct JitEntryInfo {
    pub signature: String,
    pub hits: u64,
    pub state: EntryState,
    pub age_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JitStats {
    pub entries: usize,
    pub specialized: usize,
    /// Generic hits currently recorded across live entries
    pub hits: u64,
    /// Dispatches served by a specialized handler
    pub served: u64,
    pub promotions: u64,
    pub evictions: u64,
}

struct JitInner {
    entries: DashMap<String, JitEntry>,
    config: JitConfig,
    specializer: Arc<dyn Specializer>,
    epoch: Instant,
    served: AtomicU64,
    promotions: AtomicU64,
    evictions: AtomicU64,
}

/// Shared handle to the specialization cache
#[derive(Clone)]
pub struct JitSpecializer {
    inner: Arc<JitInner>,
}

impl JitSpecializer {
    pub fn new(config: JitConfig) -> Self {
        Self::with_specializer(config, Arc::new(HandlerSpecializer))
    }

    pub fn with_specializer(config: JitConfig, specializer: Arc<dyn Specializer>) -> Self {
        Self {
            inner: Arc::new(JitInner {
                entries: DashMap::new(),
                config,
                specializer,
                epoch: Instant::now(),
                served: AtomicU64::new(0),
                promotions: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &JitConfig {
        &self.inner.config
    }

    fn now_ms(&self) -> u64 {
        self.inner.epoch.elapsed().as_millis() as u64
    }

    /// Specialized handler for the signature, if one is ready and fresh
    pub fn lookup(&self, signature: &JitSignature) -> Option<Arc<dyn Handler>> {
        if !self.inner.config.enabled {
            return None;
        }

        let entry = self.inner.entries.get(signature.as_str())?;
        let handler = entry.specialized.clone()?;
        let now = self.now_ms();
        let ttl_ms = self.inner.config.ttl_secs.saturating_mul(1000);
        if now.saturating_sub(entry.last_hit_ms.load(Ordering::Relaxed)) >= ttl_ms {
            return None;
        }

        entry.last_hit_ms.store(now, Ordering::Relaxed);
        self.inner.served.fetch_add(1, Ordering::Relaxed);
        Some(handler)
    }

    /// Count a completed generic dispatch and start compilation at the
    /// threshold
    ///
    /// `observation` is `Some` only for idempotent aspects.
    pub fn record_hit(
        &self,
        signature: &JitSignature,
        generic: &Arc<dyn Handler>,
        observation: Option<Observation<'_>>,
    ) {
        let config = &self.inner.config;
        if !config.enabled {
            return;
        }

        let now = self.now_ms();
        let mut inserted = false;
        let compile = {
            let mut entry = self
                .inner
                .entries
                .entry(signature.as_str().to_string())
                .or_insert_with(|| {
                    inserted = true;
                    JitEntry {
                        hits: AtomicU64::new(0),
                        last_hit_ms: AtomicU64::new(now),
                        created_at: Instant::now(),
                        state: EntryState::Cold,
                        idempotent: observation.is_some(),
                        specialized: None,
                        samples: Vec::new(),
                    }
                });

            let hits = entry.hits.fetch_add(1, Ordering::Relaxed) + 1;
            entry.last_hit_ms.store(now, Ordering::Relaxed);
            if let Some(observation) = observation {
                if entry.samples.len() < config.check_samples {
                    entry.samples.push(Sample {
                        cx: observation.cx.clone(),
                        input: observation.input,
                        outcome: recorded(observation.outcome),
                    });
                }
            }

            if hits >= config.threshold && entry.state == EntryState::Cold {
                entry.state = EntryState::Compiling;
                Some((entry.idempotent, entry.samples.clone()))
            } else {
                None
            }
        };

        if inserted {
            self.enforce_capacity();
        }

        let Some((idempotent, samples)) = compile else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let jit = self.clone();
                let key = signature.as_str().to_string();
                let generic = generic.clone();
                tracing::debug!(signature = %signature, "scheduling specialization");
                runtime.spawn(async move {
                    jit.compile(key, generic, idempotent, samples).await;
                });
            }
            Err(_) => {
                tracing::debug!(signature = %signature, "no runtime, specialization skipped");
                if let Some(mut entry) = self.inner.entries.get_mut(signature.as_str()) {
                    entry.state = EntryState::Cold;
                }
            }
        }
    }

    async fn compile(
        &self,
        key: String,
        generic: Arc<dyn Handler>,
        idempotent: bool,
        samples: Vec<Sample>,
    ) {
        let signature = JitSignature(key.clone());
        let candidate = self
            .inner
            .specializer
            .specialize(&signature, generic.clone())
            .await;

        // Pinning the generic handler needs no check; non-idempotent
        // candidates are never run outside a dispatch
        let accepted = match candidate {
            Some(candidate) if Arc::ptr_eq(&candidate, &generic) => Some(candidate),
            Some(candidate) if idempotent => {
                if matches_recorded(&candidate, &samples).await {
                    Some(candidate)
                } else {
                    tracing::warn!(signature = %signature, "specialized handler diverged from generic");
                    None
                }
            }
            other => other,
        };

        let Some(mut entry) = self.inner.entries.get_mut(&key) else {
            tracing::debug!(signature = %signature, "entry evicted during compilation");
            return;
        };
        match accepted {
            Some(handler) => {
                entry.specialized = Some(handler);
                entry.state = EntryState::Ready;
                entry.samples.clear();
                self.inner.promotions.fetch_add(1, Ordering::Relaxed);
                tracing::info!(signature = %signature, "promoted specialized handler");
            }
            None => {
                entry.state = EntryState::Rejected;
            }
        }
    }

    fn enforce_capacity(&self) {
        let capacity = self.inner.config.capacity;
        while self.inner.entries.len() > capacity {
            let victim = self
                .inner
                .entries
                .iter()
                .min_by_key(|entry| entry.last_hit_ms.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());
            let Some(victim) = victim else {
                break;
            };
            if self.inner.entries.remove(&victim).is_some() {
                self.inner.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(signature = %victim, "evicted least recently hit entry");
            }
        }
    }

    /// Drop entries idle for at least `max_idle`
    pub fn evict_older_than(&self, max_idle: Duration) -> usize {
        let now = self.now_ms();
        let max_idle_ms = max_idle.as_millis() as u64;
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, entry| {
            now.saturating_sub(entry.last_hit_ms.load(Ordering::Relaxed)) < max_idle_ms
        });
        let evicted = before.saturating_sub(self.inner.entries.len());
        self.inner
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    /// TTL sweep using the configured `ttl_secs`
    pub fn evict_expired(&self) -> usize {
        self.evict_older_than(Duration::from_secs(self.inner.config.ttl_secs))
    }

    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    pub fn state(&self, signature: &JitSignature) -> Option<EntryState> {
        self.inner
            .entries
            .get(signature.as_str())
            .map(|entry| entry.state)
    }

    pub fn is_specialized(&self, signature: &JitSignature) -> bool {
        self.state(signature) == Some(EntryState::Ready)
    }

    pub fn entries(&self) -> Vec<JitEntryInfo> {
        self.inner
            .entries
            .iter()
            .map(|entry| JitEntryInfo {
                signature: entry.key().clone(),
                hits: entry.hits.load(Ordering::Relaxed),
                state: entry.state,
                age_ms: entry.created_at.elapsed().as_millis() as u64,
            })
            .collect()
    }

    pub fn stats(&self) -> JitStats {
        let mut stats = JitStats {
            served: self.inner.served.load(Ordering::Relaxed),
            promotions: self.inner.promotions.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            ..JitStats::default()
        };
        for entry in self.inner.entries.iter() {
            stats.entries += 1;
            stats.hits += entry.hits.load(Ordering::Relaxed);
            if entry.state == EntryState::Ready {
                stats.specialized += 1;
            }
        }
        stats
    }
}

/// Both outcomes succeed with equal values, or both fail the same way
pub fn same_outcome(a: &HandlerResult, b: &HandlerResult) -> bool {
    match (a, b) {
        (Ok(a), Ok(b)) => a == b,
        (Err(a), Err(b)) => a.to_string() == b.to_string(),
        _ => false,
    }
}

fn recorded(outcome: &HandlerResult) -> Recorded {
    match outcome {
        Ok(value) => Ok(value.clone()),
        Err(err) => Err(err.to_string()),
    }
}

/// The candidate reproduces every outcome the generic handler produced
async fn matches_recorded(candidate: &Arc<dyn Handler>, samples: &[Sample]) -> bool {
    for sample in samples {
        let actual = recorded(&candidate.call(&sample.cx, sample.input.clone()).await);
        if actual != sample.outcome {
            return false;
        }
    }
    true
}
