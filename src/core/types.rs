//! Core type definitions shared by every layer of the dispatcher

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use serde_json::Value;

/// Open key-value argument mapping handed to aspect handlers
pub type Arguments = serde_json::Map<String, Value>;

/// Role label an observer presents to the affordance resolver
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Archetype(String);

impl Archetype {
    /// Archetype used when a caller does not declare one
    pub const GUEST: &'static str = "guest";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Archetype {
    fn default() -> Self {
        Self::new(Self::GUEST)
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Archetype {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Archetype {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// The calling identity for one invocation
///
/// Observers are cheap to build and immutable once handed to the dispatcher.
/// The same logical user may present different observers to different calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observer {
    pub identity: String,
    pub archetype: Archetype,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Observer {
    pub fn new(identity: impl Into<String>, archetype: impl Into<Archetype>) -> Self {
        Self {
            identity: identity.into(),
            archetype: archetype.into(),
            permissions: BTreeSet::new(),
        }
    }

    /// An observer with a fresh random identity
    pub fn anonymous(archetype: impl Into<Archetype>) -> Self {
        Self::new(Uuid::new_v4().to_string(), archetype)
    }

    pub fn guest() -> Self {
        Self::anonymous(Archetype::default())
    }

    pub fn with_permission(mut self, tag: impl Into<String>) -> Self {
        self.permissions.insert(tag.into());
        self
    }

    pub fn has_permission(&self, tag: &str) -> bool {
        self.permissions.contains(tag)
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::guest()
    }
}
