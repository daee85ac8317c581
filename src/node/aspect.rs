//! Aspect metadata: category, effects and access requirements

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::types::Observer;

/// What kind of operation an aspect performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectCategory {
    ReadOnly,
    Mutating,
    Composing,
    Introspective,
    Generative,
    EntropyConsuming,
}

/// A declared side effect, naming the resource it touches
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "resource", rename_all = "snake_case")]
pub enum Effect {
    Reads(String),
    Writes(String),
    Calls(String),
    Consumes(String),
}

/// Metadata attached 1:1 to an aspect name within a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectMetadata {
    pub category: AspectCategory,
    #[serde(default)]
    pub effects: Vec<Effect>,
    /// Archetypes (or permission tags) allowed to invoke; empty means open
    #[serde(default)]
    pub required_archetypes: BTreeSet<String>,
    pub idempotent: bool,
    pub description: String,
}

impl AspectMetadata {
    pub fn new(category: AspectCategory, description: impl Into<String>) -> Self {
        let idempotent = matches!(
            category,
            AspectCategory::ReadOnly | AspectCategory::Introspective
        );
        Self {
            category,
            effects: Vec::new(),
            required_archetypes: BTreeSet::new(),
            idempotent,
            description: description.into(),
        }
    }

    pub fn read_only(description: impl Into<String>) -> Self {
        Self::new(AspectCategory::ReadOnly, description)
    }

    pub fn mutating(description: impl Into<String>) -> Self {
        Self::new(AspectCategory::Mutating, description)
    }

    pub fn introspective(description: impl Into<String>) -> Self {
        Self::new(AspectCategory::Introspective, description)
    }

    pub fn composing(description: impl Into<String>) -> Self {
        Self::new(AspectCategory::Composing, description)
    }

    pub fn generative(description: impl Into<String>) -> Self {
        Self::new(AspectCategory::Generative, description)
    }

    pub fn entropy(description: impl Into<String>) -> Self {
        Self::new(AspectCategory::EntropyConsuming, description)
    }

    pub fn requires(mut self, archetype: impl Into<String>) -> Self {
        self.required_archetypes.insert(archetype.into());
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn is_open(&self) -> bool {
        self.required_archetypes.is_empty()
    }

    /// Archetype membership or any matching permission tag satisfies the requirement
    pub fn permits(&self, observer: &Observer) -> bool {
        self.is_open()
            || self.required_archetypes.contains(observer.archetype.as_str())
            || observer
                .permissions
                .iter()
                .any(|tag| self.required_archetypes.contains(tag))
    }
}

/// A declared aspect name with its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AspectEntry {
    pub name: String,
    pub metadata: AspectMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_defaults_to_idempotent() {
        assert!(AspectMetadata::read_only("look").idempotent);
        assert!(!AspectMetadata::mutating("change").idempotent);
        assert!(!AspectMetadata::entropy("sip").idempotent);
    }

    #[test]
    fn test_permits_by_archetype_or_tag() {
        let meta = AspectMetadata::mutating("Tear it down").requires("architect");

        assert!(!meta.permits(&Observer::new("e", "explorer")));
        assert!(meta.permits(&Observer::new("a", "architect")));
        assert!(meta.permits(&Observer::new("e", "explorer").with_permission("architect")));
    }

    #[test]
    fn test_effects_serialize_tagged() {
        let effect = Effect::Writes("house".into());
        let json = serde_json::to_value(&effect).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "writes", "resource": "house"}));
    }
}
