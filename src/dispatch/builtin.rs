//! Base aspects answered from live metadata on every node

use serde_json::json;

use super::Dispatcher;
use crate::core::types::{Observer, Value};
use crate::node::{AspectMetadata, Node};
use crate::registry::Resolved;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Manifest,
    Witness,
    Affordances,
    Help,
}

impl Builtin {
    /// Reserved aspects are always built in; `manifest` only when undeclared
    pub(crate) fn select(aspect: &str, declared: bool) -> Option<Self> {
        match aspect {
            "witness" => Some(Builtin::Witness),
            "affordances" => Some(Builtin::Affordances),
            "help" => Some(Builtin::Help),
            "manifest" if !declared => Some(Builtin::Manifest),
            _ => None,
        }
    }

    pub(crate) fn metadata(&self) -> AspectMetadata {
        match self {
            Builtin::Manifest => AspectMetadata::read_only("Describe this node"),
            Builtin::Witness => {
                AspectMetadata::introspective("Registration history of this node")
            }
            Builtin::Affordances => {
                AspectMetadata::introspective("Aspects the caller may invoke here")
            }
            Builtin::Help => {
                AspectMetadata::introspective("Invocable aspects with their descriptions")
            }
        }
    }

    pub(crate) fn answer(
        &self,
        dispatcher: &Dispatcher,
        resolved: &Resolved,
        observer: &Observer,
    ) -> Value {
        let node = resolved.node.as_ref();
        let invocable = dispatcher.invocable(node, observer);
        match self {
            Builtin::Manifest => json!({
                "path": resolved.prefix,
                "description": node.description(),
                "aspects": invocable,
            }),
            Builtin::Witness => json!({
                "path": resolved.prefix,
                "history": dispatcher.registry().history(&resolved.prefix),
            }),
            Builtin::Affordances => json!(invocable),
            Builtin::Help => {
                let aspects: Vec<Value> = invocable
                    .iter()
                    .filter_map(|name| {
                        let metadata = describe(node, name)?;
                        Some(json!({
                            "name": name,
                            "category": metadata.category,
                            "description": metadata.description,
                            "effects": metadata.effects,
                            "idempotent": metadata.idempotent,
                        }))
                    })
                    .collect();
                json!({
                    "path": resolved.prefix,
                    "description": node.description(),
                    "aspects": aspects,
                })
            }
        }
    }
}

/// Metadata for an aspect name, declared or built in
pub(crate) fn describe(node: &dyn Node, aspect: &str) -> Option<AspectMetadata> {
    let declared = node.metadata(aspect);
    match Builtin::select(aspect, declared.is_some()) {
        Some(builtin) => Some(builtin.metadata()),
        None => declared.cloned(),
    }
}
