//! Affordance resolution: which aspects an archetype may see on a node
//!
//! Archetype polymorphism is a table lookup. A new archetype is an additive
//! grant in [`ArchetypeTable`], never a new code path.

use ahash::AHashMap;

use crate::core::types::{Archetype, Observer};
use crate::node::{AspectMetadata, Node};

/// Aspects every node exposes, in this order
pub const BASE_AFFORDANCES: [&str; 4] = ["manifest", "witness", "affordances", "help"];

/// Additive archetype → aspect-name grants
#[derive(Debug, Clone, Default)]
pub struct ArchetypeTable {
    grants: AHashMap<String, Vec<String>>,
}

impl ArchetypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant aspect names to an archetype; repeated grants accumulate
    pub fn grant<I, S>(&mut self, archetype: impl Into<String>, aspects: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.grants.entry(archetype.into()).or_default();
        for aspect in aspects {
            let aspect = aspect.into();
            if !entry.contains(&aspect) {
                entry.push(aspect);
            }
        }
    }

    pub fn granted(&self, archetype: &Archetype) -> &[String] {
        self.grants
            .get(archetype.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct AffordanceResolver {
    table: ArchetypeTable,
    unrestricted: Archetype,
}

impl AffordanceResolver {
    pub fn new(table: ArchetypeTable, unrestricted: impl Into<Archetype>) -> Self {
        Self {
            table,
            unrestricted: unrestricted.into(),
        }
    }

    pub fn is_unrestricted(&self, archetype: &Archetype) -> bool {
        *archetype == self.unrestricted
    }

    /// Ordered affordance set for `archetype` on `node`
    ///
    /// Base aspects come first in fixed order, then declared aspects in
    /// declaration order. Names granted by the node's extension function or
    /// the archetype table are kept only if the node declares them.
    pub fn resolve(&self, node: &dyn Node, archetype: &Archetype) -> Vec<String> {
        let mut visible: Vec<String> = BASE_AFFORDANCES.iter().map(|s| s.to_string()).collect();
        let unrestricted = self.is_unrestricted(archetype);
        let extended = node.extensions(archetype);
        let granted = self.table.granted(archetype);

        for entry in node.aspects() {
            if visible.contains(&entry.name) {
                continue;
            }
            if unrestricted || extended.contains(&entry.name) || granted.contains(&entry.name) {
                visible.push(entry.name.clone());
            }
        }
        visible
    }

    /// Required-archetype check; the unrestricted archetype always passes
    pub fn permits(&self, metadata: &AspectMetadata, observer: &Observer) -> bool {
        self.is_unrestricted(&observer.archetype) || metadata.permits(observer)
    }
}

impl Default for AffordanceResolver {
    fn default() -> Self {
        Self::new(ArchetypeTable::new(), "root")
    }
}
