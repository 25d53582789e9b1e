//! Kind compatibility index
//!
//! Per kind name, the list of (block type, property, role) entries that can
//! legally receive a connection carrying that kind. Loaded once from the
//! catalog's `kinds_connections` and never mutated.

use std::collections::BTreeMap;

use crate::catalog::{CompatibleElement, KindName, PropertyDefinition, WILDCARD_KIND};

/// Read-only lookup table of legal kind connections
#[derive(Debug, Clone, Default)]
pub struct KindCompatibilityIndex {
    kinds: BTreeMap<KindName, Vec<PropertyDefinition>>,
}

impl KindCompatibilityIndex {
    /// Build the index from the catalog `kinds_connections` table
    pub fn new(kinds_connections: BTreeMap<KindName, Vec<PropertyDefinition>>) -> Self {
        Self {
            kinds: kinds_connections,
        }
    }

    /// All entries registered for a kind
    pub fn entries_for_kind(&self, kind: &str) -> &[PropertyDefinition] {
        self.kinds.get(kind).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// First entry under `kind` (then under the wildcard kind) for the given
    /// block type and role
    pub fn find(
        &self,
        kind: &str,
        manifest_type_identifier: &str,
        role: CompatibleElement,
    ) -> Option<&PropertyDefinition> {
        let matches = |entry: &&PropertyDefinition| {
            entry.manifest_type_identifier == manifest_type_identifier
                && entry.compatible_element == role
        };
        self.entries_for_kind(kind).iter().find(matches).or_else(|| {
            if kind == WILDCARD_KIND {
                None
            } else {
                self.entries_for_kind(WILDCARD_KIND).iter().find(matches)
            }
        })
    }

    /// Kind names with at least one entry
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
