//! The unit a harvest produces: raw entries plus the entity trees
//! reconstructed from them.

use super::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::classify::graph::EntityTree;
use comreg::RawEntry;
use serde::Serialize;
use std::collections::HashSet;

/// Raw entries captured for one component, before classification.
#[derive(Debug, Clone, Default)]
pub struct ComponentUnit {
    pub id: String,
    pub entries: Vec<RawEntry>,
    pub diagnostics: Diagnostics,
}

impl ComponentUnit {
    pub fn new(id: impl Into<String>) -> Self {
        ComponentUnit {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_entries(id: impl Into<String>, entries: Vec<RawEntry>) -> Self {
        ComponentUnit {
            id: id.into(),
            entries,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn add_entries(&mut self, entries: impl IntoIterator<Item = RawEntry>) {
        self.entries.extend(entries);
    }

    /// Keep the first entry for every case-insensitive `(root, key, name)`
    /// and report the rest. Returns the number removed.
    pub fn remove_duplicates(&mut self) -> usize {
        let mut seen = HashSet::new();
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            if seen.insert(entry.identity()) {
                true
            } else {
                removed.push(entry.to_string());
                false
            }
        });
        for subject in &removed {
            self.diagnostics.report(
                DiagnosticKind::DuplicateEntry,
                subject.clone(),
                "duplicate registry value; keeping the first occurrence",
            );
        }
        removed.len()
    }
}

/// Final output of a harvest.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestedComponent {
    pub id: String,
    /// Reachable entity trees, in attachment order.
    pub entities: Vec<EntityTree>,
    /// Entries that were not absorbed into an entity.
    pub entries: Vec<RawEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl HarvestedComponent {
    pub fn entity_count(&self) -> usize {
        fn count(trees: &[EntityTree]) -> usize {
            trees.iter().map(|t| 1 + count(&t.children)).sum()
        }
        count(&self.entities)
    }
}
