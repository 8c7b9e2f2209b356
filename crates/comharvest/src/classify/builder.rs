//! Builds the entity graph for one component.
//!
//! Pipeline:
//! 1. drop duplicate `(root, key, name)` entries, first one wins
//! 2. group classes-root string writes by [`GroupIndex`]
//! 3. resolve each group's fields into an entity
//! 4. attach each entity under its inferred parent, or the component
//! 5. swap CoClass/AppId so the AppId owns the class
//! 6. discard classes whose ProgIds did not end up nested under them
//! 7. prune the raw entries absorbed by reachable entities
//!
//! Step 7 only prunes entries of entities that are reachable from the
//! component. Entries behind a discarded or unattached entity stay in the
//! raw list even though they were mapped onto a field.

use super::entity::ComEntity;
use super::graph::{EntityGraph, EntityId, Parent};
use super::rules::{self, GroupEntry, RuleContext};
use super::taxonomy::{classify_key, GroupIndex, Taxonomy};
use crate::config::HarvestConfig;
use crate::harvest::component::ComponentUnit;
use crate::paths::PathTokenIndex;
use comreg::{LogicalRoot, RawEntry, RegValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// An entity that was resolved but not yet attached.
struct Pending {
    id: EntityId,
    parents: Vec<GroupIndex>,
    invalid: bool,
}

pub struct Classifier<'a> {
    index: &'a PathTokenIndex,
    suppress_dotnet_category: bool,
}

impl<'a> Classifier<'a> {
    pub fn new(index: &'a PathTokenIndex, config: &HarvestConfig) -> Self {
        Classifier {
            index,
            suppress_dotnet_category: config.suppress_dotnet_category,
        }
    }

    /// Classify `component`'s entries into an entity graph, removing the
    /// entries the graph now represents.
    pub fn classify(&self, component: &mut ComponentUnit) -> EntityGraph {
        component.remove_duplicates();

        let mut groups: BTreeMap<GroupIndex, Vec<usize>> = BTreeMap::new();
        let mut dropped: HashSet<usize> = HashSet::new();
        for (position, entry) in component.entries.iter().enumerate() {
            if entry.root != LogicalRoot::ClassesRoot
                || !entry.is_write()
                || !matches!(entry.value, RegValue::String(_))
            {
                continue;
            }
            match classify_key(&entry.segments()) {
                Taxonomy::Entity(group) => groups.entry(group).or_default().push(position),
                Taxonomy::DotNetCategory if self.suppress_dotnet_category => {
                    debug!("classify: dropping managed-code category entry {}", entry);
                    dropped.insert(position);
                }
                _ => {}
            }
        }

        let mut graph = EntityGraph::new();
        let mut by_group: HashMap<GroupIndex, EntityId> = HashMap::new();
        let mut pending = Vec::new();
        let mut sources: Vec<(usize, EntityId)> = Vec::new();

        for (group, positions) in &groups {
            let prepared = self.prepare(group, positions, &component.entries);
            let display_id = component.entries[positions[0]]
                .segments()
                .first()
                .map(|s| s.to_string())
                .unwrap_or_default();

            let mut ctx = RuleContext {
                index: self.index,
                diagnostics: &mut component.diagnostics,
            };
            let resolution = rules::resolve(group, &display_id, &prepared, &mut ctx);
            if resolution.resolved.is_empty() {
                continue;
            }

            let id = graph.insert(resolution.entity);
            by_group.insert(group.clone(), id);
            sources.extend(resolution.resolved.iter().map(|&p| (p, id)));
            if resolution.invalid {
                debug!("classify: {} has conflicting values, discarding", group);
            }
            pending.push(Pending {
                id,
                parents: resolution.parents,
                invalid: resolution.invalid,
            });
        }

        for item in pending {
            if item.invalid {
                continue;
            }
            let attached = item
                .parents
                .iter()
                .filter_map(|p| by_group.get(p))
                .any(|&parent| graph.attach(item.id, Parent::Entity(parent)));
            if !attached {
                graph.attach(item.id, Parent::Component);
            }
        }

        self.swap_app_ids(&mut graph, &by_group);
        self.verify_prog_ids(&mut graph, &by_group);

        let mut remove: HashSet<usize> = sources
            .into_iter()
            .filter(|&(_, id)| graph.is_reachable(id))
            .map(|(position, _)| position)
            .collect();
        remove.extend(dropped);

        let before = component.entries.len();
        let mut position = 0;
        component.entries.retain(|_| {
            let keep = !remove.contains(&position);
            position += 1;
            keep
        });
        debug!(
            "classify: {} entities, {} of {} entries absorbed",
            graph.len(),
            before - component.entries.len(),
            before
        );
        graph
    }

    fn prepare<'e>(
        &self,
        group: &GroupIndex,
        positions: &[usize],
        entries: &'e [RawEntry],
    ) -> Vec<GroupEntry<'e>> {
        positions
            .iter()
            .filter_map(|&position| {
                let entry = &entries[position];
                let value = entry.value.as_str()?;
                Some(GroupEntry {
                    position,
                    rel: entry
                        .segments()
                        .iter()
                        .skip(group.prefix_len())
                        .map(|s| s.to_lowercase())
                        .collect(),
                    name: entry.name.as_ref().map(|n| n.to_lowercase()),
                    value,
                    subject: entry.to_string(),
                })
            })
            .collect()
    }

    /// Move each referenced AppId to its class's parent and the class under
    /// the AppId.
    fn swap_app_ids(&self, graph: &mut EntityGraph, by_group: &HashMap<GroupIndex, EntityId>) {
        let classes: Vec<(EntityId, String)> = graph
            .ids()
            .filter_map(|id| match graph.get(id) {
                ComEntity::CoClass(class) => class.app_id.clone().map(|app| (id, app)),
                _ => None,
            })
            .collect();

        for (class, app_id) in classes {
            let Some(&app) = by_group.get(&GroupIndex::app_id(&app_id)) else {
                continue;
            };
            let Some(original) = graph.parent(class) else {
                continue;
            };
            if original == Parent::Entity(app) {
                continue;
            }
            if graph.attach(app, original) && graph.attach(class, Parent::Entity(app)) {
                debug!("classify: class {} moved under AppID {}", graph.get(class).id(), app_id);
            }
        }
    }

    /// Discard classes whose ProgIds are not nested beneath them.
    fn verify_prog_ids(&self, graph: &mut EntityGraph, by_group: &HashMap<GroupIndex, EntityId>) {
        let checks: Vec<(EntityId, Vec<String>)> = graph
            .ids()
            .filter(|&id| graph.parent(id).is_some())
            .filter_map(|id| match graph.get(id) {
                ComEntity::CoClass(class) => Some((
                    id,
                    class
                        .prog_id
                        .iter()
                        .chain(class.version_independent_prog_id.iter())
                        .cloned()
                        .collect(),
                )),
                _ => None,
            })
            .collect();

        for (class, prog_ids) in checks {
            let nested = prog_ids.iter().all(|name| {
                by_group
                    .get(&GroupIndex::prog_id(name))
                    .is_some_and(|&p| graph.is_ancestor(class, p))
            });
            if !nested {
                debug!(
                    "classify: class {} discarded, ProgIds {:?} not nested under it",
                    graph.get(class).id(),
                    prog_ids
                );
                graph.detach(class);
            }
        }
    }
}
