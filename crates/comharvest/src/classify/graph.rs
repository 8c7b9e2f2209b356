//! Arena-backed entity graph.
//!
//! Entities live in a flat arena and are referenced by [`EntityId`].
//! Re-parenting rebinds an index; nodes are never moved or freed. A node with
//! no parent, or whose parent chain does not reach the component, is
//! unreachable and never emitted.

use super::entity::ComEntity;
use serde::Serialize;

/// Stable handle to an entity in an [`EntityGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(usize);

/// Where an entity hangs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Component,
    Entity(EntityId),
}

#[derive(Debug, Clone)]
struct Node {
    entity: ComEntity,
    parent: Option<Parent>,
    children: Vec<EntityId>,
}

#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    nodes: Vec<Node>,
    roots: Vec<EntityId>,
}

/// An emitted entity with its nested children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityTree {
    pub entity: ComEntity,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<EntityTree>,
}

impl EntityGraph {
    pub fn new() -> Self {
        EntityGraph::default()
    }

    /// Add a detached entity.
    pub fn insert(&mut self, entity: ComEntity) -> EntityId {
        self.nodes.push(Node {
            entity,
            parent: None,
            children: Vec::new(),
        });
        EntityId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: EntityId) -> &ComEntity {
        &self.nodes[id.0].entity
    }

    pub fn get_mut(&mut self, id: EntityId) -> &mut ComEntity {
        &mut self.nodes[id.0].entity
    }

    pub fn parent(&self, id: EntityId) -> Option<Parent> {
        self.nodes[id.0].parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> {
        (0..self.nodes.len()).map(EntityId)
    }

    /// Whether `ancestor` appears on the parent chain of `id`.
    pub fn is_ancestor(&self, ancestor: EntityId, id: EntityId) -> bool {
        let mut current = self.nodes[id.0].parent;
        // Bounded by node count; chains are acyclic by construction.
        for _ in 0..self.nodes.len() {
            match current {
                Some(Parent::Entity(p)) if p == ancestor => return true,
                Some(Parent::Entity(p)) => current = self.nodes[p.0].parent,
                _ => return false,
            }
        }
        false
    }

    /// Whether the parent chain of `id` ends at the component.
    pub fn is_reachable(&self, id: EntityId) -> bool {
        let mut current = self.nodes[id.0].parent;
        for _ in 0..=self.nodes.len() {
            match current {
                Some(Parent::Component) => return true,
                Some(Parent::Entity(p)) => current = self.nodes[p.0].parent,
                None => return false,
            }
        }
        false
    }

    /// Move `id` under `parent`. Refuses, leaving the graph unchanged, when
    /// the move would make `id` its own ancestor.
    pub fn attach(&mut self, id: EntityId, parent: Parent) -> bool {
        if let Parent::Entity(p) = parent {
            if p == id || self.is_ancestor(id, p) {
                return false;
            }
        }
        self.detach(id);
        self.nodes[id.0].parent = Some(parent);
        match parent {
            Parent::Component => self.roots.push(id),
            Parent::Entity(p) => self.nodes[p.0].children.push(id),
        }
        true
    }

    /// Remove `id` from its parent. Its own children stay attached to it.
    pub fn detach(&mut self, id: EntityId) {
        match self.nodes[id.0].parent.take() {
            Some(Parent::Component) => self.roots.retain(|&r| r != id),
            Some(Parent::Entity(p)) => self.nodes[p.0].children.retain(|&c| c != id),
            None => {}
        }
    }

    /// Reachable entities as trees, in attachment order.
    pub fn to_trees(&self) -> Vec<EntityTree> {
        self.roots.iter().map(|&id| self.tree(id)).collect()
    }

    fn tree(&self, id: EntityId) -> EntityTree {
        let node = &self.nodes[id.0];
        EntityTree {
            entity: node.entity.clone(),
            children: node.children.iter().map(|&c| self.tree(c)).collect(),
        }
    }
}
