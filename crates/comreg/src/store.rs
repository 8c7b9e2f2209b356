//! Configuration store access.
//!
//! [`ConfigStore`] abstracts the hierarchical key/value store that a capture
//! enumerates after registration. [`MemoryStore`] is a case-insensitive,
//! in-process implementation; the Windows registry implementation lives in
//! [`crate::win32`].

use crate::error::{StoreError, StoreResult};
use crate::types::LogicalRoot;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// A value as the underlying store reports it, before kind mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreData {
    None,
    Sz(String),
    ExpandSz(String),
    MultiSz(Vec<String>),
    Dword(u32),
    DwordBigEndian(u32),
    Qword(u64),
    Binary(Vec<u8>),
    /// Any other native type code with its raw bytes.
    Other { type_code: u32, data: Vec<u8> },
}

impl StoreData {
    /// Short native type name, used in diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            StoreData::None => "REG_NONE".to_string(),
            StoreData::Sz(_) => "REG_SZ".to_string(),
            StoreData::ExpandSz(_) => "REG_EXPAND_SZ".to_string(),
            StoreData::MultiSz(_) => "REG_MULTI_SZ".to_string(),
            StoreData::Dword(_) => "REG_DWORD".to_string(),
            StoreData::DwordBigEndian(_) => "REG_DWORD_BIG_ENDIAN".to_string(),
            StoreData::Qword(_) => "REG_QWORD".to_string(),
            StoreData::Binary(_) => "REG_BINARY".to_string(),
            StoreData::Other { type_code, .. } => format!("type {}", type_code),
        }
    }
}

/// A named value under a key. An empty name is the key's default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreValue {
    pub name: String,
    pub data: StoreData,
}

/// Read access to a hierarchical configuration store.
pub trait ConfigStore {
    /// Names of the direct subkeys of `path` under `root`.
    fn subkeys(&self, root: LogicalRoot, path: &str) -> StoreResult<Vec<String>>;

    /// Values stored directly under `path`.
    fn values(&self, root: LogicalRoot, path: &str) -> StoreResult<Vec<StoreValue>>;
}

/// Split a backslash-delimited key path into its non-empty segments.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('\\').filter(|s| !s.is_empty())
}

/// Join a parent path and a child name.
pub fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}\\{}", parent, child)
    }
}

#[derive(Debug, Default)]
struct Node {
    /// Key name with its original casing.
    name: String,
    /// Children keyed by lower-cased name.
    children: BTreeMap<String, Node>,
    /// Values in insertion order.
    values: Vec<StoreValue>,
}

impl Node {
    fn named(name: &str) -> Self {
        Node {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn find(&self, path: &str) -> Option<&Node> {
        let mut current = self;
        for segment in split_path(path) {
            current = current.children.get(&segment.to_lowercase())?;
        }
        Some(current)
    }

    fn find_or_create(&mut self, path: &str) -> &mut Node {
        let mut current = self;
        for segment in split_path(path) {
            current = current
                .children
                .entry(segment.to_lowercase())
                .or_insert_with(|| Node::named(segment));
        }
        current
    }
}

/// In-process, case-insensitive configuration store.
///
/// Subkeys enumerate in case-insensitive name order; values enumerate in
/// insertion order. Interior mutability lets a registration routine write
/// into the store while a capture holds a shared reference to it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    roots: RwLock<HashMap<LogicalRoot, Node>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Create `path` (and any missing ancestors).
    pub fn create_key(&self, root: LogicalRoot, path: &str) {
        let mut roots = self.roots.write();
        roots.entry(root).or_default().find_or_create(path);
    }

    /// Set a value, replacing any existing value with the same name.
    pub fn set_value(&self, root: LogicalRoot, path: &str, name: &str, data: StoreData) {
        let mut roots = self.roots.write();
        let node = roots.entry(root).or_default().find_or_create(path);
        match node
            .values
            .iter_mut()
            .find(|v| v.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.data = data,
            None => node.values.push(StoreValue {
                name: name.to_string(),
                data,
            }),
        }
    }

    /// Shorthand for writing a string value.
    pub fn set_string(&self, root: LogicalRoot, path: &str, name: &str, value: &str) {
        self.set_value(root, path, name, StoreData::Sz(value.to_string()));
    }

    /// Delete `path` and everything beneath it. Returns false when absent.
    pub fn delete_tree(&self, root: LogicalRoot, path: &str) -> bool {
        let segments: Vec<String> = split_path(path).map(str::to_lowercase).collect();
        let mut roots = self.roots.write();
        let Some(mut current) = roots.get_mut(&root) else {
            return false;
        };

        let Some((last, parents)) = segments.split_last() else {
            // Deleting the root itself clears it.
            let existed = !current.children.is_empty() || !current.values.is_empty();
            *current = Node::default();
            return existed;
        };

        for segment in parents {
            match current.children.get_mut(segment) {
                Some(child) => current = child,
                None => return false,
            }
        }
        current.children.remove(last).is_some()
    }

    pub fn key_exists(&self, root: LogicalRoot, path: &str) -> bool {
        let roots = self.roots.read();
        roots.get(&root).and_then(|n| n.find(path)).is_some()
    }

    /// Whether nothing at all is stored under any root.
    pub fn is_empty(&self) -> bool {
        let roots = self.roots.read();
        roots
            .values()
            .all(|n| n.children.is_empty() && n.values.is_empty())
    }
}

impl ConfigStore for MemoryStore {
    fn subkeys(&self, root: LogicalRoot, path: &str) -> StoreResult<Vec<String>> {
        let roots = self.roots.read();
        let Some(root_node) = roots.get(&root) else {
            // Predefined roots always exist, even when empty.
            return if split_path(path).next().is_none() {
                Ok(Vec::new())
            } else {
                Err(StoreError::key_not_found(root, path))
            };
        };
        let node = root_node
            .find(path)
            .ok_or_else(|| StoreError::key_not_found(root, path))?;
        Ok(node.children.values().map(|c| c.name.clone()).collect())
    }

    fn values(&self, root: LogicalRoot, path: &str) -> StoreResult<Vec<StoreValue>> {
        let roots = self.roots.read();
        let Some(root_node) = roots.get(&root) else {
            return if split_path(path).next().is_none() {
                Ok(Vec::new())
            } else {
                Err(StoreError::key_not_found(root, path))
            };
        };
        let node = root_node
            .find(path)
            .ok_or_else(|| StoreError::key_not_found(root, path))?;
        Ok(node.values.clone())
    }
}
