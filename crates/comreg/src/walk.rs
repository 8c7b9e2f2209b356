//! Recursive store walk that produces the raw entry stream.
//!
//! For each key the walk recurses into subkeys first, then emits one
//! [`RawEntry`] per value. A key with neither subkeys nor values becomes a
//! single synthetic empty-string entry so that empty keys survive
//! re-authoring, except for the managed-code category marker under a class
//! registration, which is never represented as an empty key.
//!
//! Native kinds map onto [`RegValue`]:
//! - byte sequences → binary
//! - 32-bit integers → integer
//! - string arrays → multi-string (an empty array still yields one child)
//! - everything else → string
//!
//! `REG_NONE` and unknown native types cannot be represented and are
//! reported instead of emitted.

use crate::error::{StoreError, StoreResult};
use crate::store::{join_path, ConfigStore, StoreData, StoreValue};
use crate::types::{LogicalRoot, RawEntry, RegValue};
use tracing::debug;

/// Maximum key nesting depth supported by the Windows registry.
pub const MAX_KEY_DEPTH: usize = 512;

/// Category GUID registered for managed (.NET) COM classes.
pub const DOTNET_CATEGORY: &str = "{62C8FE65-4EBB-45E7-B440-6E39B2CDBF29}";

/// A value the walk could not map to a [`RegValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unrepresentable {
    pub root: LogicalRoot,
    pub key: String,
    pub name: Option<String>,
    pub native_type: String,
}

/// Everything a walk produced.
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub entries: Vec<RawEntry>,
    pub unrepresentable: Vec<Unrepresentable>,
}

/// Map a native store value to a harvested value.
pub fn map_value(data: &StoreData) -> Option<RegValue> {
    match data {
        StoreData::Sz(s) => Some(RegValue::String(s.clone())),
        StoreData::ExpandSz(s) => Some(RegValue::ExpandableString(s.clone())),
        StoreData::MultiSz(items) => Some(RegValue::multi_string(items.clone())),
        StoreData::Dword(n) | StoreData::DwordBigEndian(n) => Some(RegValue::Integer(*n as i32)),
        StoreData::Qword(n) => Some(RegValue::String(n.to_string())),
        StoreData::Binary(bytes) => Some(RegValue::Binary(bytes.clone())),
        StoreData::None | StoreData::Other { .. } => None,
    }
}

/// Whether an empty key at `path` must not be emitted as a synthetic entry.
pub fn is_excluded_empty_key(root: LogicalRoot, path: &str) -> bool {
    if root != LogicalRoot::ClassesRoot {
        return false;
    }
    let lower = path.to_ascii_lowercase();
    lower.starts_with("clsid\\")
        && lower.ends_with(&format!(
            "\\implemented categories\\{}",
            DOTNET_CATEGORY.to_ascii_lowercase()
        ))
}

/// Walks a [`ConfigStore`] and collects raw entries.
pub struct TreeWalker<'a> {
    store: &'a dyn ConfigStore,
}

impl<'a> TreeWalker<'a> {
    pub fn new(store: &'a dyn ConfigStore) -> Self {
        TreeWalker { store }
    }

    /// Walk every logical root in [`LogicalRoot::ALL`] order.
    pub fn walk_all(&self) -> StoreResult<WalkOutput> {
        let mut out = WalkOutput::default();
        for root in LogicalRoot::ALL {
            self.walk_key(root, "", 0, &mut out)?;
        }
        debug!(
            "walk: {} entries, {} unrepresentable",
            out.entries.len(),
            out.unrepresentable.len()
        );
        Ok(out)
    }

    /// Walk a single logical root.
    pub fn walk_root(&self, root: LogicalRoot) -> StoreResult<WalkOutput> {
        let mut out = WalkOutput::default();
        self.walk_key(root, "", 0, &mut out)?;
        Ok(out)
    }

    fn walk_key(
        &self,
        root: LogicalRoot,
        path: &str,
        depth: usize,
        out: &mut WalkOutput,
    ) -> StoreResult<()> {
        if depth > MAX_KEY_DEPTH {
            return Err(StoreError::TooDeep {
                root,
                path: path.to_string(),
                limit: MAX_KEY_DEPTH,
            });
        }

        let subkeys = self.store.subkeys(root, path)?;
        for subkey in &subkeys {
            self.walk_key(root, &join_path(path, subkey), depth + 1, out)?;
        }

        let values = self.store.values(root, path)?;
        if subkeys.is_empty() && values.is_empty() {
            if !path.is_empty() && !is_excluded_empty_key(root, path) {
                out.entries
                    .push(RawEntry::new(root, path, None, RegValue::String(String::new())));
            }
            return Ok(());
        }

        for StoreValue { name, data } in values {
            match map_value(&data) {
                Some(value) => out.entries.push(RawEntry::new(root, path, Some(&name), value)),
                None => {
                    debug!(
                        "walk: {}\\{} value '{}' has unrepresentable type {}",
                        root,
                        path,
                        name,
                        data.type_name()
                    );
                    out.unrepresentable.push(Unrepresentable {
                        root,
                        key: path.to_string(),
                        name: (!name.is_empty()).then_some(name),
                        native_type: data.type_name(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_subkeys_before_values() {
        let store = MemoryStore::new();
        store.set_string(LogicalRoot::ClassesRoot, "CLSID\\{A}", "", "My Class");
        store.set_string(LogicalRoot::ClassesRoot, "CLSID\\{A}\\InprocServer32", "", "x.dll");
        let out = TreeWalker::new(&store).walk_all().unwrap();
        let keys: Vec<&str> = out.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["CLSID\\{A}\\InprocServer32", "CLSID\\{A}"]);
    }

    #[test]
    fn test_empty_key_emits_synthetic_entry() {
        let store = MemoryStore::new();
        store.create_key(LogicalRoot::ClassesRoot, "CLSID\\{A}\\Control");
        let out = TreeWalker::new(&store).walk_all().unwrap();
        assert_eq!(out.entries.len(), 1);
        assert_eq!(out.entries[0].key, "CLSID\\{A}\\Control");
        assert_eq!(out.entries[0].name, None);
        assert_eq!(out.entries[0].value, RegValue::String(String::new()));
    }

    #[test]
    fn test_dotnet_category_key_not_emitted_when_empty() {
        let store = MemoryStore::new();
        let path = format!("CLSID\\{{A}}\\Implemented Categories\\{}", DOTNET_CATEGORY);
        store.create_key(LogicalRoot::ClassesRoot, &path);
        let out = TreeWalker::new(&store).walk_all().unwrap();
        assert!(out.entries.is_empty());
    }

    #[test]
    fn test_empty_multi_string_has_one_child() {
        let store = MemoryStore::new();
        store.set_value(LogicalRoot::LocalMachine, "k", "m", StoreData::MultiSz(Vec::new()));
        let out = TreeWalker::new(&store).walk_all().unwrap();
        assert_eq!(out.entries[0].value, RegValue::MultiString(vec![String::new()]));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(map_value(&StoreData::Dword(7)), Some(RegValue::Integer(7)));
        assert_eq!(
            map_value(&StoreData::Binary(vec![1, 2])),
            Some(RegValue::Binary(vec![1, 2]))
        );
        assert_eq!(
            map_value(&StoreData::Qword(5)),
            Some(RegValue::String("5".into()))
        );
        assert_eq!(map_value(&StoreData::None), None);
    }

    #[test]
    fn test_unrepresentable_reported() {
        let store = MemoryStore::new();
        store.set_value(LogicalRoot::Users, "k", "n", StoreData::None);
        let out = TreeWalker::new(&store).walk_all().unwrap();
        assert!(out.entries.is_empty());
        assert_eq!(out.unrepresentable.len(), 1);
        assert_eq!(out.unrepresentable[0].native_type, "REG_NONE");
        assert_eq!(out.unrepresentable[0].name.as_deref(), Some("n"));
    }

    #[test]
    fn test_empty_root_emits_nothing() {
        let store = MemoryStore::new();
        let out = TreeWalker::new(&store).walk_root(LogicalRoot::Users).unwrap();
        assert!(out.entries.is_empty());
    }
}
