//! Path token index.
//!
//! Maps real filesystem paths to the symbolic tokens an authoring emitter
//! resolves later:
//!
//! | key                         | token            |
//! |-----------------------------|------------------|
//! | long file path              | `[#fileId]`      |
//! | `file:///` + long file path | `file:///[#fileId]` |
//! | short (8.3) file path       | `[!fileId]`      |
//! | directory path              | `[dirId]`        |
//!
//! Keys are compared case-insensitively. The index is append-only: a key
//! keeps the first token registered for it.

use std::collections::HashMap;
use tracing::debug;

/// Token referring to a declared file by identifier.
pub fn file_token(file_id: &str) -> String {
    format!("[#{}]", file_id)
}

/// Token referring to the short-name form of a declared file.
pub fn short_file_token(file_id: &str) -> String {
    format!("[!{}]", file_id)
}

/// Token referring to a declared directory.
pub fn directory_token(dir_id: &str) -> String {
    format!("[{}]", dir_id)
}

/// The `file:///` URI form of a Windows path.
pub fn file_uri(path: &str) -> String {
    format!("file:///{}", path.replace('\\', "/"))
}

/// Extract `id` from a `[#id]` file token.
pub fn parse_file_token(value: &str) -> Option<&str> {
    let id = value.strip_prefix("[#")?.strip_suffix(']')?;
    (!id.is_empty() && !id.contains(['[', ']'])).then_some(id)
}

/// Strip a trailing separator, keeping drive roots such as `C:\` intact.
fn trim_directory(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['\\', '/']);
    if trimmed.ends_with(':') || trimmed.is_empty() {
        path
    } else {
        trimmed
    }
}

/// A registered file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileRecord {
    id: String,
    /// Lower-cased final path component.
    file_name: String,
}

/// Case-insensitive map from real paths to symbolic tokens.
#[derive(Debug, Clone, Default)]
pub struct PathTokenIndex {
    /// Lower-cased key → (original key, token), in registration order.
    substitutions: HashMap<String, (String, String)>,
    order: Vec<String>,
    /// Lower-cased long path → file.
    files: HashMap<String, FileRecord>,
}

impl PathTokenIndex {
    pub fn new() -> Self {
        PathTokenIndex::default()
    }

    /// Register a file, computing its short path on platforms that have one.
    pub fn register_file(&mut self, path: &str, file_id: &str) {
        let short = super::shortpath::short_path(path);
        self.register_file_with_short_path(path, short.as_deref(), file_id);
    }

    /// Register a file with an explicitly supplied short path.
    pub fn register_file_with_short_path(
        &mut self,
        path: &str,
        short_path: Option<&str>,
        file_id: &str,
    ) {
        self.insert(path, file_token(file_id));
        self.insert(&file_uri(path), format!("file:///{}", file_token(file_id)));
        if let Some(short) = short_path.filter(|s| !s.eq_ignore_ascii_case(path)) {
            self.insert(short, short_file_token(file_id));
        }

        let file_name = path
            .rsplit(['\\', '/'])
            .next()
            .unwrap_or(path)
            .to_lowercase();
        self.files
            .entry(path.to_lowercase())
            .or_insert_with(|| FileRecord {
                id: file_id.to_string(),
                file_name,
            });
    }

    pub fn register_directory(&mut self, path: &str, dir_id: &str) {
        self.insert(trim_directory(path), directory_token(dir_id));
    }

    fn insert(&mut self, key: &str, token: String) {
        if key.is_empty() {
            return;
        }
        let folded = key.to_lowercase();
        match self.substitutions.get(&folded) {
            Some((_, existing)) if *existing != token => {
                debug!(
                    "path index: '{}' already maps to {}, ignoring {}",
                    key, existing, token
                );
            }
            Some(_) => {}
            None => {
                self.order.push(folded.clone());
                self.substitutions
                    .insert(folded, (key.to_string(), token));
            }
        }
    }

    /// File identifier registered for exactly this long path.
    pub fn file_for_path(&self, path: &str) -> Option<&str> {
        self.files.get(&path.to_lowercase()).map(|f| f.id.as_str())
    }

    /// File identifier whose file name is `name`, when exactly one matches.
    pub fn file_for_name(&self, name: &str) -> Option<&str> {
        let folded = name.to_lowercase();
        let mut matches = self.files.values().filter(|f| f.file_name == folded);
        let first = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(first.id.as_str()),
        }
    }

    /// Token registered for `key`, if any.
    pub fn token_for(&self, key: &str) -> Option<&str> {
        self.substitutions
            .get(&key.to_lowercase())
            .map(|(_, token)| token.as_str())
    }

    /// All `(key, token)` pairs, longest key first. Ties keep registration order.
    pub fn substitutions(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(usize, &str, &str)> = self
            .order
            .iter()
            .enumerate()
            .filter_map(|(i, k)| {
                self.substitutions
                    .get(k)
                    .map(|(key, token)| (i, key.as_str(), token.as_str()))
            })
            .collect();
        pairs.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));
        pairs.into_iter().map(|(_, k, t)| (k, t)).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_file_inserts_three_forms() {
        let mut index = PathTokenIndex::new();
        index.register_file_with_short_path(
            "C:\\Program Files\\Acme\\acme.dll",
            Some("C:\\PROGRA~1\\Acme\\acme.dll"),
            "acme_dll",
        );
        assert_eq!(index.len(), 3);
        assert_eq!(
            index.token_for("c:\\program files\\acme\\ACME.DLL"),
            Some("[#acme_dll]")
        );
        assert_eq!(
            index.token_for("file:///C:/Program Files/Acme/acme.dll"),
            Some("file:///[#acme_dll]")
        );
        assert_eq!(
            index.token_for("C:\\PROGRA~1\\Acme\\acme.dll"),
            Some("[!acme_dll]")
        );
    }

    #[test]
    fn test_short_path_equal_to_long_is_skipped() {
        let mut index = PathTokenIndex::new();
        index.register_file_with_short_path("C:\\a.dll", Some("C:\\A.DLL"), "a");
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_append_only_keeps_first_token() {
        let mut index = PathTokenIndex::new();
        index.register_directory("C:\\Acme", "ACMEDIR");
        index.register_directory("c:\\acme\\", "OTHER");
        assert_eq!(index.token_for("C:\\Acme"), Some("[ACMEDIR]"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_drive_root_directory_keeps_separator() {
        let mut index = PathTokenIndex::new();
        index.register_directory("C:\\", "ROOTDRIVE");
        assert_eq!(index.token_for("C:\\"), Some("[ROOTDRIVE]"));
    }

    #[test]
    fn test_substitutions_longest_first() {
        let mut index = PathTokenIndex::new();
        index.register_directory("C:\\A", "A");
        index.register_directory("C:\\A\\B", "B");
        let keys: Vec<&str> = index.substitutions().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["C:\\A\\B", "C:\\A"]);
    }

    #[test]
    fn test_file_lookup_by_path_and_name() {
        let mut index = PathTokenIndex::new();
        index.register_file_with_short_path("C:\\x\\server.dll", None, "srv");
        assert_eq!(index.file_for_path("c:\\X\\SERVER.dll"), Some("srv"));
        assert_eq!(index.file_for_name("Server.dll"), Some("srv"));
        index.register_file_with_short_path("C:\\y\\server.dll", None, "srv2");
        assert_eq!(index.file_for_name("server.dll"), None);
    }

    #[test]
    fn test_parse_file_token() {
        assert_eq!(parse_file_token("[#fileXYZ]"), Some("fileXYZ"));
        assert_eq!(parse_file_token("[#]"), None);
        assert_eq!(parse_file_token("[!fileXYZ]"), None);
        assert_eq!(parse_file_token("C:\\x.dll"), None);
    }
}
