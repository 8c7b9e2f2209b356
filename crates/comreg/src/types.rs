//! Type definitions for harvested configuration entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four top-level partitions of the configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalRoot {
    ClassesRoot,
    CurrentUser,
    LocalMachine,
    Users,
}

impl LogicalRoot {
    /// Enumeration order used when walking a redirected store.
    pub const ALL: [LogicalRoot; 4] = [
        LogicalRoot::ClassesRoot,
        LogicalRoot::CurrentUser,
        LogicalRoot::LocalMachine,
        LogicalRoot::Users,
    ];

    /// Full predefined key name (e.g. `HKEY_CLASSES_ROOT`).
    pub fn hive_name(self) -> &'static str {
        match self {
            LogicalRoot::ClassesRoot => "HKEY_CLASSES_ROOT",
            LogicalRoot::CurrentUser => "HKEY_CURRENT_USER",
            LogicalRoot::LocalMachine => "HKEY_LOCAL_MACHINE",
            LogicalRoot::Users => "HKEY_USERS",
        }
    }

    /// Abbreviated name (e.g. `HKCR`).
    pub fn short_name(self) -> &'static str {
        match self {
            LogicalRoot::ClassesRoot => "HKCR",
            LogicalRoot::CurrentUser => "HKCU",
            LogicalRoot::LocalMachine => "HKLM",
            LogicalRoot::Users => "HKU",
        }
    }

    /// Parse either the abbreviated or the full form, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        LogicalRoot::ALL.into_iter().find(|root| {
            s.eq_ignore_ascii_case(root.short_name()) || s.eq_ignore_ascii_case(root.hive_name())
        })
    }
}

impl fmt::Display for LogicalRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Kind of a harvested value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    ExpandableString,
    MultiString,
    Integer,
    Binary,
}

/// Kind-tagged value payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RegValue {
    String(String),
    ExpandableString(String),
    MultiString(Vec<String>),
    Integer(i32),
    Binary(Vec<u8>),
}

impl RegValue {
    /// Build a multi-string value. An empty list still yields one empty child.
    pub fn multi_string(items: Vec<String>) -> Self {
        if items.is_empty() {
            RegValue::MultiString(vec![String::new()])
        } else {
            RegValue::MultiString(items)
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            RegValue::String(_) => ValueKind::String,
            RegValue::ExpandableString(_) => ValueKind::ExpandableString,
            RegValue::MultiString(_) => ValueKind::MultiString,
            RegValue::Integer(_) => ValueKind::Integer,
            RegValue::Binary(_) => ValueKind::Binary,
        }
    }

    /// The string payload of a string or expandable-string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RegValue::String(s) | RegValue::ExpandableString(s) => Some(s),
            _ => None,
        }
    }

    /// Rewrite every string payload (each multi-string element independently).
    pub fn map_strings(&self, mut f: impl FnMut(&str) -> String) -> RegValue {
        match self {
            RegValue::String(s) => RegValue::String(f(s)),
            RegValue::ExpandableString(s) => RegValue::ExpandableString(f(s)),
            RegValue::MultiString(items) => {
                RegValue::MultiString(items.iter().map(|s| f(s)).collect())
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for RegValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegValue::String(s) | RegValue::ExpandableString(s) => f.write_str(s),
            RegValue::MultiString(items) => f.write_str(&items.join("[~]")),
            RegValue::Integer(n) => write!(f, "{}", n),
            RegValue::Binary(bytes) => f.write_str(&hex::encode_upper(bytes)),
        }
    }
}

/// Whether an entry writes a value or removes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryAction {
    #[default]
    Write,
    Remove,
}

/// One harvested configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub root: LogicalRoot,
    /// Backslash-delimited path relative to `root`.
    pub key: String,
    /// `None` is the default value of the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: RegValue,
    #[serde(default)]
    pub action: EntryAction,
}

impl RawEntry {
    pub fn new(
        root: LogicalRoot,
        key: impl Into<String>,
        name: Option<&str>,
        value: RegValue,
    ) -> Self {
        RawEntry {
            root,
            key: key.into(),
            name: name.filter(|n| !n.is_empty()).map(str::to_string),
            value,
            action: EntryAction::Write,
        }
    }

    /// Shorthand for a string-valued write.
    pub fn string(
        root: LogicalRoot,
        key: impl Into<String>,
        name: Option<&str>,
        value: impl Into<String>,
    ) -> Self {
        RawEntry::new(root, key, name, RegValue::String(value.into()))
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    pub fn is_write(&self) -> bool {
        self.action == EntryAction::Write
    }

    /// Case-insensitive `(root, key, name)` identity.
    pub fn identity(&self) -> EntryIdentity {
        EntryIdentity {
            root: self.root,
            key: self.key.to_lowercase(),
            name: self.name.as_ref().map(|n| n.to_lowercase()),
        }
    }

    /// Path segments of `key`.
    pub fn segments(&self) -> Vec<&str> {
        self.key.split('\\').filter(|s| !s.is_empty()).collect()
    }
}

impl fmt::Display for RawEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\\{} [{}]",
            self.root,
            self.key,
            self.name.as_deref().unwrap_or("(Default)")
        )
    }
}

/// Case-folded identity of a raw entry, used for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryIdentity {
    pub root: LogicalRoot,
    pub key: String,
    pub name: Option<String>,
}
