//! Request/response types for MCP tools.

use crate::config::HarvestConfig;
use crate::harvest::ModuleKind;
use crate::paths::PathTokenIndex;
use comreg::{EntryAction, LogicalRoot, RawEntry, RegValue};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parse an integer that may be a JSON number, a hex string ("0x80000000")
/// or a decimal string. Unsigned 32-bit values wrap into the signed range.
fn parse_integer(value: &serde_json::Value) -> Result<i32, String> {
    let wide: i64 = match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("expected a 32-bit integer, got {}", n))?,
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                i64::from_str_radix(hex, 16).map_err(|e| e.to_string())?
            } else {
                s.parse::<i64>().map_err(|e| e.to_string())?
            }
        }
        _ => return Err("expected number or hex string".to_string()),
    };
    if wide < i32::MIN as i64 || wide > u32::MAX as i64 {
        return Err(format!("{} does not fit in 32 bits", wide));
    }
    Ok(wide as u32 as i32)
}

fn expect_string(value: &serde_json::Value) -> Result<String, String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| "expected a string value".to_string())
}

/// A declared file, used to turn real paths into file tokens.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeclaredFile {
    /// File identifier in the authored output.
    pub id: String,
    /// Resolved absolute source path.
    pub path: String,
    /// Short (8.3) path. Computed from the filesystem when omitted.
    pub short_path: Option<String>,
}

/// A declared directory, used to turn real paths into directory tokens.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeclaredDirectory {
    /// Directory identifier in the authored output.
    pub id: String,
    /// Resolved absolute source path.
    pub path: String,
}

/// Build the path token index for one harvest.
pub fn build_index(files: &[DeclaredFile], directories: &[DeclaredDirectory]) -> PathTokenIndex {
    let mut index = PathTokenIndex::new();
    for file in files {
        match file.short_path.as_deref() {
            Some(short) => index.register_file_with_short_path(&file.path, Some(short), &file.id),
            None => index.register_file(&file.path, &file.id),
        }
    }
    for dir in directories {
        index.register_directory(&dir.path, &dir.id);
    }
    index
}

/// Request to harvest one file.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct HarvestFileRequest {
    /// Path of the file to harvest.
    pub path: String,
    /// Identifier of the file in the authored output.
    pub file_id: String,
    /// How to harvest the file (default: dynamic_link).
    #[serde(default)]
    pub kind: ModuleKind,
    /// Component to attach results to. Defaults to the file id.
    pub component_id: Option<String>,
    /// Files already declared for the component.
    #[serde(default)]
    pub files: Vec<DeclaredFile>,
    /// Directories already declared for the component.
    #[serde(default)]
    pub directories: Vec<DeclaredDirectory>,
    /// Harvest options.
    #[serde(default)]
    pub config: HarvestConfig,
}

/// One raw entry supplied by the caller.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EntryInput {
    /// Logical root: HKCR, HKCU, HKLM, HKU or the full hive name.
    pub root: String,
    /// Backslash-delimited key path below the root.
    pub key: String,
    /// Value name; omit for the default value.
    pub name: Option<String>,
    /// string (default), expandable_string, multi_string, integer or binary.
    pub kind: Option<String>,
    /// Payload: a string, a list of strings, a number or hex string, or hex bytes.
    pub value: serde_json::Value,
    /// Whether the entry removes the value instead of writing it.
    #[serde(default)]
    pub remove: bool,
}

impl EntryInput {
    pub fn to_entry(&self) -> Result<RawEntry, String> {
        let root = LogicalRoot::parse(&self.root)
            .ok_or_else(|| format!("unknown root '{}'", self.root))?;
        let value = match self.kind.as_deref().unwrap_or("string") {
            "string" => RegValue::String(expect_string(&self.value)?),
            "expandable_string" => RegValue::ExpandableString(expect_string(&self.value)?),
            "multi_string" => match &self.value {
                serde_json::Value::Array(items) => RegValue::multi_string(
                    items
                        .iter()
                        .map(expect_string)
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                other => RegValue::multi_string(vec![expect_string(other)?]),
            },
            "integer" => RegValue::Integer(parse_integer(&self.value)?),
            "binary" => RegValue::Binary(
                hex::decode(expect_string(&self.value)?.trim()).map_err(|e| e.to_string())?,
            ),
            other => return Err(format!("unknown value kind '{}'", other)),
        };
        let mut entry = RawEntry::new(root, self.key.clone(), self.name.as_deref(), value);
        if self.remove {
            entry.action = EntryAction::Remove;
        }
        Ok(entry)
    }
}

/// Request to classify caller-supplied entries.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ClassifyEntriesRequest {
    /// Component the entries belong to.
    pub component_id: String,
    /// Raw entries, in capture order.
    pub entries: Vec<EntryInput>,
    #[serde(default)]
    pub files: Vec<DeclaredFile>,
    #[serde(default)]
    pub directories: Vec<DeclaredDirectory>,
    #[serde(default)]
    pub config: HarvestConfig,
}

/// Request to fetch a stored harvest.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetHarvestRequest {
    /// Harvest ID returned by a previous harvest or classify call.
    pub harvest_id: String,
}

/// Summary of a stored harvest.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HarvestSummary {
    pub harvest_id: String,
    pub component_id: String,
    /// File path or "entries" for classified input.
    pub source: String,
    pub entities: usize,
    pub entries: usize,
    pub warnings: usize,
    pub created_at: String,
}

/// Server status information.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ServerStatus {
    pub version: String,
    pub stored_harvests: usize,
    pub native_harvesting: bool,
    pub override_root: String,
    pub tools: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(json: &str) -> EntryInput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_default_kind_is_string() {
        let e = input(r#"{"root": "HKCR", "key": "CLSID\\{A}", "value": "My Class"}"#)
            .to_entry()
            .unwrap();
        assert_eq!(e.root, LogicalRoot::ClassesRoot);
        assert_eq!(e.value, RegValue::String("My Class".into()));
        assert!(e.is_write());
    }

    #[test]
    fn test_hex_integer_wraps() {
        let e = input(r#"{"root": "HKLM", "key": "k", "name": "n", "kind": "integer", "value": "0x80000000"}"#)
            .to_entry()
            .unwrap();
        assert_eq!(e.value, RegValue::Integer(i32::MIN));
    }

    #[test]
    fn test_decimal_integer_forms() {
        let a = input(r#"{"root": "HKLM", "key": "k", "kind": "integer", "value": 42}"#);
        let b = input(r#"{"root": "HKLM", "key": "k", "kind": "integer", "value": "42"}"#);
        assert_eq!(a.to_entry().unwrap().value, RegValue::Integer(42));
        assert_eq!(b.to_entry().unwrap().value, RegValue::Integer(42));
    }

    #[test]
    fn test_integer_out_of_range() {
        let e = input(r#"{"root": "HKLM", "key": "k", "kind": "integer", "value": 8589934592}"#);
        assert!(e.to_entry().is_err());
    }

    #[test]
    fn test_empty_multi_string_keeps_one_child() {
        let e = input(r#"{"root": "HKLM", "key": "k", "kind": "multi_string", "value": []}"#)
            .to_entry()
            .unwrap();
        assert_eq!(e.value, RegValue::MultiString(vec![String::new()]));
    }

    #[test]
    fn test_binary_hex() {
        let e = input(r#"{"root": "HKU", "key": "k", "kind": "binary", "value": "dead01"}"#)
            .to_entry()
            .unwrap();
        assert_eq!(e.value, RegValue::Binary(vec![0xde, 0xad, 0x01]));
    }

    #[test]
    fn test_bad_root_rejected() {
        let e = input(r#"{"root": "HKEY_NOPE", "key": "k", "value": "x"}"#);
        assert!(e.to_entry().unwrap_err().contains("HKEY_NOPE"));
    }

    #[test]
    fn test_harvest_request_defaults() {
        let req: HarvestFileRequest =
            serde_json::from_str(r#"{"path": "C:\\a.dll", "file_id": "a_dll"}"#).unwrap();
        assert_eq!(req.kind, ModuleKind::DynamicLink);
        assert!(req.files.is_empty());
        assert_eq!(req.config, HarvestConfig::default());
    }

    #[test]
    fn test_build_index_uses_declared_short_path() {
        let files = vec![DeclaredFile {
            id: "a".into(),
            path: "C:\\Program Files\\a.dll".into(),
            short_path: Some("C:\\PROGRA~1\\a.dll".into()),
        }];
        let dirs = vec![DeclaredDirectory {
            id: "PF".into(),
            path: "C:\\Program Files".into(),
        }];
        let index = build_index(&files, &dirs);
        assert_eq!(index.token_for("C:\\PROGRA~1\\a.dll"), Some("[!a]"));
        assert_eq!(index.token_for("c:\\program files"), Some("[PF]"));
    }
}
