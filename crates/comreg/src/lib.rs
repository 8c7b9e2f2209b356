//! Configuration-store vocabulary for COM registration capture.
//!
//! This crate describes what a capture reads and produces:
//!
//! - [`LogicalRoot`], [`RegValue`] and [`RawEntry`], the harvested entry model
//! - [`ConfigStore`], the enumeration seam, with an in-process
//!   [`MemoryStore`] and (on Windows) the registry-backed [`win32::NativeStore`]
//! - [`TreeWalker`], which turns a store into the raw entry stream
//! - GUID-shape helpers used when classifying key segments
//!
//! # Example
//!
//! ```rust
//! use comreg::{LogicalRoot, MemoryStore, TreeWalker};
//!
//! let store = MemoryStore::new();
//! store.set_string(LogicalRoot::ClassesRoot, "MyProgId\\CLSID", "", "{00000000-0000-0000-0000-000000000001}");
//! let out = TreeWalker::new(&store).walk_all().unwrap();
//! assert_eq!(out.entries.len(), 1);
//! ```

pub mod error;
pub mod guid;
pub mod store;
pub mod types;
pub mod walk;
#[cfg(windows)]
pub mod win32;

// Re-export key types at crate root.
pub use error::{StoreError, StoreResult};
pub use guid::{is_guid_shaped, normalize_id};
pub use store::{ConfigStore, MemoryStore, StoreData, StoreValue};
pub use types::{EntryAction, EntryIdentity, LogicalRoot, RawEntry, RegValue, ValueKind};
pub use walk::{TreeWalker, Unrepresentable, WalkOutput, DOTNET_CATEGORY};
