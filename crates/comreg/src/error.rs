//! Error types for the comreg crate.

use crate::types::LogicalRoot;
use thiserror::Error;

/// Configuration store open/enumerate errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Key not found: {root}\\{path}")]
    KeyNotFound { root: LogicalRoot, path: String },

    #[error("Failed to open {root}\\{path}: {message}")]
    Open {
        root: LogicalRoot,
        path: String,
        message: String,
    },

    #[error("Failed to enumerate {root}\\{path}: {message}")]
    Enumerate {
        root: LogicalRoot,
        path: String,
        message: String,
    },

    #[error("Key nesting exceeds {limit} levels at {root}\\{path}")]
    TooDeep {
        root: LogicalRoot,
        path: String,
        limit: usize,
    },
}

impl StoreError {
    pub fn key_not_found(root: LogicalRoot, path: impl Into<String>) -> Self {
        StoreError::KeyNotFound {
            root,
            path: path.into(),
        }
    }

    pub fn open(root: LogicalRoot, path: impl Into<String>, msg: impl Into<String>) -> Self {
        StoreError::Open {
            root,
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn enumerate(root: LogicalRoot, path: impl Into<String>, msg: impl Into<String>) -> Self {
        StoreError::Enumerate {
            root,
            path: path.into(),
            message: msg.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_names_root_and_path() {
        let err = StoreError::open(LogicalRoot::ClassesRoot, "CLSID\\{X}", "denied");
        let text = err.to_string();
        assert!(text.contains("HKCR\\CLSID\\{X}"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn test_too_deep_error() {
        let err = StoreError::TooDeep {
            root: LogicalRoot::LocalMachine,
            path: "a\\b".to_string(),
            limit: 2,
        };
        assert!(err.to_string().contains("2 levels"));
    }
}
