//! Error types for harvesting.

use comreg::{LogicalRoot, StoreError};
use thiserror::Error;

/// Errors that can occur while capturing or reconstructing registration data.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// A second redirection context was requested while one is active.
    #[error("A redirection context is already active in this process")]
    AlreadyActive,

    /// The private subtree could not be prepared.
    #[error("Failed to prepare private subtree '{path}': {message}")]
    SandboxPrepare { path: String, message: String },

    /// A hive override could not be installed.
    #[error("Failed to redirect {root}: {message}")]
    SandboxInstall { root: LogicalRoot, message: String },

    /// Overrides or the private subtree could not be removed.
    #[error("Failed to tear down redirection: {0}")]
    SandboxTeardown(String),

    /// A registry call made by the sandbox failed.
    #[error("Registry operation failed: {0}")]
    Registry(String),

    /// The configuration store could not be opened or enumerated.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A native module could not be loaded.
    #[error("Failed to load module '{path}': {message}")]
    ModuleLoad { path: String, message: String },

    /// Native harvesting needs the Windows registry.
    #[error("Native harvesting is not supported on this platform")]
    UnsupportedPlatform,

    /// Invalid parameter provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    pub fn sandbox_prepare(path: impl Into<String>, msg: impl Into<String>) -> Self {
        HarvestError::SandboxPrepare {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn sandbox_install(root: LogicalRoot, msg: impl Into<String>) -> Self {
        HarvestError::SandboxInstall {
            root,
            message: msg.into(),
        }
    }

    pub fn module_load(path: impl Into<String>, msg: impl Into<String>) -> Self {
        HarvestError::ModuleLoad {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Whether this error must abort the whole harvesting run.
    ///
    /// Sandbox integrity and store failures are fatal; everything else is
    /// reported as a warning against the file being harvested.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::AlreadyActive
                | HarvestError::SandboxPrepare { .. }
                | HarvestError::SandboxInstall { .. }
                | HarvestError::SandboxTeardown(_)
                | HarvestError::Registry(_)
                | HarvestError::Store(_)
        )
    }
}

/// Result type for harvesting operations.
pub type HarvestResult<T> = Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_errors_are_fatal() {
        assert!(HarvestError::AlreadyActive.is_fatal());
        assert!(HarvestError::sandbox_install(LogicalRoot::ClassesRoot, "denied").is_fatal());
        assert!(HarvestError::SandboxTeardown("x".into()).is_fatal());
    }

    #[test]
    fn test_module_errors_are_recoverable() {
        let err = HarvestError::module_load("C:\\x.dll", "bad image");
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("C:\\x.dll"));
        assert!(!HarvestError::UnsupportedPlatform.is_fatal());
    }

    #[test]
    fn test_install_error_names_root() {
        let err = HarvestError::sandbox_install(LogicalRoot::CurrentUser, "denied");
        assert!(err.to_string().contains("HKCU"));
    }
}
