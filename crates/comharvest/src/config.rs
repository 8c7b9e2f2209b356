//! Harvest configuration.
//!
//! Every field has a default, so requests may omit the whole block or any
//! part of it.

use crate::error::{HarvestError, HarvestResult};
use comreg::LogicalRoot;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default self-registration export.
pub const DEFAULT_ENTRY_POINT: &str = "DllRegisterServer";

/// Default location of the private redirection subtree.
pub const DEFAULT_PRIVATE_ROOT: &str = "Software\\ComHarvest\\Capture";

/// Which logical root hosts the private subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverrideRootChoice {
    /// Current-user on modern OS versions, local-machine on legacy ones.
    #[default]
    Auto,
    CurrentUser,
    LocalMachine,
}

impl OverrideRootChoice {
    pub fn resolve(self) -> LogicalRoot {
        match self {
            OverrideRootChoice::Auto => crate::sandbox::detect_override_root(),
            OverrideRootChoice::CurrentUser => LogicalRoot::CurrentUser,
            OverrideRootChoice::LocalMachine => LogicalRoot::LocalMachine,
        }
    }
}

/// Options controlling a harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HarvestConfig {
    /// Self-registration export invoked on dynamic-link modules.
    pub entry_point: String,
    /// Key path of the private redirection subtree.
    pub private_root: String,
    /// Root that hosts the private subtree.
    pub override_root: OverrideRootChoice,
    /// Also register type libraries embedded in dynamic-link modules.
    pub harvest_type_libraries: bool,
    /// Drop entries for the managed-code component category.
    pub suppress_dotnet_category: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        HarvestConfig {
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            private_root: DEFAULT_PRIVATE_ROOT.to_string(),
            override_root: OverrideRootChoice::Auto,
            harvest_type_libraries: true,
            suppress_dotnet_category: true,
        }
    }
}

impl HarvestConfig {
    /// Reject settings that would make a capture meaningless.
    pub fn validate(&self) -> HarvestResult<()> {
        if self.entry_point.trim().is_empty() {
            return Err(HarvestError::InvalidParameter(
                "'entry_point' must not be empty".to_string(),
            ));
        }
        if self.private_root.trim_matches(['\\', ' ']).is_empty() {
            return Err(HarvestError::InvalidParameter(
                "'private_root' must name a key below the override root".to_string(),
            ));
        }
        Ok(())
    }
}
