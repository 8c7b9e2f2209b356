//! Process-wide hive redirection used while a module registers itself.

pub mod redirect;
#[cfg(windows)]
pub mod win32;

pub use redirect::{HiveBackend, Redirector, SandboxLayout};

use comreg::LogicalRoot;

/// First OS major version where redirecting into current-user avoids an
/// elevation prompt.
const MODERN_OS_MAJOR: u32 = 6;

/// Pick the root hosting the private subtree for a given OS major version.
pub fn override_root_for(os_major: u32) -> LogicalRoot {
    if os_major >= MODERN_OS_MAJOR {
        LogicalRoot::CurrentUser
    } else {
        LogicalRoot::LocalMachine
    }
}

#[cfg(windows)]
pub fn detect_override_root() -> LogicalRoot {
    override_root_for(win32::os_major_version())
}

#[cfg(not(windows))]
pub fn detect_override_root() -> LogicalRoot {
    LogicalRoot::CurrentUser
}
