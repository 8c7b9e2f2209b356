//! [`HiveBackend`] over the live registry.

use super::redirect::HiveBackend;
use crate::error::{HarvestError, HarvestResult};
use comreg::win32::{describe_error, predefined_key, to_wide};
use comreg::LogicalRoot;
use std::ptr;
use windows_sys::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_SUCCESS};
use windows_sys::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegDeleteTreeW, RegOpenKeyExW, RegOverridePredefKey, HKEY,
    KEY_ALL_ACCESS, REG_OPTION_NON_VOLATILE,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryBackend;

impl RegistryBackend {
    pub fn new() -> Self {
        RegistryBackend
    }
}

fn failure(base: LogicalRoot, path: &str, op: &str, code: u32) -> HarvestError {
    HarvestError::Registry(format!(
        "{} {}\\{} failed: {}",
        op,
        base,
        path,
        describe_error(code)
    ))
}

impl HiveBackend for RegistryBackend {
    fn delete_tree(&self, base: LogicalRoot, path: &str) -> HarvestResult<()> {
        let wide = to_wide(path);
        let status = unsafe { RegDeleteTreeW(predefined_key(base), wide.as_ptr()) };
        match status {
            ERROR_SUCCESS | ERROR_FILE_NOT_FOUND => Ok(()),
            code => Err(failure(base, path, "delete", code)),
        }
    }

    fn create_key(&self, base: LogicalRoot, path: &str) -> HarvestResult<()> {
        let wide = to_wide(path);
        let mut key: HKEY = ptr::null_mut();
        let status = unsafe {
            RegCreateKeyExW(
                predefined_key(base),
                wide.as_ptr(),
                0,
                ptr::null(),
                REG_OPTION_NON_VOLATILE,
                KEY_ALL_ACCESS,
                ptr::null(),
                &mut key,
                ptr::null_mut(),
            )
        };
        if status != ERROR_SUCCESS {
            return Err(failure(base, path, "create", status));
        }
        unsafe {
            RegCloseKey(key);
        }
        Ok(())
    }

    fn override_root(&self, root: LogicalRoot, base: LogicalRoot, path: &str) -> HarvestResult<()> {
        let wide = to_wide(path);
        let mut key: HKEY = ptr::null_mut();
        let status =
            unsafe { RegOpenKeyExW(predefined_key(base), wide.as_ptr(), 0, KEY_ALL_ACCESS, &mut key) };
        if status != ERROR_SUCCESS {
            return Err(failure(base, path, "open", status));
        }
        // The override keeps its own reference; the handle can be closed.
        let status = unsafe { RegOverridePredefKey(predefined_key(root), key) };
        unsafe {
            RegCloseKey(key);
        }
        if status != ERROR_SUCCESS {
            return Err(failure(base, path, &format!("override {} with", root), status));
        }
        Ok(())
    }

    fn restore_root(&self, root: LogicalRoot) -> HarvestResult<()> {
        let status = unsafe { RegOverridePredefKey(predefined_key(root), ptr::null_mut()) };
        if status != ERROR_SUCCESS {
            return Err(HarvestError::Registry(format!(
                "restore {} failed: {}",
                root,
                describe_error(status)
            )));
        }
        Ok(())
    }
}

/// Major version of the running OS.
pub fn os_major_version() -> u32 {
    use windows_sys::Win32::System::SystemInformation::GetVersion;
    let version = unsafe { GetVersion() };
    version & 0xff
}
