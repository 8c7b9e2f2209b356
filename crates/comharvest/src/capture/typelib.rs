//! Type library registration.

use super::loader::TypeLibOutcome;
use std::path::Path;

#[cfg(windows)]
pub fn register(path: &Path) -> TypeLibOutcome {
    use comreg::win32::to_wide;
    use std::ffi::c_void;
    use windows_sys::Win32::System::Ole::{LoadTypeLibEx, REGKIND_REGISTER};

    const E_ACCESSDENIED: i32 = 0x8007_0005_u32 as i32;
    const TYPE_E_REGISTRYACCESS: i32 = 0x8002_801C_u32 as i32;

    let wide = to_wide(&path.to_string_lossy());
    let mut library: *mut c_void = std::ptr::null_mut();
    let code = unsafe { LoadTypeLibEx(wide.as_ptr(), REGKIND_REGISTER, &mut library) };
    if code >= 0 {
        if !library.is_null() {
            unsafe { release(library) };
        }
        TypeLibOutcome::Registered
    } else if code == E_ACCESSDENIED || code == TYPE_E_REGISTRYACCESS {
        TypeLibOutcome::AccessDenied(code)
    } else {
        TypeLibOutcome::Failed(code)
    }
}

/// Call `IUnknown::Release` on a COM interface pointer.
#[cfg(windows)]
unsafe fn release(unknown: *mut std::ffi::c_void) {
    #[repr(C)]
    struct IUnknownVtbl {
        _query_interface: usize,
        _add_ref: usize,
        release: unsafe extern "system" fn(*mut std::ffi::c_void) -> u32,
    }
    let vtbl = *(unknown as *const *const IUnknownVtbl);
    ((*vtbl).release)(unknown);
}

#[cfg(not(windows))]
pub fn register(_path: &Path) -> TypeLibOutcome {
    TypeLibOutcome::Unsupported
}
