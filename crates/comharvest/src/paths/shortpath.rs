//! Short (8.3) path lookup.

/// The short form of `path`, if the filesystem provides one.
#[cfg(windows)]
pub fn short_path(path: &str) -> Option<String> {
    use windows_sys::Win32::Storage::FileSystem::GetShortPathNameW;

    let wide: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
    let needed = unsafe { GetShortPathNameW(wide.as_ptr(), std::ptr::null_mut(), 0) };
    if needed == 0 {
        return None;
    }
    let mut buf = vec![0u16; needed as usize];
    let written = unsafe { GetShortPathNameW(wide.as_ptr(), buf.as_mut_ptr(), needed) };
    if written == 0 || written >= needed {
        return None;
    }
    Some(String::from_utf16_lossy(&buf[..written as usize]))
}

#[cfg(not(windows))]
pub fn short_path(_path: &str) -> Option<String> {
    None
}
