//! Windows registry store.
//!
//! Reads through the predefined root handles, so any hive overrides that are
//! active in the calling process are honored.

use crate::error::{StoreError, StoreResult};
use crate::store::{ConfigStore, StoreData, StoreValue};
use crate::types::LogicalRoot;
use std::ptr;
use windows_sys::Win32::Foundation::{
    ERROR_FILE_NOT_FOUND, ERROR_NO_MORE_ITEMS, ERROR_SUCCESS, WIN32_ERROR,
};
use windows_sys::Win32::System::Registry::{
    RegCloseKey, RegEnumKeyExW, RegEnumValueW, RegOpenKeyExW, RegQueryInfoKeyW, HKEY,
    HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS, KEY_READ, REG_BINARY,
    REG_DWORD, REG_DWORD_BIG_ENDIAN, REG_EXPAND_SZ, REG_MULTI_SZ, REG_NONE, REG_QWORD, REG_SZ,
};

/// Encode `s` as a NUL-terminated UTF-16 string.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// The predefined handle for a logical root.
pub fn predefined_key(root: LogicalRoot) -> HKEY {
    match root {
        LogicalRoot::ClassesRoot => HKEY_CLASSES_ROOT,
        LogicalRoot::CurrentUser => HKEY_CURRENT_USER,
        LogicalRoot::LocalMachine => HKEY_LOCAL_MACHINE,
        LogicalRoot::Users => HKEY_USERS,
    }
}

/// Format a Win32 error code for messages.
pub fn describe_error(code: WIN32_ERROR) -> String {
    format!("{}", std::io::Error::from_raw_os_error(code as i32))
}

/// Owned key handle, closed on drop.
struct OpenKey(HKEY);

impl Drop for OpenKey {
    fn drop(&mut self) {
        unsafe {
            RegCloseKey(self.0);
        }
    }
}

/// Size limits reported by `RegQueryInfoKeyW`.
struct KeyInfo {
    max_subkey_len: u32,
    max_value_name_len: u32,
    max_value_len: u32,
}

/// [`ConfigStore`] over the live registry of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeStore;

impl NativeStore {
    pub fn new() -> Self {
        NativeStore
    }

    fn open(&self, root: LogicalRoot, path: &str) -> StoreResult<OpenKey> {
        let wide = to_wide(path);
        let mut key: HKEY = ptr::null_mut();
        let status =
            unsafe { RegOpenKeyExW(predefined_key(root), wide.as_ptr(), 0, KEY_READ, &mut key) };
        match status {
            ERROR_SUCCESS => Ok(OpenKey(key)),
            ERROR_FILE_NOT_FOUND => Err(StoreError::key_not_found(root, path)),
            code => Err(StoreError::open(root, path, describe_error(code))),
        }
    }

    fn info(&self, key: &OpenKey, root: LogicalRoot, path: &str) -> StoreResult<KeyInfo> {
        let mut info = KeyInfo {
            max_subkey_len: 0,
            max_value_name_len: 0,
            max_value_len: 0,
        };
        let status = unsafe {
            RegQueryInfoKeyW(
                key.0,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
                ptr::null_mut(),
                &mut info.max_subkey_len,
                ptr::null_mut(),
                ptr::null_mut(),
                &mut info.max_value_name_len,
                &mut info.max_value_len,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if status != ERROR_SUCCESS {
            return Err(StoreError::enumerate(root, path, describe_error(status)));
        }
        Ok(info)
    }
}

impl ConfigStore for NativeStore {
    fn subkeys(&self, root: LogicalRoot, path: &str) -> StoreResult<Vec<String>> {
        let key = self.open(root, path)?;
        let info = self.info(&key, root, path)?;
        let mut names = Vec::new();
        let mut buf = vec![0u16; info.max_subkey_len as usize + 1];

        for index in 0.. {
            let mut len = buf.len() as u32;
            let status = unsafe {
                RegEnumKeyExW(
                    key.0,
                    index,
                    buf.as_mut_ptr(),
                    &mut len,
                    ptr::null(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            };
            match status {
                ERROR_SUCCESS => names.push(String::from_utf16_lossy(&buf[..len as usize])),
                ERROR_NO_MORE_ITEMS => break,
                code => return Err(StoreError::enumerate(root, path, describe_error(code))),
            }
        }
        Ok(names)
    }

    fn values(&self, root: LogicalRoot, path: &str) -> StoreResult<Vec<StoreValue>> {
        let key = self.open(root, path)?;
        let info = self.info(&key, root, path)?;
        let mut values = Vec::new();
        let mut name_buf = vec![0u16; info.max_value_name_len as usize + 1];
        let mut data_buf = vec![0u8; info.max_value_len as usize + 2];

        for index in 0.. {
            let mut name_len = name_buf.len() as u32;
            let mut data_len = data_buf.len() as u32;
            let mut value_type = 0u32;
            let status = unsafe {
                RegEnumValueW(
                    key.0,
                    index,
                    name_buf.as_mut_ptr(),
                    &mut name_len,
                    ptr::null(),
                    &mut value_type,
                    data_buf.as_mut_ptr(),
                    &mut data_len,
                )
            };
            match status {
                ERROR_SUCCESS => values.push(StoreValue {
                    name: String::from_utf16_lossy(&name_buf[..name_len as usize]),
                    data: decode_data(value_type, &data_buf[..data_len as usize]),
                }),
                ERROR_NO_MORE_ITEMS => break,
                code => return Err(StoreError::enumerate(root, path, describe_error(code))),
            }
        }
        Ok(values)
    }
}

/// Decode raw registry data by its native type code.
fn decode_data(value_type: u32, data: &[u8]) -> StoreData {
    match value_type {
        REG_SZ => StoreData::Sz(decode_utf16(data)),
        REG_EXPAND_SZ => StoreData::ExpandSz(decode_utf16(data)),
        REG_MULTI_SZ => StoreData::MultiSz(decode_multi_sz(data)),
        REG_DWORD if data.len() >= 4 => {
            StoreData::Dword(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
        }
        REG_DWORD_BIG_ENDIAN if data.len() >= 4 => {
            StoreData::DwordBigEndian(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
        }
        REG_QWORD if data.len() >= 8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[..8]);
            StoreData::Qword(u64::from_le_bytes(bytes))
        }
        REG_BINARY => StoreData::Binary(data.to_vec()),
        REG_NONE => StoreData::None,
        other => StoreData::Other {
            type_code: other,
            data: data.to_vec(),
        },
    }
}

fn utf16_units(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Decode a UTF-16LE string, stopping at the first NUL.
fn decode_utf16(data: &[u8]) -> String {
    let units: Vec<u16> = utf16_units(data).into_iter().take_while(|&c| c != 0).collect();
    String::from_utf16_lossy(&units)
}

/// Decode a double-NUL-terminated list of UTF-16LE strings.
fn decode_multi_sz(data: &[u8]) -> Vec<String> {
    let units = utf16_units(data);
    let mut items: Vec<String> = units
        .split(|&c| c == 0)
        .map(String::from_utf16_lossy)
        .collect();
    while items.last().is_some_and(|s| s.is_empty()) {
        items.pop();
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_sz() {
        let mut data = utf16le("Apartment");
        data.extend_from_slice(&[0, 0]);
        assert_eq!(decode_data(REG_SZ, &data), StoreData::Sz("Apartment".into()));
    }

    #[test]
    fn test_decode_multi_sz() {
        let data = utf16le("a\0bc\0\0");
        assert_eq!(
            decode_data(REG_MULTI_SZ, &data),
            StoreData::MultiSz(vec!["a".into(), "bc".into()])
        );
        assert_eq!(decode_data(REG_MULTI_SZ, &[0, 0]), StoreData::MultiSz(Vec::new()));
    }

    #[test]
    fn test_decode_dword() {
        assert_eq!(decode_data(REG_DWORD, &7u32.to_le_bytes()), StoreData::Dword(7));
    }
}
