//! Loading native modules and invoking their registration exports.

use crate::error::{HarvestError, HarvestResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Outcome of calling a registration export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// The module has no export with that name.
    NotFound,
    Succeeded,
    /// The export returned a failure `HRESULT`.
    Failed(i32),
}

/// Outcome of registering a type library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeLibOutcome {
    Registered,
    AccessDenied(i32),
    Failed(i32),
    /// Type library registration is not available on this platform.
    Unsupported,
}

/// A loaded module. Dropping it unloads the module.
pub trait NativeModule {
    /// Call a zero-argument, `HRESULT`-returning export.
    fn invoke(&mut self, entry_point: &str) -> Invocation;
}

/// Loads modules and registers type libraries.
pub trait NativeLoader: Send + Sync {
    fn load(&self, path: &Path) -> HarvestResult<Box<dyn NativeModule>>;

    fn register_type_library(&self, path: &Path) -> TypeLibOutcome;
}

/// Whether `path` starts with the `MZ` executable header.
pub fn has_module_header(path: &Path) -> HarvestResult<bool> {
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == b"MZ"),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Format an `HRESULT` the way it is usually quoted.
pub fn hresult(code: i32) -> String {
    format!("0x{:08X}", code as u32)
}

/// [`NativeLoader`] backed by `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibLoader;

impl LibLoader {
    pub fn new() -> Self {
        LibLoader
    }
}

struct LoadedModule {
    library: libloading::Library,
}

type RegistrationFn = unsafe extern "system" fn() -> i32;

impl NativeModule for LoadedModule {
    fn invoke(&mut self, entry_point: &str) -> Invocation {
        let mut symbol = entry_point.as_bytes().to_vec();
        symbol.push(0);
        let function = match unsafe { self.library.get::<RegistrationFn>(&symbol) } {
            Ok(f) => f,
            Err(e) => {
                debug!("loader: export {} not found: {}", entry_point, e);
                return Invocation::NotFound;
            }
        };
        let code = unsafe { function() };
        if code >= 0 {
            Invocation::Succeeded
        } else {
            Invocation::Failed(code)
        }
    }
}

impl NativeLoader for LibLoader {
    fn load(&self, path: &Path) -> HarvestResult<Box<dyn NativeModule>> {
        let path_text = path.display().to_string();
        if !has_module_header(path)? {
            return Err(HarvestError::module_load(path_text, "not a dynamic-link module"));
        }
        let library = unsafe { libloading::Library::new(path) }
            .map_err(|e| HarvestError::module_load(&path_text, e.to_string()))?;
        debug!("loader: loaded {}", path_text);
        Ok(Box::new(LoadedModule { library }))
    }

    fn register_type_library(&self, path: &Path) -> TypeLibOutcome {
        super::typelib::register(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("comharvest-{}-{}", std::process::id(), name));
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_module_header_detection() {
        let dll = temp_file("a.dll", b"MZ\x90\x00");
        let tlb = temp_file("a.tlb", b"MSFT\x02\x00");
        let empty = temp_file("empty.bin", b"");
        assert!(has_module_header(&dll).unwrap());
        assert!(!has_module_header(&tlb).unwrap());
        assert!(!has_module_header(&empty).unwrap());
        for p in [dll, tlb, empty] {
            let _ = std::fs::remove_file(p);
        }
    }

    #[test]
    fn test_non_module_rejected_before_loading() {
        let tlb = temp_file("b.tlb", b"MSFT\x02\x00");
        let err = LibLoader::new().load(&tlb).err().unwrap();
        assert!(matches!(err, HarvestError::ModuleLoad { .. }));
        assert!(!err.is_fatal());
        let _ = std::fs::remove_file(tlb);
    }

    #[test]
    fn test_hresult_format() {
        assert_eq!(hresult(0x80004005u32 as i32), "0x80004005");
        assert_eq!(hresult(0), "0x00000000");
    }
}
