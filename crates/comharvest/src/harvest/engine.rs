//! Native harvesting against the live registry.
//!
//! The engine owns the process's only [`Redirector`](crate::sandbox::Redirector).
//! Callers must serialize access; the MCP server keeps it behind a mutex.

#[cfg(windows)]
use super::{finalize, FileHarvester};
use super::{HarvestFile, HarvestedComponent};
use crate::config::HarvestConfig;
use crate::error::HarvestResult;
use crate::paths::PathTokenIndex;

#[cfg(windows)]
pub struct NativeEngine {
    redirector: crate::sandbox::Redirector<crate::sandbox::win32::RegistryBackend>,
    store: comreg::win32::NativeStore,
    loader: crate::capture::LibLoader,
}

#[cfg(windows)]
impl NativeEngine {
    pub fn new() -> Self {
        NativeEngine {
            redirector: crate::sandbox::Redirector::new(
                crate::sandbox::win32::RegistryBackend::new(),
            ),
            store: comreg::win32::NativeStore::new(),
            loader: crate::capture::LibLoader::new(),
        }
    }

    pub fn is_supported() -> bool {
        true
    }

    pub fn harvest(
        &self,
        file: &HarvestFile,
        component_id: &str,
        config: &HarvestConfig,
        index: &PathTokenIndex,
    ) -> HarvestResult<HarvestedComponent> {
        let session =
            crate::capture::CaptureSession::new(&self.redirector, &self.store, &self.loader);
        let unit = FileHarvester::new(session, config).harvest(file, component_id)?;
        Ok(finalize(unit, config, index))
    }
}

/// Stand-in on platforms without a registry; every harvest fails.
#[cfg(not(windows))]
pub struct NativeEngine;

#[cfg(not(windows))]
impl NativeEngine {
    pub fn new() -> Self {
        NativeEngine
    }

    pub fn is_supported() -> bool {
        false
    }

    pub fn harvest(
        &self,
        _file: &HarvestFile,
        _component_id: &str,
        _config: &HarvestConfig,
        _index: &PathTokenIndex,
    ) -> HarvestResult<HarvestedComponent> {
        Err(crate::error::HarvestError::UnsupportedPlatform)
    }
}

impl Default for NativeEngine {
    fn default() -> Self {
        NativeEngine::new()
    }
}
