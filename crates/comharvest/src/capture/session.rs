//! A single sandboxed registration capture.

use super::loader::{hresult, Invocation, NativeLoader, TypeLibOutcome};
use crate::error::HarvestResult;
use crate::harvest::diagnostics::{DiagnosticKind, Diagnostics};
use crate::sandbox::{HiveBackend, Redirector, SandboxLayout};
use comreg::{ConfigStore, RawEntry, TreeWalker, WalkOutput};
use std::path::Path;
use tracing::{debug, info};

/// Raw entries written by one registration, with what was reported on the way.
#[derive(Debug, Default)]
pub struct CaptureOutput {
    pub entries: Vec<RawEntry>,
    pub diagnostics: Diagnostics,
}

/// Runs registrations inside a redirection and enumerates what they wrote.
///
/// `store` must read through the same process-wide roots the redirector
/// overrides, so enumeration sees only the private subtree.
pub struct CaptureSession<'a, B: HiveBackend> {
    redirector: &'a Redirector<B>,
    store: &'a dyn ConfigStore,
    loader: &'a dyn NativeLoader,
}

impl<'a, B: HiveBackend> CaptureSession<'a, B> {
    pub fn new(
        redirector: &'a Redirector<B>,
        store: &'a dyn ConfigStore,
        loader: &'a dyn NativeLoader,
    ) -> Self {
        CaptureSession {
            redirector,
            store,
            loader,
        }
    }

    /// Load `path`, call its `entry_point` and collect every entry written.
    ///
    /// A missing export is informational and a failing one is a warning
    /// against `file_id`; in both cases the store is still enumerated.
    pub fn capture(
        &self,
        layout: SandboxLayout,
        path: &Path,
        file_id: &str,
        entry_point: &str,
    ) -> HarvestResult<CaptureOutput> {
        let context = self.redirector.begin(layout)?;
        let mut diagnostics = Diagnostics::new();

        let mut module = self.loader.load(path)?;
        match module.invoke(entry_point) {
            Invocation::Succeeded => debug!("capture: {} {} succeeded", file_id, entry_point),
            Invocation::NotFound => diagnostics.report(
                DiagnosticKind::EntryPointNotFound,
                file_id,
                format!("{} does not export {}", path.display(), entry_point),
            ),
            Invocation::Failed(code) => diagnostics.report(
                DiagnosticKind::RegistrationFailed,
                file_id,
                format!("{} failed with {}", entry_point, hresult(code)),
            ),
        }

        let walked = TreeWalker::new(self.store).walk_all()?;
        drop(module);
        context.end()?;

        Ok(Self::finish(walked, diagnostics))
    }

    /// Register the type library in `path` and collect every entry written.
    pub fn capture_type_library(
        &self,
        layout: SandboxLayout,
        path: &Path,
        file_id: &str,
    ) -> HarvestResult<CaptureOutput> {
        let context = self.redirector.begin(layout)?;
        let mut diagnostics = Diagnostics::new();

        match self.loader.register_type_library(path) {
            TypeLibOutcome::Registered => debug!("capture: registered type library {}", file_id),
            TypeLibOutcome::AccessDenied(code) => diagnostics.report(
                DiagnosticKind::TypeLibAccessDenied,
                file_id,
                format!(
                    "insufficient privilege to harvest type library {} ({})",
                    path.display(),
                    hresult(code)
                ),
            ),
            TypeLibOutcome::Failed(code) => diagnostics.report(
                DiagnosticKind::TypeLibLoadFailed,
                file_id,
                format!("could not load type library {} ({})", path.display(), hresult(code)),
            ),
            TypeLibOutcome::Unsupported => diagnostics.report(
                DiagnosticKind::TypeLibLoadFailed,
                file_id,
                "type library registration is not supported on this platform",
            ),
        }

        let walked = TreeWalker::new(self.store).walk_all()?;
        context.end()?;

        Ok(Self::finish(walked, diagnostics))
    }

    fn finish(walked: WalkOutput, mut diagnostics: Diagnostics) -> CaptureOutput {
        for value in &walked.unrepresentable {
            diagnostics.report(
                DiagnosticKind::UnrepresentableValue,
                format!(
                    "{}\\{} [{}]",
                    value.root,
                    value.key,
                    value.name.as_deref().unwrap_or("(Default)")
                ),
                format!("value of type {} cannot be represented", value.native_type),
            );
        }
        info!(
            "capture: {} entries, {} diagnostics",
            walked.entries.len(),
            diagnostics.len()
        );
        CaptureOutput {
            entries: walked.entries,
            diagnostics,
        }
    }
}
