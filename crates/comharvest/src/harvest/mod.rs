//! Per-file harvesting and assembly of the final component.

pub mod component;
pub mod diagnostics;
pub mod engine;

pub use component::{ComponentUnit, HarvestedComponent};
pub use diagnostics::{DiagnosticKind, Severity};
pub use engine::NativeEngine;

use crate::capture::loader::has_module_header;
use crate::capture::{CaptureOutput, CaptureSession};
use crate::classify::entity::{ComEntity, FileReference};
use crate::classify::graph::EntityTree;
use crate::classify::Classifier;
use crate::config::HarvestConfig;
use crate::error::{HarvestError, HarvestResult};
use crate::paths::{PathTokenIndex, Virtualizer};
use crate::sandbox::{HiveBackend, SandboxLayout};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// How a file should be harvested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// A dynamic-link module that may register itself.
    #[default]
    DynamicLink,
    /// A standalone type library.
    TypeLibrary,
    /// Anything else; nothing is harvested.
    Plain,
}

/// A file to harvest.
#[derive(Debug, Clone)]
pub struct HarvestFile {
    pub path: PathBuf,
    /// Identifier of the file in the authored output.
    pub file_id: String,
    pub kind: ModuleKind,
}

/// Harvests files through a [`CaptureSession`].
pub struct FileHarvester<'a, B: HiveBackend> {
    session: CaptureSession<'a, B>,
    config: &'a HarvestConfig,
}

impl<'a, B: HiveBackend> FileHarvester<'a, B> {
    pub fn new(session: CaptureSession<'a, B>, config: &'a HarvestConfig) -> Self {
        FileHarvester { session, config }
    }

    fn layout(&self, file: &HarvestFile) -> SandboxLayout {
        SandboxLayout::new(
            self.config.override_root.resolve(),
            &self.config.private_root,
            &file.file_id,
        )
    }

    /// Harvest `file` into a component named `component_id`.
    ///
    /// Only fatal errors are returned; everything else ends up as a
    /// diagnostic on the component.
    pub fn harvest(&self, file: &HarvestFile, component_id: &str) -> HarvestResult<ComponentUnit> {
        if file.file_id.trim().is_empty() {
            return Err(HarvestError::InvalidParameter(format!(
                "{} has an empty file id",
                file.path.display()
            )));
        }
        self.config.validate()?;

        let mut unit = ComponentUnit::new(component_id);
        unit.diagnostics.report(
            DiagnosticKind::HarvestingModule,
            &file.file_id,
            format!("harvesting module {}", file.path.display()),
        );

        match file.kind {
            ModuleKind::DynamicLink => self.harvest_dynamic_link(file, &mut unit)?,
            ModuleKind::TypeLibrary => self.harvest_type_library(file, &mut unit)?,
            ModuleKind::Plain => debug!("harvest: {} is a plain file", file.file_id),
        }

        info!(
            "harvest: {} produced {} entries",
            file.file_id,
            unit.entries.len()
        );
        Ok(unit)
    }

    fn harvest_dynamic_link(&self, file: &HarvestFile, unit: &mut ComponentUnit) -> HarvestResult<()> {
        let is_module = match has_module_header(&file.path) {
            Ok(is_module) => is_module,
            Err(e) => {
                unit.diagnostics.report(
                    DiagnosticKind::ModuleLoadFailed,
                    &file.file_id,
                    format!("cannot read {}: {}", file.path.display(), e),
                );
                return Ok(());
            }
        };
        if !is_module {
            unit.diagnostics.report(
                DiagnosticKind::UnrecognizedFormat,
                &file.file_id,
                format!(
                    "{} is not a dynamic-link module; trying it as a type library",
                    file.path.display()
                ),
            );
            return self.harvest_type_library(file, unit);
        }

        match self.session.capture(
            self.layout(file),
            &file.path,
            &file.file_id,
            &self.config.entry_point,
        ) {
            Ok(output) => merge(unit, output),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                unit.diagnostics.report(
                    DiagnosticKind::ModuleLoadFailed,
                    &file.file_id,
                    format!("{}; trying it as a type library", e),
                );
                return self.harvest_type_library(file, unit);
            }
        }

        if self.config.harvest_type_libraries {
            self.harvest_type_library(file, unit)?;
        }
        Ok(())
    }

    fn harvest_type_library(&self, file: &HarvestFile, unit: &mut ComponentUnit) -> HarvestResult<()> {
        match self
            .session
            .capture_type_library(self.layout(file), &file.path, &file.file_id)
        {
            Ok(output) => {
                merge(unit, output);
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                unit.diagnostics.report(
                    DiagnosticKind::TypeLibLoadFailed,
                    &file.file_id,
                    e.to_string(),
                );
                Ok(())
            }
        }
    }
}

fn merge(unit: &mut ComponentUnit, output: CaptureOutput) {
    unit.add_entries(output.entries);
    unit.diagnostics.append(output.diagnostics);
}

/// Classify `unit`, then virtualize what is left.
pub fn finalize(
    mut unit: ComponentUnit,
    config: &HarvestConfig,
    index: &PathTokenIndex,
) -> HarvestedComponent {
    let graph = Classifier::new(index, config).classify(&mut unit);
    let virtualizer = Virtualizer::new(index);

    let mut entities = graph.to_trees();
    for tree in &mut entities {
        virtualize_tree(tree, &virtualizer);
    }
    let entries = unit
        .entries
        .into_iter()
        .map(|mut entry| {
            entry.value = virtualizer.virtualize_value(&entry.value);
            entry
        })
        .collect();

    HarvestedComponent {
        id: unit.id,
        entities,
        entries,
        diagnostics: unit.diagnostics.into_vec(),
    }
}

fn virtualize_reference(reference: &mut Option<FileReference>, virtualizer: &Virtualizer) {
    if let Some(FileReference::Foreign { path }) = reference {
        *path = virtualizer.virtualize(path);
    }
}

/// Virtualize free-form path fields. Identifiers and descriptions are left alone.
fn virtualize_tree(tree: &mut EntityTree, virtualizer: &Virtualizer) {
    match &mut tree.entity {
        ComEntity::AppId(app) => {
            virtualizer.virtualize_opt(&mut app.dll_surrogate);
            virtualizer.virtualize_opt(&mut app.service_parameters);
        }
        ComEntity::CoClass(class) => virtualize_reference(&mut class.server, virtualizer),
        ComEntity::TypeLib(lib) => {
            virtualizer.virtualize_opt(&mut lib.help_directory);
            for language in &mut lib.languages {
                virtualize_reference(&mut language.win32, virtualizer);
                virtualize_reference(&mut language.win64, virtualizer);
            }
        }
        ComEntity::ProgId(_) | ComEntity::Interface(_) => {}
    }
    for child in &mut tree.children {
        virtualize_tree(child, virtualizer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::session::tests::{Behavior, FakeLoader};
    use crate::capture::loader::TypeLibOutcome;
    use crate::config::OverrideRootChoice;
    use crate::sandbox::redirect::tests::FakeBackend;
    use crate::sandbox::Redirector;
    use comreg::{LogicalRoot, MemoryStore, RawEntry, RegValue, StoreData};
    use std::io::Write;
    use std::sync::Arc;

    const G: &str = "{11111111-2222-3333-4444-555555555555}";
    const TL: &str = "{BBBBBBBB-2222-3333-4444-555555555555}";

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("comharvest-h-{}-{}", std::process::id(), name));
        std::fs::File::create(&path).unwrap().write_all(bytes).unwrap();
        path
    }

    /// The fake backend does not isolate the store, so a second capture of
    /// the same file would re-read the first one's writes.
    fn config() -> HarvestConfig {
        HarvestConfig {
            override_root: OverrideRootChoice::CurrentUser,
            harvest_type_libraries: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_dynamic_link_harvest_end_to_end() {
        let path = temp_file("widget.dll", b"MZ\x90\x00");
        let store = Arc::new(MemoryStore::new());
        let loader = FakeLoader::new(
            store.clone(),
            Behavior::Writes(vec![
                (LogicalRoot::ClassesRoot, "MyProgId\\CLSID", "", StoreData::Sz(G.into())),
                (
                    LogicalRoot::ClassesRoot,
                    "CLSID\\{11111111-2222-3333-4444-555555555555}",
                    "",
                    StoreData::Sz("My Class".into()),
                ),
            ]),
        );
        let redirector = Redirector::new(FakeBackend::default());
        let session = CaptureSession::new(&redirector, store.as_ref(), &loader);
        let cfg = config();
        let harvester = FileHarvester::new(session, &cfg);
        let file = HarvestFile {
            path: path.clone(),
            file_id: "widget_dll".into(),
            kind: ModuleKind::DynamicLink,
        };
        let unit = harvester.harvest(&file, "widget_comp").unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(unit.diagnostics.count(DiagnosticKind::HarvestingModule), 1);
        let out = finalize(unit, &cfg, &PathTokenIndex::new());
        assert_eq!(out.entity_count(), 2);
        assert_eq!(out.entities[0].children[0].entity.id(), "MyProgId");
        assert!(out.entries.is_empty());
    }

    #[test]
    fn test_non_module_retried_as_type_library() {
        let path = temp_file("types.tlb", b"MSFT\x02\x00");
        let store = Arc::new(MemoryStore::new());
        let mut loader = FakeLoader::new(store.clone(), Behavior::NoExport);
        loader.type_lib_writes = vec![(
            LogicalRoot::ClassesRoot,
            "TypeLib\\{BBBBBBBB-2222-3333-4444-555555555555}\\1.0\\0\\win32",
            "",
            StoreData::Sz("[#types_tlb]".into()),
        )];
        let redirector = Redirector::new(FakeBackend::default());
        let session = CaptureSession::new(&redirector, store.as_ref(), &loader);
        let cfg = config();
        let harvester = FileHarvester::new(session, &cfg);
        let file = HarvestFile {
            path: path.clone(),
            file_id: "types_tlb".into(),
            kind: ModuleKind::DynamicLink,
        };
        let unit = harvester.harvest(&file, "c").unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(unit.diagnostics.count(DiagnosticKind::UnrecognizedFormat), 1);
        let out = finalize(unit, &cfg, &PathTokenIndex::new());
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.entities[0].entity.id(), TL);
    }

    #[test]
    fn test_type_library_failure_is_warning() {
        let store = Arc::new(MemoryStore::new());
        let mut loader = FakeLoader::new(store.clone(), Behavior::NoExport);
        loader.type_lib = TypeLibOutcome::Failed(0x80029C4Au32 as i32);
        let redirector = Redirector::new(FakeBackend::default());
        let session = CaptureSession::new(&redirector, store.as_ref(), &loader);
        let cfg = config();
        let harvester = FileHarvester::new(session, &cfg);
        let file = HarvestFile {
            path: PathBuf::from("C:\\missing.tlb"),
            file_id: "t".into(),
            kind: ModuleKind::TypeLibrary,
        };
        let unit = harvester.harvest(&file, "c").unwrap();
        assert_eq!(unit.diagnostics.count(DiagnosticKind::TypeLibLoadFailed), 1);
    }

    #[test]
    fn test_plain_file_harvests_nothing() {
        let store = Arc::new(MemoryStore::new());
        let loader = FakeLoader::new(store.clone(), Behavior::NoExport);
        let redirector = Redirector::new(FakeBackend::default());
        let session = CaptureSession::new(&redirector, store.as_ref(), &loader);
        let cfg = config();
        let harvester = FileHarvester::new(session, &cfg);
        let file = HarvestFile {
            path: PathBuf::from("readme.txt"),
            file_id: "readme".into(),
            kind: ModuleKind::Plain,
        };
        let unit = harvester.harvest(&file, "c").unwrap();
        assert!(unit.entries.is_empty());
        assert!(redirector.backend().calls().is_empty());
    }

    #[test]
    fn test_empty_file_id_rejected_before_capture() {
        let store = Arc::new(MemoryStore::new());
        let loader = FakeLoader::new(store.clone(), Behavior::NoExport);
        let redirector = Redirector::new(FakeBackend::default());
        let session = CaptureSession::new(&redirector, store.as_ref(), &loader);
        let cfg = config();
        let harvester = FileHarvester::new(session, &cfg);
        let file = HarvestFile {
            path: PathBuf::from("C:\\x.dll"),
            file_id: " ".into(),
            kind: ModuleKind::DynamicLink,
        };
        let err = harvester.harvest(&file, "c").err().unwrap();
        assert!(matches!(err, HarvestError::InvalidParameter(_)));
        assert!(!err.is_fatal());
        assert!(redirector.backend().calls().is_empty());
    }

    #[test]
    fn test_sandbox_failure_aborts() {
        let path = temp_file("fatal.dll", b"MZ");
        let store = Arc::new(MemoryStore::new());
        let loader = FakeLoader::new(store.clone(), Behavior::NoExport);
        let backend = FakeBackend {
            fail_override: Some(LogicalRoot::ClassesRoot),
            ..Default::default()
        };
        let redirector = Redirector::new(backend);
        let session = CaptureSession::new(&redirector, store.as_ref(), &loader);
        let cfg = config();
        let harvester = FileHarvester::new(session, &cfg);
        let file = HarvestFile {
            path: path.clone(),
            file_id: "f".into(),
            kind: ModuleKind::DynamicLink,
        };
        let result = harvester.harvest(&file, "c");
        let _ = std::fs::remove_file(&path);
        assert!(result.err().unwrap().is_fatal());
    }

    #[test]
    fn test_finalize_virtualizes_leftovers_and_servers() {
        let mut index = PathTokenIndex::new();
        index.register_directory("C:\\Program Files\\Acme", "INSTALLDIR");
        index.register_file_with_short_path("C:\\Program Files\\Acme\\acme.exe", None, "acme_exe");
        let unit = ComponentUnit::with_entries(
            "c",
            vec![
                RawEntry::string(
                    LogicalRoot::ClassesRoot,
                    format!("CLSID\\{}\\LocalServer32", G),
                    None,
                    "\"C:\\Program Files\\Acme\\acme.exe\" /automation",
                ),
                RawEntry::new(
                    LogicalRoot::LocalMachine,
                    "Software\\Acme",
                    Some("Plugins"),
                    RegValue::MultiString(vec!["C:\\Program Files\\Acme\\plugins".into()]),
                ),
            ],
        );
        let out = finalize(unit, &config(), &index);
        let ComEntity::CoClass(class) = &out.entities[0].entity else {
            panic!("expected CoClass");
        };
        assert_eq!(
            class.server,
            Some(FileReference::Foreign {
                path: "\"[#acme_exe]\" /automation".into()
            })
        );
        assert_eq!(
            out.entries[0].value,
            RegValue::MultiString(vec!["[INSTALLDIR]\\plugins".into()])
        );
    }
}
