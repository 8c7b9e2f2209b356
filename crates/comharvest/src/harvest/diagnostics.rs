//! Diagnostics collected during a harvest.
//!
//! Every diagnostic is logged when it is reported and also kept, so callers
//! get the full list back with the harvested component.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    HarvestingModule,
    EntryPointNotFound,
    RegistrationFailed,
    ModuleLoadFailed,
    UnrecognizedFormat,
    TypeLibAccessDenied,
    TypeLibLoadFailed,
    DuplicateEntry,
    UnresolvableValue,
    UnrepresentableValue,
}

impl DiagnosticKind {
    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::HarvestingModule | DiagnosticKind::EntryPointNotFound => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

/// A single reported condition, tied to the file or entry that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// File identifier or entry path the diagnostic refers to.
    pub subject: String,
    pub message: String,
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    /// Log and record a diagnostic.
    pub fn report(
        &mut self,
        kind: DiagnosticKind,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        let diagnostic = Diagnostic {
            severity: kind.severity(),
            kind,
            subject: subject.into(),
            message: message.into(),
        };
        match diagnostic.severity {
            Severity::Info => info!("{}: {}", diagnostic.subject, diagnostic.message),
            Severity::Warning => warn!("{}: {}", diagnostic.subject, diagnostic.message),
        }
        self.items.push(diagnostic);
    }

    /// Move all diagnostics of `other` to the end of this list.
    pub fn append(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.items.iter().filter(|d| d.kind == kind).count()
    }

    pub fn warnings(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_follows_kind() {
        let mut d = Diagnostics::new();
        d.report(DiagnosticKind::EntryPointNotFound, "file1", "no export");
        d.report(DiagnosticKind::RegistrationFailed, "file1", "0x80004005");
        assert_eq!(d.len(), 2);
        assert_eq!(d.warnings(), 1);
        assert_eq!(d.iter().next().unwrap().severity, Severity::Info);
    }

    #[test]
    fn test_append_keeps_order() {
        let mut a = Diagnostics::new();
        a.report(DiagnosticKind::HarvestingModule, "a", "first");
        let mut b = Diagnostics::new();
        b.report(DiagnosticKind::DuplicateEntry, "b", "second");
        a.append(b);
        let subjects: Vec<&str> = a.iter().map(|d| d.subject.as_str()).collect();
        assert_eq!(subjects, vec!["a", "b"]);
        assert_eq!(a.count(DiagnosticKind::DuplicateEntry), 1);
    }

    #[test]
    fn test_serializes_as_list() {
        let mut d = Diagnostics::new();
        d.report(DiagnosticKind::UnresolvableValue, "HKCR\\x", "bad");
        let json = serde_json::to_value(&d).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["kind"], "unresolvable_value");
        assert_eq!(json[0]["severity"], "warning");
    }
}
