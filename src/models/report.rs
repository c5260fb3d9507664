//! Reports produced by export, validation, and import runs.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Per-synchronizer messages collected while an export stream is consumed.
///
/// The messages are complete once the export reader reaches end of stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExporterMessages {
    /// Exporter-level notes, set when the exporter finishes.
    pub notes: Option<String>,
    /// Number of entities written.
    pub exported: u64,
    /// Per-entity notes returned by the exporter.
    pub entity_notes: Vec<String>,
    /// Errors that stopped this exporter; other synchronizers still export.
    pub errors: Vec<String>,
}

/// The outcome of an in-memory export run.
#[derive(Debug)]
pub struct ExportReport {
    /// Messages keyed by synchronizer id.
    pub messages: BTreeMap<String, ExporterMessages>,
    /// The complete export document bytes.
    pub data: Vec<u8>,
}

/// One failure found by the validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    /// The validator that reported the failure.
    pub validator: String,
    /// What went wrong.
    pub message: String,
}

impl ValidationFailure {
    /// Creates a failure report.
    pub fn new(validator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            message: message.into(),
        }
    }
}

/// All failures found by a validation pass, in document order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// The collected failures.
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    /// Returns true if the pass found no failures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; [{}] {}", failure.validator, failure.message)?;
        }
        Ok(())
    }
}

/// The outcome of an import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Importer notes keyed by synchronizer id.
    pub importer_notes: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_report_display_lists_failures() {
        let report = ValidationReport {
            failures: vec![
                ValidationFailure::new("deployed-plugins", "version mismatch"),
                ValidationFailure::new("system-settings", "unknown setting"),
            ],
        };
        let text = report.to_string();
        assert!(text.starts_with("2 failure(s)"));
        assert!(text.contains("[deployed-plugins] version mismatch"));
        assert!(text.contains("[system-settings] unknown setting"));
    }
}
