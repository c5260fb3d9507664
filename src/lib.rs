//! # Confsync
//!
//! Configuration export/import synchronization for management servers.
//!
//! Confsync exports a server's synchronizable configuration (system
//! settings, metric collection templates) into a gzipped XML
//! *configuration-export document*, validates such a document against
//! another server's live state, and imports it with per-synchronizer
//! configurable behavior.
//!
//! ## Features
//!
//! - Streaming export: the document is assembled lazily while it is read
//! - Pluggable synchronizers (exporter + importer per entity type)
//! - Consistency validators enforcing cross-server constraints
//! - Configuration precedence: caller > inline document defaults > built-in
//! - Atomic imports backed by a `SQLite` system store
//!
//! ## Example
//!
//! ```rust,ignore
//! use confsync::{SqliteStore, SyncService, ExportOptions};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::in_memory()?);
//! let service = SyncService::new(store);
//! let report = service.export_to_vec(&ExportOptions::default())?;
//! service.import(report.data.as_slice(), Vec::new())?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod models;
pub mod observability;
pub mod store;
pub mod subsystems;
pub mod sync;
pub mod xml;

// Re-exports for convenience
pub use config::ConfsyncConfig;
pub use models::{
    ConfigDef, ExportReport, ExporterMessages, ImportConfig, ImportConfiguration, ImportReport,
    PropertyDef, PropertyKind, PropertyValue, ValidationFailure, ValidationReport,
};
pub use store::SqliteStore;
pub use sync::{
    ConsistencyValidator, EntityMatcher, EntityValidator, ExportOptions, Exporter, ExportingReader,
    Importer, SyncRegistry, SyncService, Synchronizer,
};

/// Error type for confsync operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed `--set` values, bad property types, sub-minimum intervals |
/// | `OperationFailed` | I/O errors, database queries fail, exporter iteration fails |
/// | `MalformedDocument` | The export file is not well-formed XML or misses required structure |
/// | `UnknownSynchronizer` | An `entities` element names a synchronizer the registry doesn't know |
/// | `Validation` | The validation pass collected one or more failures |
/// | `ImportFailed` | An importer rejected an entity; the whole import is rolled back |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` store operations fail
    /// - Filesystem I/O errors occur
    /// - An exporter fails to advance its entity iterator
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The export document is not parseable.
    ///
    /// Raised when:
    /// - The input is not well-formed XML
    /// - The root element is not `configuration-export`
    /// - An `entity` element carries no `data` payload
    #[error("malformed export document: {0}")]
    MalformedDocument(String),

    /// An `entities` element references a synchronizer that is not registered.
    #[error("unknown synchronizer '{0}' in export document")]
    UnknownSynchronizer(String),

    /// The validation pass found inconsistencies.
    ///
    /// The report lists every failure, in document order; validation never
    /// stops at the first problem.
    #[error("validation failed: {0}")]
    Validation(models::ValidationReport),

    /// An importer failed; the import transaction was rolled back.
    #[error("import failed in synchronizer '{synchronizer}': {cause}")]
    ImportFailed {
        /// The synchronizer whose importer failed.
        synchronizer: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for confsync operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds an `OperationFailed` from an operation name and any displayable cause.
    pub(crate) fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::UnknownSynchronizer("nope".to_string());
        assert_eq!(
            err.to_string(),
            "unknown synchronizer 'nope' in export document"
        );
    }
}
