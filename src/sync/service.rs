//! High-level synchronization service.
//!
//! [`SyncService`] is the embedding surface: it owns the store handle and
//! the registry and exposes export, validate, and import as single calls.

use super::export::{ExportOptions, ExportingReader};
use super::registry::SyncRegistry;
use super::{import, validate};
use crate::models::{ConfigDef, ExportReport, ImportConfig, ImportConfiguration, ImportReport};
use crate::store::SqliteStore;
use crate::xml::DocumentSource;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::instrument;

/// Imports larger than this spill from memory to a temp file.
const SPOOL_MEMORY_LIMIT: usize = 8 * 1024 * 1024;

/// The synchronization entry point.
pub struct SyncService {
    store: Arc<SqliteStore>,
    registry: SyncRegistry,
}

impl SyncService {
    /// Creates a service with the built-in synchronizers and validators.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>) -> Self {
        let registry = SyncRegistry::with_builtins(Arc::clone(&store));
        Self { store, registry }
    }

    /// Creates a service over a caller-assembled registry.
    #[must_use]
    pub fn with_registry(store: Arc<SqliteStore>, registry: SyncRegistry) -> Self {
        Self { store, registry }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &SyncRegistry {
        &self.registry
    }

    /// Returns the underlying store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Returns a lazy reader over a fresh export document.
    ///
    /// Export work happens as the reader is consumed; use
    /// [`ExportingReader::messages`] for the per-synchronizer outcome.
    #[instrument(skip(self))]
    pub fn export_reader(&self, options: &ExportOptions) -> Result<ExportingReader> {
        ExportingReader::new(&self.registry, options)
    }

    /// Exports the whole document into memory.
    #[instrument(skip(self))]
    pub fn export_to_vec(&self, options: &ExportOptions) -> Result<ExportReport> {
        let mut reader = self.export_reader(options)?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| Error::operation("export", e))?;
        Ok(ExportReport {
            messages: reader.messages().snapshot(),
            data,
        })
    }

    /// Validates an export document against this server without importing.
    #[instrument(skip(self, input, configs))]
    pub fn validate<R: BufRead>(&self, input: R, configs: &[ImportConfiguration]) -> Result<()> {
        let source = DocumentSource::detect(input)?;
        validate::validate_document(source, &self.registry, &config_map(configs))
    }

    /// Validates and then imports an export document.
    ///
    /// The input is spooled to disk first so both passes read the same
    /// bytes; import only starts once validation passed in full.
    #[instrument(skip(self, input, configs))]
    pub fn import<R: Read>(&self, mut input: R, configs: &[ImportConfiguration]) -> Result<ImportReport> {
        let mut spool = tempfile::SpooledTempFile::new(SPOOL_MEMORY_LIMIT);
        io::copy(&mut input, &mut spool).map_err(|e| Error::operation("spool_import", e))?;
        spool
            .flush()
            .map_err(|e| Error::operation("spool_import", e))?;

        let configs = config_map(configs);

        spool
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::operation("spool_import", e))?;
        validate::validate_document(
            DocumentSource::detect(BufReader::new(&mut spool))?,
            &self.registry,
            &configs,
        )?;
        tracing::info!("validation passed, importing");

        spool
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::operation("spool_import", e))?;
        import::import_document(
            DocumentSource::detect(BufReader::new(&mut spool))?,
            &self.store,
            &self.registry,
            &configs,
        )
    }

    /// Returns the configuration definition of one synchronizer's importer.
    pub fn configuration_definition(&self, id: &str) -> Result<ConfigDef> {
        let synchronizer = self
            .registry
            .synchronizer(id)
            .ok_or_else(|| Error::UnknownSynchronizer(id.to_string()))?;
        Ok(synchronizer.importer().configuration_definition())
    }

    /// Returns every synchronizer's configuration definition, in registry
    /// order.
    #[must_use]
    pub fn configuration_definitions(&self) -> Vec<(&'static str, ConfigDef)> {
        self.registry
            .synchronizers()
            .map(|s| (s.id(), s.importer().configuration_definition()))
            .collect()
    }
}

/// Collapses caller configurations into a lookup map; the last entry for a
/// synchronizer wins.
fn config_map(configs: &[ImportConfiguration]) -> BTreeMap<String, ImportConfig> {
    configs
        .iter()
        .map(|c| (c.synchronizer.clone(), c.config.clone()))
        .collect()
}
