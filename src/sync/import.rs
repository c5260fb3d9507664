//! The import pass.
//!
//! Applies an already-validated export document to the live store. The
//! whole pass runs in one transaction and fails fast: the first importer
//! error rolls everything back, so a partially imported server never
//! exists.

use super::registry::SyncRegistry;
use super::DynImporter;
use crate::models::{ImportConfig, ImportReport};
use crate::store::SqliteStore;
use crate::xml::{DocumentParser, EntitiesItem, Section, entity_payload};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::io::BufRead;

/// Imports a whole export document into the store.
pub(super) fn import_document<R: BufRead>(
    input: R,
    store: &SqliteStore,
    registry: &SyncRegistry,
    configs: &BTreeMap<String, ImportConfig>,
) -> Result<ImportReport> {
    let mut parser = DocumentParser::new(input)?;
    let mut report = ImportReport::default();

    let work = store.begin_work()?;

    while let Some(section) = parser.next_section()? {
        match section {
            // Consistency was checked by the validation pass.
            Section::Validator(_) => {},
            Section::EntitiesStart { id } => {
                let synchronizer = registry
                    .synchronizer(&id)
                    .ok_or_else(|| Error::UnknownSynchronizer(id.clone()))?;
                let mut importer = synchronizer.importer();
                let notes = import_entities(&mut parser, importer.as_mut(), &id, configs)?;
                if let Some(notes) = notes {
                    report.importer_notes.insert(id, notes);
                }
            },
        }
    }

    work.commit()?;
    metrics::counter!("confsync_imports_total").increment(1);
    Ok(report)
}

/// Drains one `entities` block, applying each entity.
///
/// The importer's `finish` runs even for an empty block, which means it is
/// configured by then at the latest.
fn import_entities<R: BufRead>(
    parser: &mut DocumentParser<R>,
    importer: &mut dyn DynImporter,
    id: &str,
    configs: &BTreeMap<String, ImportConfig>,
) -> Result<Option<String>> {
    let mut configured = false;
    if let Some(config) = configs.get(id) {
        importer.configure(Some(config))?;
        configured = true;
    }

    let mut imported = 0u64;
    while let Some(item) = parser.next_entities_item()? {
        match item {
            EntitiesItem::DefaultConfiguration(node) => {
                if !configured {
                    let config = ImportConfig::from_node(&node)?;
                    importer.configure(Some(&config))?;
                    configured = true;
                }
            },
            EntitiesItem::Entity(entity) => {
                if !configured {
                    importer.configure(None)?;
                    configured = true;
                }
                let payload = entity_payload(&entity)?;
                importer.import_entity(payload).map_err(|e| Error::ImportFailed {
                    synchronizer: id.to_string(),
                    cause: e.to_string(),
                })?;
                imported += 1;
            },
        }
    }

    if !configured {
        importer.configure(None)?;
    }
    metrics::counter!("confsync_entities_imported_total", "synchronizer" => id.to_string())
        .increment(imported);
    importer.finish().map_err(|e| Error::ImportFailed {
        synchronizer: id.to_string(),
        cause: e.to_string(),
    })
}
