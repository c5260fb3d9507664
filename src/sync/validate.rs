//! The validation pass.
//!
//! Walks an export document without touching the store: consistency
//! validators check their exported state against the live server, and each
//! entity is run through its importer's entity validators. Failures
//! accumulate across the whole document so one report covers everything.

use super::registry::SyncRegistry;
use super::DynImporter;
use crate::models::{ImportConfig, ValidationFailure, ValidationReport};
use crate::xml::{DocumentParser, EntitiesItem, Section, entity_payload};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::io::BufRead;

/// Validates a whole export document against the live server.
///
/// Returns [`Error::Validation`] carrying the full report when any check
/// fails; an unknown synchronizer id is a hard error instead.
pub(super) fn validate_document<R: BufRead>(
    input: R,
    registry: &SyncRegistry,
    configs: &BTreeMap<String, ImportConfig>,
) -> Result<()> {
    let mut parser = DocumentParser::new(input)?;
    let mut report = ValidationReport::default();
    let mut executed: Vec<String> = Vec::new();

    while let Some(section) = parser.next_section()? {
        match section {
            Section::Validator(node) => {
                let id = node.attr("id").unwrap_or_default().to_string();
                let Some(mut validator) = registry.validator(&id) else {
                    // Unknown validators are tolerated so documents from
                    // servers with more subsystems still import here.
                    tracing::info!(validator = %id, "ignoring unknown consistency validator");
                    continue;
                };
                if let Err(e) = validator.load_exported_state(&node) {
                    report.failures.push(ValidationFailure::new(&id, e.to_string()));
                    continue;
                }
                if let Err(e) = validator.validate_exported_state() {
                    report.failures.push(ValidationFailure::new(&id, e.to_string()));
                }
                executed.push(id);
            },
            Section::EntitiesStart { id } => {
                let synchronizer = registry
                    .synchronizer(&id)
                    .ok_or_else(|| Error::UnknownSynchronizer(id.clone()))?;

                let mut missing = false;
                for required in synchronizer.required_validators() {
                    if !executed.iter().any(|v| v == required) {
                        missing = true;
                        report.failures.push(ValidationFailure::new(
                            *required,
                            format!(
                                "synchronizer '{id}' requires consistency validator \
                                 '{required}', which did not run"
                            ),
                        ));
                    }
                }

                let mut importer = synchronizer.importer();
                validate_entities(&mut parser, importer.as_mut(), &id, configs, missing, &mut report)?;
            },
        }
    }

    if report.is_empty() {
        Ok(())
    } else {
        metrics::counter!("confsync_validation_failures_total")
            .increment(report.failures.len() as u64);
        Err(Error::Validation(report))
    }
}

/// Drains one `entities` block, validating each entity.
///
/// When required validators are missing the entities are still drained but
/// not validated; their checks could not be trusted anyway.
fn validate_entities<R: BufRead>(
    parser: &mut DocumentParser<R>,
    importer: &mut dyn DynImporter,
    id: &str,
    configs: &BTreeMap<String, ImportConfig>,
    skip_entities: bool,
    report: &mut ValidationReport,
) -> Result<()> {
    let mut configured = false;
    if let Some(config) = configs.get(id) {
        importer.configure(Some(config))?;
        configured = true;
    }

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
                if skip_entities {
                    continue;
                }
                if !configured {
                    importer.configure(None)?;
                    configured = true;
                }
                let payload = entity_payload(&entity)?;
                report.failures.extend(importer.validate_entity(payload)?);
            },
        }
    }
    Ok(())
}
