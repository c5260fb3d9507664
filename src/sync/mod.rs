//! The synchronization framework.
//!
//! A [`Synchronizer`] ties one entity type to an [`Exporter`], an
//! [`Importer`], and the [`ConsistencyValidator`]s the entity type depends
//! on. The typed traits are what subsystems implement; the drivers (export
//! stream, validation pass, import pass) consume the object-safe erased
//! forms, which a blanket impl derives from the typed ones.

mod export;
mod import;
mod registry;
mod service;
mod validate;

pub use export::{ExportMessages, ExportOptions, ExportingReader};
pub use registry::SyncRegistry;
pub use service::SyncService;

use crate::models::{ConfigDef, ImportConfig, ValidationFailure};
use crate::xml::{ExportWriter, XmlNode};
use crate::{Error, Result};

/// Streams one entity type out of the live store.
pub trait Exporter {
    /// The exported entity type.
    type Entity;

    /// Called once before iteration starts.
    fn begin(&mut self) -> Result<()>;

    /// Returns the next entity, or `None` when the exporter is exhausted.
    fn next_entity(&mut self) -> Result<Option<Self::Entity>>;

    /// Writes one entity's payload, returning an optional per-entity note.
    fn write_entity(
        &mut self,
        entity: &Self::Entity,
        out: &mut ExportWriter,
    ) -> Result<Option<String>>;

    /// Exporter-level message, read once iteration is over.
    fn notes(&self) -> Option<String>;
}

/// Applies one entity type from an export document to the live store.
pub trait Importer {
    /// The imported entity type.
    type Entity;
    /// The live counterpart an [`EntityMatcher`] resolves to.
    type Match;

    /// Describes the importer's configuration properties.
    fn configuration_definition(&self) -> ConfigDef;

    /// Configures the importer; `None` selects the built-in defaults.
    ///
    /// Called exactly once per run, lazily: explicit configuration applies
    /// up front, otherwise configuration happens at the first entity (or at
    /// the end of an empty `entities` element).
    fn configure(&mut self, config: Option<&ImportConfig>) -> Result<()>;

    /// Per-entity validators run during the validation pass.
    ///
    /// Only called after [`configure`](Self::configure).
    fn entity_validators(&self) -> Vec<Box<dyn EntityValidator<Entity = Self::Entity>>>;

    /// Parses one entity from its payload element.
    fn parse_entity(&self, payload: &XmlNode) -> Result<Self::Entity>;

    /// Returns the matcher resolving entities against the live store.
    ///
    /// `None` means the entity type has no live counterpart to find; the
    /// driver then calls [`update`](Self::update) with no match.
    fn matcher(&self) -> Option<Box<dyn EntityMatcher<Entity = Self::Entity, Match = Self::Match>>>;

    /// Applies one entity, paired with its live match if one was found.
    fn update(&mut self, existing: Option<Self::Match>, entity: Self::Entity) -> Result<()>;

    /// Called after the last entity; returns optional importer notes.
    fn finish(&mut self) -> Result<Option<String>>;
}

/// Finds the live counterpart of an exported entity.
pub trait EntityMatcher {
    /// The exported entity type.
    type Entity;
    /// The live counterpart type.
    type Match;

    /// Returns the live match, if any.
    fn find_match(&self, entity: &Self::Entity) -> Result<Option<Self::Match>>;
}

/// Validates individual entities during the validation pass.
pub trait EntityValidator {
    /// The validated entity type.
    type Entity;

    /// Identifies the validator in failure reports.
    fn id(&self) -> &'static str;

    /// Checks one entity; an error becomes a validation failure.
    fn validate(&self, entity: &Self::Entity) -> Result<()>;
}

/// Enforces a cross-entity constraint between source and target servers.
///
/// Validators export a snapshot of relevant source state into the document;
/// on the target, the snapshot is loaded back and checked against the live
/// store. Identity is the registry id.
pub trait ConsistencyValidator {
    /// The registry id; also the `id` attribute in the document.
    fn id(&self) -> &'static str;

    /// Writes the validator's state into the export document.
    fn export_state(&self, out: &mut ExportWriter) -> Result<()>;

    /// Loads previously exported state from the document.
    fn load_exported_state(&mut self, state: &XmlNode) -> Result<()>;

    /// Checks the loaded state against the live store.
    fn validate_exported_state(&self) -> Result<()>;
}

/// One synchronizable entity type.
pub trait Synchronizer {
    /// The entity type.
    type Entity;
    /// The exporter implementation.
    type Exporter: Exporter<Entity = Self::Entity> + 'static;
    /// The importer implementation.
    type Importer: Importer<Entity = Self::Entity> + 'static;

    /// The registry id; also the `id` attribute of the `entities` element.
    fn id(&self) -> &'static str;

    /// Creates a fresh exporter.
    fn exporter(&self) -> Self::Exporter;

    /// Creates a fresh importer.
    fn importer(&self) -> Self::Importer;

    /// Ids of the consistency validators this entity type depends on.
    fn required_validators(&self) -> &'static [&'static str];
}

// ---------------------------------------------------------------------------
// Erased forms consumed by the drivers
// ---------------------------------------------------------------------------

/// Object-safe exporter as driven by the export stream.
pub trait DynExporter {
    /// See [`Exporter::begin`].
    fn begin(&mut self) -> Result<()>;
    /// Advances the iterator; returns whether an entity is pending.
    fn advance(&mut self) -> Result<bool>;
    /// Writes the pending entity, returning its optional note.
    fn write_pending(&mut self, out: &mut ExportWriter) -> Result<Option<String>>;
    /// See [`Exporter::notes`].
    fn notes(&self) -> Option<String>;
}

struct ExporterAdapter<E: Exporter> {
    inner: E,
    pending: Option<E::Entity>,
}

impl<E: Exporter> DynExporter for ExporterAdapter<E> {
    fn begin(&mut self) -> Result<()> {
        self.inner.begin()
    }

    fn advance(&mut self) -> Result<bool> {
        self.pending = self.inner.next_entity()?;
        Ok(self.pending.is_some())
    }

    fn write_pending(&mut self, out: &mut ExportWriter) -> Result<Option<String>> {
        let entity = self
            .pending
            .take()
            .ok_or_else(|| Error::operation("write_entity", "no entity pending"))?;
        self.inner.write_entity(&entity, out)
    }

    fn notes(&self) -> Option<String> {
        self.inner.notes()
    }
}

/// Object-safe importer as driven by the validation and import passes.
pub trait DynImporter {
    /// See [`Importer::configuration_definition`].
    fn configuration_definition(&self) -> ConfigDef;
    /// See [`Importer::configure`]; also resolves validators and matcher.
    fn configure(&mut self, config: Option<&ImportConfig>) -> Result<()>;
    /// Parses one entity and runs the entity validators over it.
    ///
    /// Validator rejections come back as failures; a parse error is a hard
    /// error.
    fn validate_entity(&self, payload: &XmlNode) -> Result<Vec<ValidationFailure>>;
    /// Parses one entity, resolves its live match, and applies it.
    fn import_entity(&mut self, payload: &XmlNode) -> Result<()>;
    /// See [`Importer::finish`].
    fn finish(&mut self) -> Result<Option<String>>;
}

struct ImporterAdapter<I: Importer> {
    inner: I,
    validators: Vec<Box<dyn EntityValidator<Entity = I::Entity>>>,
    matcher: Option<Box<dyn EntityMatcher<Entity = I::Entity, Match = I::Match>>>,
}

impl<I: Importer> DynImporter for ImporterAdapter<I> {
    fn configuration_definition(&self) -> ConfigDef {
        self.inner.configuration_definition()
    }

    fn configure(&mut self, config: Option<&ImportConfig>) -> Result<()> {
        self.inner.configure(config)?;
        self.validators = self.inner.entity_validators();
        self.matcher = self.inner.matcher();
        Ok(())
    }

    fn validate_entity(&self, payload: &XmlNode) -> Result<Vec<ValidationFailure>> {
        let entity = self.inner.parse_entity(payload)?;
        let mut failures = Vec::new();
        for validator in &self.validators {
            if let Err(e) = validator.validate(&entity) {
                failures.push(ValidationFailure::new(validator.id(), e.to_string()));
            }
        }
        Ok(failures)
    }

    fn import_entity(&mut self, payload: &XmlNode) -> Result<()> {
        let entity = self.inner.parse_entity(payload)?;
        let existing = match &self.matcher {
            Some(matcher) => matcher.find_match(&entity)?,
            None => None,
        };
        self.inner.update(existing, entity)
    }

    fn finish(&mut self) -> Result<Option<String>> {
        self.inner.finish()
    }
}

/// Object-safe synchronizer held by the registry.
pub trait DynSynchronizer {
    /// See [`Synchronizer::id`].
    fn id(&self) -> &'static str;
    /// Creates a fresh erased exporter.
    fn exporter(&self) -> Box<dyn DynExporter>;
    /// Creates a fresh erased importer.
    fn importer(&self) -> Box<dyn DynImporter>;
    /// See [`Synchronizer::required_validators`].
    fn required_validators(&self) -> &'static [&'static str];
}

impl<S> DynSynchronizer for S
where
    S: Synchronizer,
    S::Entity: 'static,
    <S::Importer as Importer>::Match: 'static,
{
    fn id(&self) -> &'static str {
        Synchronizer::id(self)
    }

    fn exporter(&self) -> Box<dyn DynExporter> {
        Box::new(ExporterAdapter {
            inner: Synchronizer::exporter(self),
            pending: None,
        })
    }

    fn importer(&self) -> Box<dyn DynImporter> {
        Box::new(ImporterAdapter {
            inner: Synchronizer::importer(self),
            validators: Vec::new(),
            matcher: None,
        })
    }

    fn required_validators(&self) -> &'static [&'static str] {
        Synchronizer::required_validators(self)
    }
}
