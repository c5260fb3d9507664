//! Synchronizes the system settings table.
//!
//! The whole settings map travels as a single entity. The importer only
//! writes settings selected by `propertiesToImport`; by default that is
//! every importable setting in the catalog, which keeps server-identity
//! settings such as `CAM_BASE_URL` out of the transfer.

use crate::models::{ConfigDef, ImportConfig, PropertyDef};
use crate::store::SqliteStore;
use crate::sync::{EntityMatcher, EntityValidator, Exporter, Importer, Synchronizer};
use crate::xml::{ExportWriter, XmlNode};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const SETTINGS_ELEMENT: &str = "systemSettings";
const ENTRY_ELEMENT: &str = "entry";
const KEY_ATTRIBUTE: &str = "key";
const PROPERTIES_TO_IMPORT: &str = "propertiesToImport";

/// The full settings map, exported as one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsSnapshot {
    /// Setting values keyed by name.
    pub entries: BTreeMap<String, String>,
}

/// The `system-settings` synchronizer.
pub struct SystemSettingsSynchronizer {
    store: Arc<SqliteStore>,
}

impl SystemSettingsSynchronizer {
    /// Creates the synchronizer over a store handle.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

impl Synchronizer for SystemSettingsSynchronizer {
    type Entity = SettingsSnapshot;
    type Exporter = SystemSettingsExporter;
    type Importer = SystemSettingsImporter;

    fn id(&self) -> &'static str {
        "system-settings"
    }

    fn exporter(&self) -> Self::Exporter {
        SystemSettingsExporter {
            store: Arc::clone(&self.store),
            emitted: false,
            exported: 0,
        }
    }

    fn importer(&self) -> Self::Importer {
        SystemSettingsImporter {
            store: Arc::clone(&self.store),
            import_names: BTreeSet::new(),
            imported: 0,
            skipped: Vec::new(),
        }
    }

    fn required_validators(&self) -> &'static [&'static str] {
        &["system-settings"]
    }
}

/// Exports the settings map.
pub struct SystemSettingsExporter {
    store: Arc<SqliteStore>,
    emitted: bool,
    exported: usize,
}

impl Exporter for SystemSettingsExporter {
    type Entity = SettingsSnapshot;

    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_entity(&mut self) -> Result<Option<Self::Entity>> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        let entries = self
            .store
            .settings()?
            .into_iter()
            .map(|s| (s.name, s.value))
            .collect();
        Ok(Some(SettingsSnapshot { entries }))
    }

    fn write_entity(
        &mut self,
        entity: &Self::Entity,
        out: &mut ExportWriter,
    ) -> Result<Option<String>> {
        out.start(SETTINGS_ELEMENT)?;
        for (key, value) in &entity.entries {
            out.element_with(ENTRY_ELEMENT, &[(KEY_ATTRIBUTE, key)], value)?;
        }
        out.end(SETTINGS_ELEMENT)?;
        self.exported = entity.entries.len();
        Ok(None)
    }

    fn notes(&self) -> Option<String> {
        Some(format!("exported {} setting(s)", self.exported))
    }
}

/// Imports the settings map, filtered by `propertiesToImport`.
pub struct SystemSettingsImporter {
    store: Arc<SqliteStore>,
    import_names: BTreeSet<String>,
    imported: usize,
    skipped: Vec<String>,
}

impl Importer for SystemSettingsImporter {
    type Entity = SettingsSnapshot;
    type Match = ();

    fn configuration_definition(&self) -> ConfigDef {
        ConfigDef::new().with_property(PropertyDef::simple(
            PROPERTIES_TO_IMPORT,
            "Comma-separated names of the settings to import.",
            SqliteStore::importable_setting_names().join(", "),
        ))
    }

    fn configure(&mut self, config: Option<&ImportConfig>) -> Result<()> {
        let fallback = self.configuration_definition().default_config();
        let names = config
            .and_then(|c| c.string(PROPERTIES_TO_IMPORT))
            .or_else(|| fallback.string(PROPERTIES_TO_IMPORT))
            .unwrap_or_default()
            .to_string();
        self.import_names = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();
        Ok(())
    }

    fn entity_validators(&self) -> Vec<Box<dyn EntityValidator<Entity = Self::Entity>>> {
        Vec::new()
    }

    fn parse_entity(&self, payload: &XmlNode) -> Result<Self::Entity> {
        if payload.name != SETTINGS_ELEMENT {
            return Err(Error::MalformedDocument(format!(
                "expected '{SETTINGS_ELEMENT}' payload, found '{}'",
                payload.name
            )));
        }
        let mut entries = BTreeMap::new();
        for entry in payload.children_named(ENTRY_ELEMENT) {
            let key = entry.attr(KEY_ATTRIBUTE).ok_or_else(|| {
                Error::MalformedDocument(format!(
                    "'{ENTRY_ELEMENT}' element has no '{KEY_ATTRIBUTE}' attribute"
                ))
            })?;
            entries.insert(key.to_string(), entry.text.clone());
        }
        Ok(SettingsSnapshot { entries })
    }

    fn matcher(
        &self,
    ) -> Option<Box<dyn EntityMatcher<Entity = Self::Entity, Match = Self::Match>>> {
        None
    }

    fn update(&mut self, _existing: Option<Self::Match>, entity: Self::Entity) -> Result<()> {
        for (name, value) in &entity.entries {
            if !self.import_names.contains(name) {
                continue;
            }
            if !SqliteStore::is_known_setting(name) {
                tracing::warn!(setting = %name, "skipping setting unknown to this server");
                self.skipped.push(name.clone());
                continue;
            }
            self.store.set_setting(name, value)?;
            self.imported += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Option<String>> {
        let mut notes = format!("imported {} setting(s)", self.imported);
        if !self.skipped.is_empty() {
            notes.push_str("; skipped unknown settings: ");
            notes.push_str(&self.skipped.join(", "));
        }
        Ok(Some(notes))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::PropertyValue;

    fn snapshot(pairs: &[(&str, &str)]) -> SettingsSnapshot {
        SettingsSnapshot {
            entries: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn default_filter_excludes_base_url() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let sync = SystemSettingsSynchronizer::new(Arc::clone(&store));
        let mut importer = sync.importer();
        importer.configure(None).unwrap();

        importer
            .update(None, snapshot(&[("CAM_BASE_URL", "http://elsewhere:7080")]))
            .unwrap();
        assert_eq!(
            store.setting("CAM_BASE_URL").unwrap().as_deref(),
            Some("http://localhost:7080")
        );
    }

    #[test]
    fn explicit_filter_restricts_imported_names() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let sync = SystemSettingsSynchronizer::new(Arc::clone(&store));
        let mut importer = sync.importer();
        let config = ImportConfig::new()
            .with_value(PROPERTIES_TO_IMPORT, PropertyValue::simple("ENABLE_DEBUG_MODE"));
        importer.configure(Some(&config)).unwrap();

        importer
            .update(
                None,
                snapshot(&[
                    ("ENABLE_DEBUG_MODE", "true"),
                    ("CAM_DATA_PURGE_1H", "9999"),
                ]),
            )
            .unwrap();
        assert_eq!(
            store.setting("ENABLE_DEBUG_MODE").unwrap().as_deref(),
            Some("true")
        );
        assert_ne!(
            store.setting("CAM_DATA_PURGE_1H").unwrap().as_deref(),
            Some("9999")
        );
    }

    #[test]
    fn unknown_settings_are_skipped_and_noted() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let sync = SystemSettingsSynchronizer::new(store);
        let mut importer = sync.importer();
        let config = ImportConfig::new()
            .with_value(PROPERTIES_TO_IMPORT, PropertyValue::simple("NO_SUCH_SETTING"));
        importer.configure(Some(&config)).unwrap();

        importer
            .update(None, snapshot(&[("NO_SUCH_SETTING", "1")]))
            .unwrap();
        let notes = importer.finish().unwrap().unwrap();
        assert!(notes.contains("imported 0 setting(s)"));
        assert!(notes.contains("NO_SUCH_SETTING"));
    }

    #[test]
    fn parse_entity_reads_entries() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let sync = SystemSettingsSynchronizer::new(store);
        let node = XmlNode::parse(
            b"<systemSettings><entry key=\"ENABLE_DEBUG_MODE\">true</entry></systemSettings>",
        )
        .unwrap();
        let entity = sync.importer().parse_entity(&node).unwrap();
        assert_eq!(
            entity.entries.get("ENABLE_DEBUG_MODE").map(String::as_str),
            Some("true")
        );
    }
}
