//! The built-in consistency validators.
//!
//! Each validator snapshots a slice of source-server state into the export
//! document; on the target the snapshot is checked against the live store
//! before any import runs.

use crate::store::SqliteStore;
use crate::sync::ConsistencyValidator;
use crate::xml::{ExportWriter, XmlNode};
use crate::{Error, Result};
use std::sync::Arc;

const SETTING_ELEMENT: &str = "setting";
const PLUGIN_ELEMENT: &str = "plugin";
const NAME_ATTRIBUTE: &str = "name";
const VERSION_ATTRIBUTE: &str = "version";

/// Checks that every exported setting name is known to the target server.
pub struct SystemSettingsValidator {
    store: Arc<SqliteStore>,
    exported_names: Vec<String>,
}

impl SystemSettingsValidator {
    /// Creates the validator over a store handle.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            store,
            exported_names: Vec::new(),
        }
    }
}

impl ConsistencyValidator for SystemSettingsValidator {
    fn id(&self) -> &'static str {
        "system-settings"
    }

    fn export_state(&self, out: &mut ExportWriter) -> Result<()> {
        for setting in self.store.settings()? {
            out.empty_with(SETTING_ELEMENT, &[(NAME_ATTRIBUTE, &setting.name)])?;
        }
        Ok(())
    }

    fn load_exported_state(&mut self, state: &XmlNode) -> Result<()> {
        self.exported_names = state
            .children_named(SETTING_ELEMENT)
            .map(|setting| {
                setting
                    .attr(NAME_ATTRIBUTE)
                    .map(String::from)
                    .ok_or_else(|| {
                        Error::MalformedDocument(format!(
                            "'{SETTING_ELEMENT}' element has no '{NAME_ATTRIBUTE}' attribute"
                        ))
                    })
            })
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn validate_exported_state(&self) -> Result<()> {
        let unknown: Vec<&str> = self
            .exported_names
            .iter()
            .map(String::as_str)
            .filter(|name| !SqliteStore::is_known_setting(name))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "settings not known to this server: {}",
                unknown.join(", ")
            )))
        }
    }
}

/// Checks that every enabled source plugin is deployed here with the same
/// version.
pub struct DeployedPluginsValidator {
    store: Arc<SqliteStore>,
    exported: Vec<(String, String)>,
}

impl DeployedPluginsValidator {
    /// Creates the validator over a store handle.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            store,
            exported: Vec::new(),
        }
    }
}

impl ConsistencyValidator for DeployedPluginsValidator {
    fn id(&self) -> &'static str {
        "deployed-plugins"
    }

    fn export_state(&self, out: &mut ExportWriter) -> Result<()> {
        for plugin in self.store.plugins()?.iter().filter(|p| p.enabled) {
            out.empty_with(
                PLUGIN_ELEMENT,
                &[
                    (NAME_ATTRIBUTE, &plugin.name),
                    (VERSION_ATTRIBUTE, &plugin.version),
                ],
            )?;
        }
        Ok(())
    }

    fn load_exported_state(&mut self, state: &XmlNode) -> Result<()> {
        self.exported = state
            .children_named(PLUGIN_ELEMENT)
            .map(|plugin| {
                let name = plugin.attr(NAME_ATTRIBUTE).ok_or_else(|| {
                    Error::MalformedDocument(format!(
                        "'{PLUGIN_ELEMENT}' element has no '{NAME_ATTRIBUTE}' attribute"
                    ))
                })?;
                let version = plugin.attr(VERSION_ATTRIBUTE).ok_or_else(|| {
                    Error::MalformedDocument(format!(
                        "'{PLUGIN_ELEMENT}' element has no '{VERSION_ATTRIBUTE}' attribute"
                    ))
                })?;
                Ok((name.to_string(), version.to_string()))
            })
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn validate_exported_state(&self) -> Result<()> {
        let live = self.store.plugins()?;
        let mut problems = Vec::new();
        for (name, version) in &self.exported {
            match live.iter().find(|p| &p.name == name) {
                None => problems.push(format!("plugin '{name}' is not deployed here")),
                Some(plugin) if &plugin.version != version => problems.push(format!(
                    "plugin '{name}' is version {} here but {version} at the source",
                    plugin.version
                )),
                Some(_) => {},
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(problems.join("; ")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn state_of(validator: &dyn ConsistencyValidator) -> XmlNode {
        let mut out = ExportWriter::new();
        out.start("validator").unwrap();
        validator.export_state(&mut out).unwrap();
        out.end("validator").unwrap();
        XmlNode::parse(&out.into_bytes()).unwrap()
    }

    #[test]
    fn settings_state_round_trips_cleanly() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let source = SystemSettingsValidator::new(Arc::clone(&store));
        let state = state_of(&source);

        let mut target = SystemSettingsValidator::new(store);
        target.load_exported_state(&state).unwrap();
        target.validate_exported_state().unwrap();
    }

    #[test]
    fn unknown_setting_name_fails_validation() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut validator = SystemSettingsValidator::new(store);
        let state = XmlNode::parse(
            b"<validator id=\"system-settings\"><setting name=\"NOT_A_SETTING\"/></validator>",
        )
        .unwrap();
        validator.load_exported_state(&state).unwrap();
        let err = validator.validate_exported_state().unwrap_err();
        assert!(err.to_string().contains("NOT_A_SETTING"));
    }

    #[test]
    fn plugin_version_mismatch_fails_validation() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store.register_plugin("Platforms", "1.0.0", true).unwrap();
        let mut validator = DeployedPluginsValidator::new(store);
        let state = XmlNode::parse(
            b"<validator id=\"deployed-plugins\">\
                <plugin name=\"Platforms\" version=\"2.0.0\"/>\
              </validator>",
        )
        .unwrap();
        validator.load_exported_state(&state).unwrap();
        let err = validator.validate_exported_state().unwrap_err();
        assert!(err.to_string().contains("1.0.0"));
    }

    #[test]
    fn disabled_plugins_are_not_exported() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store.register_plugin("Platforms", "1.0.0", true).unwrap();
        store.register_plugin("Legacy", "0.1.0", false).unwrap();
        let validator = DeployedPluginsValidator::new(store);
        let state = state_of(&validator);
        let names: Vec<_> = state
            .children_named(PLUGIN_ELEMENT)
            .filter_map(|p| p.attr(NAME_ATTRIBUTE))
            .collect();
        assert_eq!(names, ["Platforms"]);
    }

    #[test]
    fn missing_plugin_fails_validation() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut validator = DeployedPluginsValidator::new(store);
        let state = XmlNode::parse(
            b"<validator id=\"deployed-plugins\">\
                <plugin name=\"Platforms\" version=\"1.0.0\"/>\
              </validator>",
        )
        .unwrap();
        validator.load_exported_state(&state).unwrap();
        assert!(validator.validate_exported_state().is_err());
    }
}
