//! Property values and importer configuration.
//!
//! Importers describe their knobs with a [`ConfigDef`] and receive an
//! [`ImportConfig`] resolved by the precedence rule: caller-supplied
//! configuration beats the `default-configuration` element inlined in the
//! document, which beats the importer's built-in defaults.

use crate::xml::{ExportWriter, XmlNode};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// A single configuration property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// A scalar, kept in its string form.
    Simple(String),
    /// An ordered list of values.
    List(Vec<PropertyValue>),
    /// Named values, ordered by name.
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Creates a simple value from anything stringly.
    pub fn simple(value: impl Into<String>) -> Self {
        Self::Simple(value.into())
    }

    /// Maps a JSON value onto the property vocabulary.
    ///
    /// Objects become maps, arrays become lists, and every scalar is kept in
    /// its string rendering. Used by the `--config-file` intake.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Simple(String::new()),
            serde_json::Value::Bool(b) => Self::Simple(b.to_string()),
            serde_json::Value::Number(n) => Self::Simple(n.to_string()),
            serde_json::Value::String(s) => Self::Simple(s.clone()),
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect())
            },
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Returns the string form of a simple value.
    #[must_use]
    pub fn as_simple(&self) -> Option<&str> {
        match self {
            Self::Simple(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// The kind of a configuration property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// A scalar value.
    Simple,
    /// An ordered list of values.
    List,
    /// Named values.
    Map,
}

impl PropertyKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::List => "list",
            Self::Map => "map",
        }
    }
}

/// One property in an importer's configuration definition.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyDef {
    /// Property name.
    pub name: String,
    /// Property kind.
    pub kind: PropertyKind,
    /// Human-readable description.
    pub description: String,
    /// Default value, if the property has one.
    pub default: Option<PropertyValue>,
}

impl PropertyDef {
    /// Creates a simple property definition with a default value.
    pub fn simple(
        name: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Simple,
            description: description.into(),
            default: Some(PropertyValue::Simple(default.into())),
        }
    }

    /// Creates a list property definition defaulting to an empty list.
    pub fn list(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::List,
            description: description.into(),
            default: Some(PropertyValue::List(Vec::new())),
        }
    }
}

/// An importer's configuration definition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigDef {
    /// The properties the importer understands.
    pub properties: Vec<PropertyDef>,
}

impl ConfigDef {
    /// Creates an empty definition.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            properties: Vec::new(),
        }
    }

    /// Adds a property definition.
    #[must_use]
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Looks up a property definition by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Materializes the built-in defaults as a configuration instance.
    #[must_use]
    pub fn default_config(&self) -> ImportConfig {
        let mut config = ImportConfig::new();
        for property in &self.properties {
            if let Some(default) = &property.default {
                config.set(&property.name, default.clone());
            }
        }
        config
    }
}

/// A named set of property values configuring one importer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportConfig {
    values: BTreeMap<String, PropertyValue>,
}

impl ImportConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Returns true if no property is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sets a property value.
    pub fn set(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.values.insert(name.into(), value);
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.set(name, value);
        self
    }

    /// Returns a property value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    /// Returns a simple property as a string slice.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PropertyValue::as_simple)
    }

    /// Returns a simple property parsed as a boolean.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.string(name).and_then(|s| s.parse().ok())
    }

    /// Returns a simple property parsed as an unsigned integer.
    #[must_use]
    pub fn u64(&self, name: &str) -> Option<u64> {
        self.string(name).and_then(|s| s.parse().ok())
    }

    /// Returns a list property as a slice of values.
    #[must_use]
    pub fn list(&self, name: &str) -> Option<&[PropertyValue]> {
        match self.get(name) {
            Some(PropertyValue::List(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Iterates over the named values, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Writes this configuration instance as an XML element.
    ///
    /// Top-level properties use `simple-property`, `list-property`, and
    /// `map-property`; values nested inside lists and maps use `simple-value`
    /// and `map-value`.
    pub fn write_xml(&self, element: &str, out: &mut ExportWriter) -> Result<()> {
        if self.values.is_empty() {
            return out.empty(element);
        }
        out.start(element)?;
        for (name, value) in &self.values {
            Self::write_property(name, value, out)?;
        }
        out.end(element)
    }

    fn write_property(name: &str, value: &PropertyValue, out: &mut ExportWriter) -> Result<()> {
        match value {
            PropertyValue::Simple(s) => {
                out.empty_with("simple-property", &[("name", name), ("value", s)])
            },
            PropertyValue::List(items) => {
                out.start_with("list-property", &[("name", name)])?;
                if items.is_empty() {
                    out.empty("values")?;
                } else {
                    out.start("values")?;
                    for item in items {
                        Self::write_value(None, item, out)?;
                    }
                    out.end("values")?;
                }
                out.end("list-property")
            },
            PropertyValue::Map(entries) => {
                out.start_with("map-property", &[("name", name)])?;
                for (key, entry) in entries {
                    Self::write_value(Some(key), entry, out)?;
                }
                out.end("map-property")
            },
        }
    }

    fn write_value(
        name: Option<&str>,
        value: &PropertyValue,
        out: &mut ExportWriter,
    ) -> Result<()> {
        match value {
            PropertyValue::Simple(s) => match name {
                Some(n) => out.empty_with("simple-value", &[("property-name", n), ("value", s)]),
                None => out.empty_with("simple-value", &[("value", s)]),
            },
            PropertyValue::Map(entries) => {
                match name {
                    Some(n) => out.start_with("map-value", &[("property-name", n)])?,
                    None => out.start("map-value")?,
                }
                for (key, entry) in entries {
                    Self::write_value(Some(key), entry, out)?;
                }
                out.end("map-value")
            },
            PropertyValue::List(_) => Err(Error::InvalidInput(format!(
                "nested list values are not supported in configuration instances \
                 (property '{}')",
                name.unwrap_or("<unnamed>")
            ))),
        }
    }

    /// Parses a configuration instance from its XML element tree.
    pub fn from_node(node: &XmlNode) -> Result<Self> {
        let mut config = Self::new();
        for child in &node.children {
            let name = child.attr("name").ok_or_else(|| {
                Error::MalformedDocument(format!(
                    "configuration property '{}' has no name attribute",
                    child.name
                ))
            })?;
            let value = match child.name.as_str() {
                "simple-property" => PropertyValue::Simple(
                    child.attr("value").unwrap_or_default().to_string(),
                ),
                "list-property" => {
                    let mut items = Vec::new();
                    if let Some(values) = child.child("values") {
                        for item in &values.children {
                            items.push(Self::value_from_node(item)?);
                        }
                    }
                    PropertyValue::List(items)
                },
                "map-property" => Self::map_from_children(&child.children)?,
                other => {
                    return Err(Error::MalformedDocument(format!(
                        "unexpected element '{other}' in configuration instance"
                    )));
                },
            };
            config.set(name, value);
        }
        Ok(config)
    }

    fn value_from_node(node: &XmlNode) -> Result<PropertyValue> {
        match node.name.as_str() {
            "simple-value" => Ok(PropertyValue::Simple(
                node.attr("value").unwrap_or_default().to_string(),
            )),
            "map-value" => Self::map_from_children(&node.children),
            other => Err(Error::MalformedDocument(format!(
                "unexpected element '{other}' in configuration value list"
            ))),
        }
    }

    fn map_from_children(children: &[XmlNode]) -> Result<PropertyValue> {
        let mut entries = BTreeMap::new();
        for child in children {
            let key = child.attr("property-name").ok_or_else(|| {
                Error::MalformedDocument(format!(
                    "map entry '{}' has no property-name attribute",
                    child.name
                ))
            })?;
            entries.insert(key.to_string(), Self::value_from_node(child)?);
        }
        Ok(PropertyValue::Map(entries))
    }
}

/// A caller-supplied configuration targeting one synchronizer.
#[derive(Debug, Clone)]
pub struct ImportConfiguration {
    /// The synchronizer id the configuration applies to.
    pub synchronizer: String,
    /// The configuration values.
    pub config: ImportConfig,
}

impl ImportConfiguration {
    /// Creates a configuration for a synchronizer.
    pub fn new(synchronizer: impl Into<String>, config: ImportConfig) -> Self {
        Self {
            synchronizer: synchronizer.into(),
            config,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn sample_config() -> ImportConfig {
        let mut overrides = BTreeMap::new();
        overrides.insert("metricName".to_string(), PropertyValue::simple("Free Memory"));
        overrides.insert("updateSchedules".to_string(), PropertyValue::simple("true"));

        ImportConfig::new()
            .with_value("updateAllSchedules", PropertyValue::simple("false"))
            .with_value(
                "metricUpdateOverrides",
                PropertyValue::List(vec![PropertyValue::Map(overrides)]),
            )
    }

    #[test]
    fn typed_accessors() {
        let config = sample_config();
        assert_eq!(config.bool("updateAllSchedules"), Some(false));
        assert_eq!(config.string("updateAllSchedules"), Some("false"));
        assert_eq!(config.list("metricUpdateOverrides").unwrap().len(), 1);
        assert_eq!(config.u64("updateAllSchedules"), None);
        assert_eq!(config.string("missing"), None);
    }

    #[test]
    fn xml_round_trip() {
        let config = sample_config();
        let mut out = ExportWriter::new();
        config.write_xml("default-configuration", &mut out).unwrap();

        let node = XmlNode::parse(&out.into_bytes()).unwrap();
        assert_eq!(node.name, "default-configuration");
        let parsed = ImportConfig::from_node(&node).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn from_json_maps_shapes() {
        let json = serde_json::json!({
            "updateAllSchedules": true,
            "metricUpdateOverrides": [{ "metricName": "Load", "updateSchedules": false }],
        });
        let value = PropertyValue::from_json(&json);
        let PropertyValue::Map(entries) = value else {
            panic!("expected map");
        };
        assert_eq!(
            entries.get("updateAllSchedules"),
            Some(&PropertyValue::simple("true"))
        );
        assert!(matches!(
            entries.get("metricUpdateOverrides"),
            Some(PropertyValue::List(items)) if items.len() == 1
        ));
    }

    #[test]
    fn default_config_materializes_defaults() {
        let def = ConfigDef::new()
            .with_property(PropertyDef::simple("propertiesToImport", "names", "A,B"))
            .with_property(PropertyDef::list("metricUpdateOverrides", "overrides"));
        let config = def.default_config();
        assert_eq!(config.string("propertiesToImport"), Some("A,B"));
        assert_eq!(config.list("metricUpdateOverrides"), Some(&[][..]));
    }
}
