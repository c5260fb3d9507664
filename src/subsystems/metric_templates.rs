//! Synchronizes metric collection templates.
//!
//! Templates travel one per entity and are matched against the live store
//! by metric name, resource type name, and plugin. A matched template
//! updates the definition's default interval and enablement; existing
//! schedules are only touched when `updateAllSchedules` (or a per-metric
//! override) says so.

use crate::models::{ConfigDef, ImportConfig, PropertyDef, PropertyValue};
use crate::store::{MetricDefinition, SqliteStore};
use crate::sync::{EntityMatcher, EntityValidator, Exporter, Importer, Synchronizer};
use crate::xml::{ExportWriter, XmlNode};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::Arc;

const TEMPLATE_ELEMENT: &str = "metricTemplate";
const METRIC_NAME_ATTRIBUTE: &str = "metricName";
const TYPE_NAME_ATTRIBUTE: &str = "resourceTypeName";
const TYPE_PLUGIN_ATTRIBUTE: &str = "resourceTypePlugin";
const INTERVAL_ATTRIBUTE: &str = "defaultInterval";
const ENABLED_ATTRIBUTE: &str = "enabled";
const PER_MINUTE_ATTRIBUTE: &str = "perMinute";

const UPDATE_ALL_SCHEDULES: &str = "updateAllSchedules";
const METRIC_UPDATE_OVERRIDES: &str = "metricUpdateOverrides";
const UPDATE_SCHEDULES: &str = "updateSchedules";

/// Collecting faster than this is a misconfiguration, not a preference.
const MIN_COLLECTION_INTERVAL_MS: i64 = 30_000;

/// One exported metric template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricTemplate {
    /// Metric name.
    pub metric_name: String,
    /// Resource type the metric belongs to.
    pub resource_type_name: String,
    /// Plugin defining the resource type.
    pub resource_type_plugin: String,
    /// Default collection interval in milliseconds.
    pub default_interval: i64,
    /// Whether collection is enabled by default.
    pub enabled: bool,
    /// Whether the metric is a per-minute rate.
    pub per_minute: bool,
}

impl MetricTemplate {
    fn display_name(&self) -> String {
        format!(
            "{}/{}/{}",
            self.resource_type_plugin, self.resource_type_name, self.metric_name
        )
    }
}

/// The `metric-templates` synchronizer.
pub struct MetricTemplatesSynchronizer {
    store: Arc<SqliteStore>,
}

impl MetricTemplatesSynchronizer {
    /// Creates the synchronizer over a store handle.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

impl Synchronizer for MetricTemplatesSynchronizer {
    type Entity = MetricTemplate;
    type Exporter = MetricTemplatesExporter;
    type Importer = MetricTemplatesImporter;

    fn id(&self) -> &'static str {
        "metric-templates"
    }

    fn exporter(&self) -> Self::Exporter {
        MetricTemplatesExporter {
            store: Arc::clone(&self.store),
            pending: VecDeque::new(),
            exported: 0,
        }
    }

    fn importer(&self) -> Self::Importer {
        MetricTemplatesImporter {
            store: Arc::clone(&self.store),
            update_all_schedules: false,
            overrides: Vec::new(),
            updated: 0,
            unmatched: Vec::new(),
        }
    }

    fn required_validators(&self) -> &'static [&'static str] {
        &["deployed-plugins"]
    }
}

/// Exports templates in plugin/type/metric order.
pub struct MetricTemplatesExporter {
    store: Arc<SqliteStore>,
    pending: VecDeque<MetricTemplate>,
    exported: usize,
}

impl Exporter for MetricTemplatesExporter {
    type Entity = MetricTemplate;

    fn begin(&mut self) -> Result<()> {
        self.pending = self
            .store
            .metric_templates()?
            .into_iter()
            .map(|row| MetricTemplate {
                metric_name: row.definition.name,
                resource_type_name: row.resource_type_name,
                resource_type_plugin: row.resource_type_plugin,
                default_interval: row.definition.default_interval,
                enabled: row.definition.enabled,
                per_minute: row.definition.per_minute,
            })
            .collect();
        Ok(())
    }

    fn next_entity(&mut self) -> Result<Option<Self::Entity>> {
        Ok(self.pending.pop_front())
    }

    fn write_entity(
        &mut self,
        entity: &Self::Entity,
        out: &mut ExportWriter,
    ) -> Result<Option<String>> {
        out.empty_with(
            TEMPLATE_ELEMENT,
            &[
                (METRIC_NAME_ATTRIBUTE, &entity.metric_name),
                (TYPE_NAME_ATTRIBUTE, &entity.resource_type_name),
                (TYPE_PLUGIN_ATTRIBUTE, &entity.resource_type_plugin),
                (INTERVAL_ATTRIBUTE, &entity.default_interval.to_string()),
                (ENABLED_ATTRIBUTE, &entity.enabled.to_string()),
                (PER_MINUTE_ATTRIBUTE, &entity.per_minute.to_string()),
            ],
        )?;
        self.exported += 1;
        Ok(None)
    }

    fn notes(&self) -> Option<String> {
        Some(format!("exported {} metric template(s)", self.exported))
    }
}

/// A per-metric override of the schedule-update flag.
struct ScheduleOverride {
    metric_name: String,
    resource_type_name: String,
    resource_type_plugin: String,
    update_schedules: bool,
}

impl ScheduleOverride {
    fn from_value(value: &PropertyValue) -> Result<Self> {
        let PropertyValue::Map(map) = value else {
            return Err(Error::InvalidInput(format!(
                "entries of '{METRIC_UPDATE_OVERRIDES}' must be maps"
            )));
        };
        let field = |name: &str| -> Result<String> {
            map.get(name)
                .and_then(PropertyValue::as_simple)
                .map(String::from)
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "'{METRIC_UPDATE_OVERRIDES}' entry is missing '{name}'"
                    ))
                })
        };
        Ok(Self {
            metric_name: field(METRIC_NAME_ATTRIBUTE)?,
            resource_type_name: field(TYPE_NAME_ATTRIBUTE)?,
            resource_type_plugin: field(TYPE_PLUGIN_ATTRIBUTE)?,
            update_schedules: field(UPDATE_SCHEDULES)?.trim().eq_ignore_ascii_case("true"),
        })
    }

    fn applies_to(&self, template: &MetricTemplate) -> bool {
        self.metric_name == template.metric_name
            && self.resource_type_name == template.resource_type_name
            && self.resource_type_plugin == template.resource_type_plugin
    }
}

/// Imports templates into matching live definitions.
pub struct MetricTemplatesImporter {
    store: Arc<SqliteStore>,
    update_all_schedules: bool,
    overrides: Vec<ScheduleOverride>,
    updated: usize,
    unmatched: Vec<String>,
}

impl MetricTemplatesImporter {
    fn should_update_schedules(&self, template: &MetricTemplate) -> bool {
        self.overrides
            .iter()
            .find(|o| o.applies_to(template))
            .map_or(self.update_all_schedules, |o| o.update_schedules)
    }
}

impl Importer for MetricTemplatesImporter {
    type Entity = MetricTemplate;
    type Match = MetricDefinition;

    fn configuration_definition(&self) -> ConfigDef {
        ConfigDef::new()
            .with_property(PropertyDef::simple(
                UPDATE_ALL_SCHEDULES,
                "Whether to push imported intervals onto every existing schedule.",
                "false",
            ))
            .with_property(PropertyDef::list(
                METRIC_UPDATE_OVERRIDES,
                "Per-metric overrides of the updateAllSchedules flag.",
            ))
    }

    fn configure(&mut self, config: Option<&ImportConfig>) -> Result<()> {
        self.update_all_schedules = config
            .and_then(|c| c.bool(UPDATE_ALL_SCHEDULES))
            .unwrap_or(false);
        self.overrides = config
            .and_then(|c| c.list(METRIC_UPDATE_OVERRIDES))
            .unwrap_or_default()
            .iter()
            .map(ScheduleOverride::from_value)
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn entity_validators(&self) -> Vec<Box<dyn EntityValidator<Entity = Self::Entity>>> {
        vec![Box::new(MetricIntervalValidator)]
    }

    fn parse_entity(&self, payload: &XmlNode) -> Result<Self::Entity> {
        if payload.name != TEMPLATE_ELEMENT {
            return Err(Error::MalformedDocument(format!(
                "expected '{TEMPLATE_ELEMENT}' payload, found '{}'",
                payload.name
            )));
        }
        let default_interval = required_attr(payload, INTERVAL_ATTRIBUTE)?.parse().map_err(|_| {
            Error::MalformedDocument(format!(
                "'{INTERVAL_ATTRIBUTE}' is not a valid interval: {}",
                payload.attr(INTERVAL_ATTRIBUTE).unwrap_or_default()
            ))
        })?;
        Ok(MetricTemplate {
            metric_name: required_attr(payload, METRIC_NAME_ATTRIBUTE)?.to_string(),
            resource_type_name: required_attr(payload, TYPE_NAME_ATTRIBUTE)?.to_string(),
            resource_type_plugin: required_attr(payload, TYPE_PLUGIN_ATTRIBUTE)?.to_string(),
            default_interval,
            enabled: required_attr(payload, ENABLED_ATTRIBUTE)? == "true",
            per_minute: required_attr(payload, PER_MINUTE_ATTRIBUTE)? == "true",
        })
    }

    fn matcher(
        &self,
    ) -> Option<Box<dyn EntityMatcher<Entity = Self::Entity, Match = Self::Match>>> {
        Some(Box::new(MetricDefinitionMatcher {
            store: Arc::clone(&self.store),
        }))
    }

    fn update(&mut self, existing: Option<Self::Match>, entity: Self::Entity) -> Result<()> {
        let Some(definition) = existing else {
            self.unmatched.push(entity.display_name());
            return Ok(());
        };
        self.store
            .update_metric_definition(definition.id, entity.default_interval, entity.enabled)?;
        if self.should_update_schedules(&entity) {
            self.store.update_schedules_of_definition(
                definition.id,
                entity.default_interval,
                entity.enabled,
            )?;
        }
        self.updated += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<Option<String>> {
        let mut notes = format!("updated {} metric template(s)", self.updated);
        if !self.unmatched.is_empty() {
            notes.push_str("; no match for: ");
            notes.push_str(&self.unmatched.join(", "));
        }
        Ok(Some(notes))
    }
}

fn required_attr<'a>(payload: &'a XmlNode, name: &str) -> Result<&'a str> {
    payload.attr(name).ok_or_else(|| {
        Error::MalformedDocument(format!(
            "'{TEMPLATE_ELEMENT}' element has no '{name}' attribute"
        ))
    })
}

/// Matches templates against live definitions by name, type, and plugin.
struct MetricDefinitionMatcher {
    store: Arc<SqliteStore>,
}

impl EntityMatcher for MetricDefinitionMatcher {
    type Entity = MetricTemplate;
    type Match = MetricDefinition;

    fn find_match(&self, entity: &Self::Entity) -> Result<Option<Self::Match>> {
        self.store.find_metric_definition(
            &entity.metric_name,
            &entity.resource_type_name,
            &entity.resource_type_plugin,
        )
    }
}

/// Rejects collection intervals shorter than 30 seconds.
struct MetricIntervalValidator;

impl EntityValidator for MetricIntervalValidator {
    type Entity = MetricTemplate;

    fn id(&self) -> &'static str {
        "metric-interval"
    }

    fn validate(&self, entity: &Self::Entity) -> Result<()> {
        if entity.default_interval < MIN_COLLECTION_INTERVAL_MS {
            return Err(Error::InvalidInput(format!(
                "collection interval of {} is {}ms, below the {}ms minimum",
                entity.display_name(),
                entity.default_interval,
                MIN_COLLECTION_INTERVAL_MS
            )));
        }
        Ok(())
    }
}
