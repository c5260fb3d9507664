//! The built-in synchronizers and consistency validators.

mod metric_templates;
mod system_settings;
mod validators;

pub use metric_templates::{MetricTemplate, MetricTemplatesSynchronizer};
pub use system_settings::{SettingsSnapshot, SystemSettingsSynchronizer};
pub use validators::{DeployedPluginsValidator, SystemSettingsValidator};
