//! Domain types: property values, importer configuration, and run reports.

mod property;
mod report;

pub use property::{
    ConfigDef, ImportConfig, ImportConfiguration, PropertyDef, PropertyKind, PropertyValue,
};
pub use report::{
    ExportReport, ExporterMessages, ImportReport, ValidationFailure, ValidationReport,
};
