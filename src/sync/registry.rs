//! The ordered set of synchronizers and consistency validator factories.

use super::{ConsistencyValidator, DynSynchronizer};
use crate::store::SqliteStore;
use crate::subsystems::{
    DeployedPluginsValidator, MetricTemplatesSynchronizer, SystemSettingsSynchronizer,
    SystemSettingsValidator,
};
use std::sync::Arc;

type ValidatorFactory = Box<dyn Fn() -> Box<dyn ConsistencyValidator>>;

/// Registry of synchronizers and consistency validators.
///
/// Registration order is document order: `entities` elements appear in the
/// order their synchronizers were registered.
#[derive(Default)]
pub struct SyncRegistry {
    synchronizers: Vec<Box<dyn DynSynchronizer>>,
    validators: Vec<(&'static str, ValidatorFactory)>,
}

impl SyncRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            synchronizers: Vec::new(),
            validators: Vec::new(),
        }
    }

    /// Creates a registry with the built-in synchronizers and validators.
    #[must_use]
    pub fn with_builtins(store: Arc<SqliteStore>) -> Self {
        let mut registry = Self::new();
        registry.register(SystemSettingsSynchronizer::new(Arc::clone(&store)));
        registry.register(MetricTemplatesSynchronizer::new(Arc::clone(&store)));

        let settings_store = Arc::clone(&store);
        registry.register_validator("system-settings", move || {
            Box::new(SystemSettingsValidator::new(Arc::clone(&settings_store)))
        });
        let plugins_store = store;
        registry.register_validator("deployed-plugins", move || {
            Box::new(DeployedPluginsValidator::new(Arc::clone(&plugins_store)))
        });
        registry
    }

    /// Registers a synchronizer at the end of the order.
    pub fn register(&mut self, synchronizer: impl DynSynchronizer + 'static) {
        self.synchronizers.push(Box::new(synchronizer));
    }

    /// Registers a consistency validator factory under its id.
    pub fn register_validator(
        &mut self,
        id: &'static str,
        factory: impl Fn() -> Box<dyn ConsistencyValidator> + 'static,
    ) {
        self.validators.push((id, Box::new(factory)));
    }

    /// Iterates over the synchronizers in registration order.
    pub fn synchronizers(&self) -> impl Iterator<Item = &dyn DynSynchronizer> {
        self.synchronizers.iter().map(Box::as_ref)
    }

    /// Looks up a synchronizer by id.
    #[must_use]
    pub fn synchronizer(&self, id: &str) -> Option<&dyn DynSynchronizer> {
        self.synchronizers
            .iter()
            .find(|s| s.id() == id)
            .map(Box::as_ref)
    }

    /// Instantiates a consistency validator by id.
    #[must_use]
    pub fn validator(&self, id: &str) -> Option<Box<dyn ConsistencyValidator>> {
        self.validators
            .iter()
            .find(|(vid, _)| *vid == id)
            .map(|(_, factory)| factory())
    }
}
