//! `SQLite` system store.
//!
//! The live managed state the importers match against: system settings,
//! deployed plugins, resource types, metric definitions and schedules.

mod sql;

pub use sql::{SETTINGS_CATALOG, SettingDef};

use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Helper to acquire mutex lock with poison recovery.
///
/// If the mutex is poisoned (due to a panic in a previous critical section),
/// we recover the inner value and log a warning. This prevents cascading
/// failures when one operation panics.
fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("confsync_store_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// One system setting row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSetting {
    /// Setting name.
    pub name: String,
    /// Current value.
    pub value: String,
    /// Unix timestamp of the last update.
    pub updated_at: i64,
}

/// One deployed plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    /// Plugin name.
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// Whether the plugin is enabled.
    pub enabled: bool,
}

/// One metric definition row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDefinition {
    /// Row id.
    pub id: i64,
    /// Owning resource type.
    pub resource_type_id: i64,
    /// Metric name.
    pub name: String,
    /// Default collection interval in milliseconds.
    pub default_interval: i64,
    /// Whether collection is enabled by default.
    pub enabled: bool,
    /// Whether the metric is a per-minute rate.
    pub per_minute: bool,
}

/// One metric schedule row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSchedule {
    /// Row id.
    pub id: i64,
    /// The definition the schedule belongs to.
    pub definition_id: i64,
    /// Key of the monitored resource.
    pub resource_key: String,
    /// Collection interval in milliseconds.
    pub interval: i64,
    /// Whether collection is enabled.
    pub enabled: bool,
}

/// A metric definition joined with its resource type, as exported.
#[derive(Debug, Clone)]
pub struct MetricTemplateRow {
    /// The definition.
    pub definition: MetricDefinition,
    /// Resource type name.
    pub resource_type_name: String,
    /// Plugin defining the resource type.
    pub resource_type_plugin: String,
}

/// Row counts for the status command.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StoreCounts {
    /// System settings rows.
    pub settings: u64,
    /// Plugin rows.
    pub plugins: u64,
    /// Resource type rows.
    pub resource_types: u64,
    /// Metric definition rows.
    pub metric_definitions: u64,
    /// Metric schedule rows.
    pub metric_schedules: u64,
}

/// SQLite-backed system store.
pub struct SqliteStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the `SQLite` database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| Error::operation("open_store", e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };

        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::operation("open_store_memory", e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };

        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Initializes the schema and seeds the settings catalog.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        // WAL for better concurrent read performance; journal_mode returns a
        // string which would make execute_batch fail, hence pragma_update
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");

        conn.execute_batch(sql::SCHEMA)
            .map_err(|e| Error::operation("create_schema", e))?;

        let now = chrono::Utc::now().timestamp();
        for setting in sql::SETTINGS_CATALOG {
            conn.execute(
                "INSERT OR IGNORE INTO system_settings (name, value, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![setting.name, setting.default_value, now],
            )
            .map_err(|e| Error::operation("seed_settings", e))?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // System settings
    // ------------------------------------------------------------------

    /// Returns all settings, ordered by name.
    pub fn settings(&self) -> Result<Vec<SystemSetting>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT name, value, updated_at FROM system_settings ORDER BY name")
            .map_err(|e| Error::operation("load_settings", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SystemSetting {
                    name: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })
            .map_err(|e| Error::operation("load_settings", e))?;
        rows.collect::<rusqlite::Result<_>>()
            .map_err(|e| Error::operation("load_settings", e))
    }

    /// Returns one setting's value.
    pub fn setting(&self, name: &str) -> Result<Option<String>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT value FROM system_settings WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::operation("load_setting", e))
    }

    /// Writes one setting's value.
    pub fn set_setting(&self, name: &str, value: &str) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO system_settings (name, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (name) DO UPDATE SET value = excluded.value,
                                             updated_at = excluded.updated_at",
            params![name, value, now],
        )
        .map_err(|e| Error::operation("write_setting", e))?;
        Ok(())
    }

    /// Returns every catalog setting name.
    #[must_use]
    pub fn setting_names() -> Vec<&'static str> {
        sql::SETTINGS_CATALOG.iter().map(|s| s.name).collect()
    }

    /// Returns true if the name is part of the settings catalog.
    #[must_use]
    pub fn is_known_setting(name: &str) -> bool {
        sql::SETTINGS_CATALOG.iter().any(|s| s.name == name)
    }

    /// Returns the catalog setting names an import may overwrite.
    #[must_use]
    pub fn importable_setting_names() -> Vec<&'static str> {
        sql::SETTINGS_CATALOG
            .iter()
            .filter(|s| s.importable)
            .map(|s| s.name)
            .collect()
    }

    // ------------------------------------------------------------------
    // Plugins
    // ------------------------------------------------------------------

    /// Returns all plugins, ordered by name.
    pub fn plugins(&self) -> Result<Vec<Plugin>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT name, version, enabled FROM plugins ORDER BY name")
            .map_err(|e| Error::operation("load_plugins", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Plugin {
                    name: row.get(0)?,
                    version: row.get(1)?,
                    enabled: row.get(2)?,
                })
            })
            .map_err(|e| Error::operation("load_plugins", e))?;
        rows.collect::<rusqlite::Result<_>>()
            .map_err(|e| Error::operation("load_plugins", e))
    }

    /// Registers (or updates) a plugin.
    pub fn register_plugin(&self, name: &str, version: &str, enabled: bool) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO plugins (name, version, enabled) VALUES (?1, ?2, ?3)
             ON CONFLICT (name) DO UPDATE SET version = excluded.version,
                                             enabled = excluded.enabled",
            params![name, version, enabled],
        )
        .map_err(|e| Error::operation("register_plugin", e))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resource types and metrics
    // ------------------------------------------------------------------

    /// Registers a resource type and returns its id.
    ///
    /// Re-registering an existing `(name, plugin)` pair returns the existing
    /// id.
    pub fn register_resource_type(&self, name: &str, plugin: &str) -> Result<i64> {
        {
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "INSERT OR IGNORE INTO resource_types (name, plugin) VALUES (?1, ?2)",
                params![name, plugin],
            )
            .map_err(|e| Error::operation("register_resource_type", e))?;
        }
        self.resource_type_id(name, plugin)?
            .ok_or_else(|| Error::operation("register_resource_type", "row vanished after insert"))
    }

    /// Looks up a resource type id by name and plugin.
    pub fn resource_type_id(&self, name: &str, plugin: &str) -> Result<Option<i64>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT id FROM resource_types WHERE name = ?1 AND plugin = ?2",
            params![name, plugin],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::operation("load_resource_type", e))
    }

    /// Registers a metric definition and returns its id.
    pub fn register_metric_definition(
        &self,
        resource_type_id: i64,
        name: &str,
        default_interval: i64,
        enabled: bool,
        per_minute: bool,
    ) -> Result<i64> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO metric_definitions
                 (resource_type_id, name, default_interval, enabled, per_minute)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (resource_type_id, name) DO UPDATE SET
                 default_interval = excluded.default_interval,
                 enabled = excluded.enabled,
                 per_minute = excluded.per_minute",
            params![resource_type_id, name, default_interval, enabled, per_minute],
        )
        .map_err(|e| Error::operation("register_metric_definition", e))?;
        conn.query_row(
            "SELECT id FROM metric_definitions WHERE resource_type_id = ?1 AND name = ?2",
            params![resource_type_id, name],
            |row| row.get(0),
        )
        .map_err(|e| Error::operation("register_metric_definition", e))
    }

    /// Returns all metric definitions.
    pub fn metric_definitions(&self) -> Result<Vec<MetricDefinition>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, resource_type_id, name, default_interval, enabled, per_minute
                 FROM metric_definitions ORDER BY id",
            )
            .map_err(|e| Error::operation("load_metric_definitions", e))?;
        let rows = stmt
            .query_map([], Self::definition_from_row)
            .map_err(|e| Error::operation("load_metric_definitions", e))?;
        rows.collect::<rusqlite::Result<_>>()
            .map_err(|e| Error::operation("load_metric_definitions", e))
    }

    /// Returns metric definitions joined with their resource types, ordered
    /// by plugin, type name, and metric name. This is the export order.
    pub fn metric_templates(&self) -> Result<Vec<MetricTemplateRow>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT d.id, d.resource_type_id, d.name, d.default_interval, d.enabled,
                        d.per_minute, t.name, t.plugin
                 FROM metric_definitions d
                 JOIN resource_types t ON t.id = d.resource_type_id
                 ORDER BY t.plugin, t.name, d.name",
            )
            .map_err(|e| Error::operation("load_metric_templates", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MetricTemplateRow {
                    definition: Self::definition_from_row(row)?,
                    resource_type_name: row.get(6)?,
                    resource_type_plugin: row.get(7)?,
                })
            })
            .map_err(|e| Error::operation("load_metric_templates", e))?;
        rows.collect::<rusqlite::Result<_>>()
            .map_err(|e| Error::operation("load_metric_templates", e))
    }

    /// Finds the live metric definition matching an exported template.
    pub fn find_metric_definition(
        &self,
        metric_name: &str,
        resource_type_name: &str,
        resource_type_plugin: &str,
    ) -> Result<Option<MetricDefinition>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT d.id, d.resource_type_id, d.name, d.default_interval, d.enabled,
                    d.per_minute
             FROM metric_definitions d
             JOIN resource_types t ON t.id = d.resource_type_id
             WHERE d.name = ?1 AND t.name = ?2 AND t.plugin = ?3",
            params![metric_name, resource_type_name, resource_type_plugin],
            Self::definition_from_row,
        )
        .optional()
        .map_err(|e| Error::operation("find_metric_definition", e))
    }

    /// Updates a metric definition's default interval and enablement.
    pub fn update_metric_definition(
        &self,
        id: i64,
        default_interval: i64,
        enabled: bool,
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE metric_definitions SET default_interval = ?2, enabled = ?3 WHERE id = ?1",
            params![id, default_interval, enabled],
        )
        .map_err(|e| Error::operation("update_metric_definition", e))?;
        Ok(())
    }

    /// Registers a metric schedule and returns its id.
    pub fn register_schedule(
        &self,
        definition_id: i64,
        resource_key: &str,
        interval: i64,
        enabled: bool,
    ) -> Result<i64> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO metric_schedules (definition_id, resource_key, interval, enabled)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (definition_id, resource_key) DO UPDATE SET
                 interval = excluded.interval,
                 enabled = excluded.enabled",
            params![definition_id, resource_key, interval, enabled],
        )
        .map_err(|e| Error::operation("register_schedule", e))?;
        conn.query_row(
            "SELECT id FROM metric_schedules WHERE definition_id = ?1 AND resource_key = ?2",
            params![definition_id, resource_key],
            |row| row.get(0),
        )
        .map_err(|e| Error::operation("register_schedule", e))
    }

    /// Returns the schedules of one metric definition.
    pub fn schedules_for(&self, definition_id: i64) -> Result<Vec<MetricSchedule>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, definition_id, resource_key, interval, enabled
                 FROM metric_schedules WHERE definition_id = ?1 ORDER BY resource_key",
            )
            .map_err(|e| Error::operation("load_schedules", e))?;
        let rows = stmt
            .query_map(params![definition_id], |row| {
                Ok(MetricSchedule {
                    id: row.get(0)?,
                    definition_id: row.get(1)?,
                    resource_key: row.get(2)?,
                    interval: row.get(3)?,
                    enabled: row.get(4)?,
                })
            })
            .map_err(|e| Error::operation("load_schedules", e))?;
        rows.collect::<rusqlite::Result<_>>()
            .map_err(|e| Error::operation("load_schedules", e))
    }

    /// Pushes an interval and enablement onto every schedule of a definition.
    pub fn update_schedules_of_definition(
        &self,
        definition_id: i64,
        interval: i64,
        enabled: bool,
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE metric_schedules SET interval = ?2, enabled = ?3 WHERE definition_id = ?1",
            params![definition_id, interval, enabled],
        )
        .map_err(|e| Error::operation("update_schedules", e))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Begins a unit of work spanning subsequent store calls.
    ///
    /// Dropping the guard without [`WorkGuard::commit`] rolls everything
    /// back. Used to make an import run atomic.
    pub fn begin_work(&self) -> Result<WorkGuard<'_>> {
        {
            let conn = acquire_lock(&self.conn);
            conn.execute_batch("BEGIN IMMEDIATE")
                .map_err(|e| Error::operation("begin_work", e))?;
        }
        Ok(WorkGuard {
            store: self,
            finished: false,
        })
    }

    /// Returns row counts for status reporting.
    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = acquire_lock(&self.conn);
        let count = |table: &str| -> Result<u64> {
            // COUNT(*) comes back as i64; SQLite has no unsigned column type
            let rows: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .map_err(|e| Error::operation("count_rows", e))?;
            Ok(u64::try_from(rows).unwrap_or_default())
        };
        Ok(StoreCounts {
            settings: count("system_settings")?,
            plugins: count("plugins")?,
            resource_types: count("resource_types")?,
            metric_definitions: count("metric_definitions")?,
            metric_schedules: count("metric_schedules")?,
        })
    }

    fn definition_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetricDefinition> {
        Ok(MetricDefinition {
            id: row.get(0)?,
            resource_type_id: row.get(1)?,
            name: row.get(2)?,
            default_interval: row.get(3)?,
            enabled: row.get(4)?,
            per_minute: row.get(5)?,
        })
    }
}

/// RAII guard for a store-level unit of work.
///
/// The guard does not hold the connection lock; store calls made while it is
/// alive run inside the open transaction.
pub struct WorkGuard<'a> {
    store: &'a SqliteStore,
    finished: bool,
}

impl WorkGuard<'_> {
    /// Commits the unit of work.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let conn = acquire_lock(&self.store.conn);
        conn.execute_batch("COMMIT")
            .map_err(|e| Error::operation("commit_work", e))
    }
}

impl Drop for WorkGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let conn = acquire_lock(&self.store.conn);
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "rollback of abandoned unit of work failed");
            }
            metrics::counter!("confsync_store_rollback_total").increment(1);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn seeds_settings_catalog() {
        let store = SqliteStore::in_memory().unwrap();
        let settings = store.settings().unwrap();
        assert_eq!(settings.len(), sql::SETTINGS_CATALOG.len());
        assert_eq!(
            store.setting("CAM_BASE_URL").unwrap().as_deref(),
            Some("http://localhost:7080")
        );
    }

    #[test]
    fn counts_reflect_store_contents() {
        let store = SqliteStore::in_memory().unwrap();
        let linux = store.register_resource_type("Linux", "Platforms").unwrap();
        store
            .register_metric_definition(linux, "cpu.idle", 60_000, true, false)
            .unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.settings, sql::SETTINGS_CATALOG.len() as u64);
        assert_eq!(counts.resource_types, 1);
        assert_eq!(counts.metric_definitions, 1);
        assert_eq!(counts.metric_schedules, 0);
    }

    #[test]
    fn set_setting_overwrites_value() {
        let store = SqliteStore::in_memory().unwrap();
        store.set_setting("ENABLE_DEBUG_MODE", "true").unwrap();
        assert_eq!(
            store.setting("ENABLE_DEBUG_MODE").unwrap().as_deref(),
            Some("true")
        );
    }

    #[test]
    fn importable_names_exclude_base_url() {
        let names = SqliteStore::importable_setting_names();
        assert!(!names.contains(&"CAM_BASE_URL"));
        assert!(names.contains(&"ENABLE_DEBUG_MODE"));
    }

    #[test]
    fn resource_type_registration_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.register_resource_type("Linux", "Platforms").unwrap();
        let b = store.register_resource_type("Linux", "Platforms").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn metric_templates_sorted_by_plugin_type_metric() {
        let store = SqliteStore::in_memory().unwrap();
        let linux = store.register_resource_type("Linux", "Platforms").unwrap();
        let jvm = store.register_resource_type("JVM", "JMX").unwrap();
        store
            .register_metric_definition(linux, "Free Memory", 60_000, true, false)
            .unwrap();
        store
            .register_metric_definition(jvm, "Heap Used", 120_000, true, false)
            .unwrap();

        let templates = store.metric_templates().unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].resource_type_plugin, "JMX");
        assert_eq!(templates[1].definition.name, "Free Memory");
    }

    #[test]
    fn dropped_work_guard_rolls_back() {
        let store = SqliteStore::in_memory().unwrap();
        {
            let _work = store.begin_work().unwrap();
            store.set_setting("ENABLE_DEBUG_MODE", "true").unwrap();
        }
        assert_eq!(
            store.setting("ENABLE_DEBUG_MODE").unwrap().as_deref(),
            Some("false")
        );
    }

    #[test]
    fn committed_work_guard_persists() {
        let store = SqliteStore::in_memory().unwrap();
        let work = store.begin_work().unwrap();
        store.set_setting("ENABLE_DEBUG_MODE", "true").unwrap();
        work.commit().unwrap();
        assert_eq!(
            store.setting("ENABLE_DEBUG_MODE").unwrap().as_deref(),
            Some("true")
        );
    }

    #[test]
    fn schedules_update_in_bulk() {
        let store = SqliteStore::in_memory().unwrap();
        let rt = store.register_resource_type("Linux", "Platforms").unwrap();
        let def = store
            .register_metric_definition(rt, "Load", 60_000, true, false)
            .unwrap();
        store.register_schedule(def, "host-a", 60_000, true).unwrap();
        store.register_schedule(def, "host-b", 60_000, true).unwrap();

        store
            .update_schedules_of_definition(def, 300_000, false)
            .unwrap();
        let schedules = store.schedules_for(def).unwrap();
        assert!(schedules.iter().all(|s| s.interval == 300_000 && !s.enabled));
    }
}
