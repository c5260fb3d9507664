//! Schema and the system settings catalog.

/// One entry of the system settings catalog.
#[derive(Debug, Clone, Copy)]
pub struct SettingDef {
    /// Setting name.
    pub name: &'static str,
    /// Value seeded at store initialization.
    pub default_value: &'static str,
    /// Whether an import may overwrite the setting.
    ///
    /// Settings identifying the server instance are never importable.
    pub importable: bool,
}

/// The full catalog of system settings.
///
/// Every store carries a row for each entry; seeding uses `INSERT OR IGNORE`
/// so existing values survive re-open.
pub const SETTINGS_CATALOG: &[SettingDef] = &[
    SettingDef {
        name: "CAM_BASE_URL",
        default_value: "http://localhost:7080",
        importable: false,
    },
    SettingDef {
        name: "CAM_EMAIL_SENDER_ADDRESS",
        default_value: "admin@localhost",
        importable: true,
    },
    SettingDef {
        name: "CAM_EMAIL_SMTP_HOST",
        default_value: "localhost",
        importable: true,
    },
    SettingDef {
        name: "CAM_EMAIL_SMTP_PORT",
        default_value: "25",
        importable: true,
    },
    SettingDef {
        name: "AGENT_MAX_QUIET_TIME_ALLOWED",
        default_value: "900000",
        importable: true,
    },
    SettingDef {
        name: "ENABLE_AGENT_AUTO_UPDATE",
        default_value: "true",
        importable: true,
    },
    SettingDef {
        name: "ENABLE_DEBUG_MODE",
        default_value: "false",
        importable: true,
    },
    SettingDef {
        name: "ENABLE_EXPERIMENTAL_FEATURES",
        default_value: "false",
        importable: true,
    },
    SettingDef {
        name: "CAM_DATA_MAINTENANCE",
        default_value: "3600000",
        importable: true,
    },
    SettingDef {
        name: "CAM_DATA_PURGE_1H",
        default_value: "1209600000",
        importable: true,
    },
    SettingDef {
        name: "CAM_DATA_PURGE_6H",
        default_value: "2678400000",
        importable: true,
    },
    SettingDef {
        name: "CAM_DATA_PURGE_1D",
        default_value: "31536000000",
        importable: true,
    },
    SettingDef {
        name: "AVAILABILITY_PURGE",
        default_value: "31536000000",
        importable: true,
    },
    SettingDef {
        name: "ALERT_PURGE",
        default_value: "2678400000",
        importable: true,
    },
    SettingDef {
        name: "EVENT_PURGE",
        default_value: "1209600000",
        importable: true,
    },
    SettingDef {
        name: "TRAIT_PURGE",
        default_value: "31536000000",
        importable: true,
    },
    SettingDef {
        name: "RT_DATA_PURGE",
        default_value: "2678400000",
        importable: true,
    },
    SettingDef {
        name: "DRIFT_FILE_PURGE",
        default_value: "2678400000",
        importable: true,
    },
    SettingDef {
        name: "CAM_BASELINE_FREQUENCY",
        default_value: "259200000",
        importable: true,
    },
    SettingDef {
        name: "CAM_BASELINE_DATASET",
        default_value: "1209600000",
        importable: true,
    },
];

/// Schema creation statements, applied on every open.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS system_settings (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS plugins (
    name TEXT PRIMARY KEY,
    version TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS resource_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    plugin TEXT NOT NULL,
    UNIQUE (name, plugin)
);

CREATE TABLE IF NOT EXISTS metric_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_type_id INTEGER NOT NULL REFERENCES resource_types (id),
    name TEXT NOT NULL,
    default_interval INTEGER NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    per_minute INTEGER NOT NULL DEFAULT 0,
    UNIQUE (resource_type_id, name)
);

CREATE TABLE IF NOT EXISTS metric_schedules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    definition_id INTEGER NOT NULL REFERENCES metric_definitions (id),
    resource_key TEXT NOT NULL,
    interval INTEGER NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    UNIQUE (definition_id, resource_key)
);

CREATE INDEX IF NOT EXISTS idx_metric_definitions_type
    ON metric_definitions (resource_type_id);
CREATE INDEX IF NOT EXISTS idx_metric_schedules_definition
    ON metric_schedules (definition_id);
";
