//! Configuration management.

use crate::sync::ExportOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration for confsync.
#[derive(Debug, Clone)]
pub struct ConfsyncConfig {
    /// Path to the data directory holding the system store.
    pub data_dir: PathBuf,
    /// Export output options.
    pub export: ExportSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Export output settings.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    /// Whether export output is gzipped.
    pub compress: bool,
    /// Gzip compression level, 0-9.
    pub level: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        let defaults = ExportOptions::default();
        Self {
            compress: defaults.compress,
            level: defaults.level,
        }
    }
}

impl ExportSettings {
    /// Converts the settings into exporter options.
    #[must_use]
    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            compress: self.compress,
            level: self.level,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default)]
pub struct LoggingSettings {
    /// Log output format: "pretty" or "json".
    pub format: Option<String>,
    /// Log file path; stderr when unset.
    pub file: Option<PathBuf>,
    /// Filter directive, e.g. "confsync=debug".
    pub filter: Option<String>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Export section.
    pub export: Option<ConfigFileExport>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Export section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileExport {
    /// Whether to gzip export output.
    pub compress: Option<bool>,
    /// Gzip compression level.
    pub level: Option<u32>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Output format.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
    /// Filter directive.
    pub filter: Option<String>,
}

impl Default for ConfsyncConfig {
    fn default() -> Self {
        let data_dir = directories::ProjectDirs::from("", "", "confsync")
            .map_or_else(|| PathBuf::from(".confsync"), |dirs| dirs.data_dir().to_path_buf());
        Self {
            data_dir,
            export: ExportSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ConfsyncConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/confsync/` on macOS)
    /// 2. XDG config dir (`~/.config/confsync/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        // Check platform-specific config dir first
        let platform_config = base_dirs.config_dir().join("confsync").join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        // Fall back to XDG-style ~/.config/confsync/ for Unix compatibility
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("confsync")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `ConfsyncConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(export) = file.export {
            if let Some(compress) = export.compress {
                config.export.compress = compress;
            }
            if let Some(level) = export.level {
                config.export.level = level.min(9);
            }
        }
        if let Some(logging) = file.logging {
            config.logging.format = logging.format;
            config.logging.file = logging.file.map(PathBuf::from);
            config.logging.filter = logging.filter;
        }

        config
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Path of the system store database inside the data directory.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("confsync.db")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            data_dir = "/var/lib/confsync"

            [export]
            compress = false
            level = 3

            [logging]
            format = "json"
            filter = "confsync=debug"
            "#,
        )
        .unwrap();
        let config = ConfsyncConfig::from_config_file(file);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/confsync"));
        assert!(!config.export.compress);
        assert_eq!(config.export.level, 3);
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert_eq!(config.logging.filter.as_deref(), Some("confsync=debug"));
    }

    #[test]
    fn empty_file_keeps_defaults() {
        let config = ConfsyncConfig::from_config_file(ConfigFile::default());
        assert!(config.export.compress);
        assert_eq!(config.export.level, 6);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn compression_level_is_clamped() {
        let file: ConfigFile = toml::from_str("[export]\nlevel = 42\n").unwrap();
        let config = ConfsyncConfig::from_config_file(file);
        assert_eq!(config.export.level, 9);
    }
}
