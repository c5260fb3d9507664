//! Binary entry point for confsync.
//!
//! This binary provides the CLI interface for the configuration
//! synchronization tooling.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow unnecessary_wraps for consistent command function signatures
#![allow(clippy::unnecessary_wraps)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use confsync::config::ConfsyncConfig;
use confsync::observability::{self, LoggingConfig};
use confsync::sync::ExportOptions;
use confsync::{
    ImportConfig, ImportConfiguration, PropertyValue, SqliteStore, SyncService,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Confsync - configuration export/import between management servers.
#[derive(Parser)]
#[command(name = "confsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Data directory holding the system store.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Export this server's configuration.
    Export {
        /// Output file (default: confsync-export.xml.gz).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write plain XML instead of gzip.
        #[arg(long)]
        plain: bool,

        /// Write the document to stdout instead of a file.
        #[arg(long)]
        stdout: bool,
    },

    /// Validate and import an export document.
    Import {
        /// The export document to import.
        file: PathBuf,

        /// Importer configuration entries, as SYNCHRONIZER:KEY=VALUE.
        #[arg(long = "set", value_name = "SYNC:KEY=VALUE")]
        set: Vec<String>,

        /// JSON file with importer configurations.
        #[arg(long)]
        config_file: Option<PathBuf>,
    },

    /// Validate an export document against this server without importing.
    Validate {
        /// The export document to validate.
        file: PathBuf,

        /// Importer configuration entries, as SYNCHRONIZER:KEY=VALUE.
        #[arg(long = "set", value_name = "SYNC:KEY=VALUE")]
        set: Vec<String>,

        /// JSON file with importer configurations.
        #[arg(long)]
        config_file: Option<PathBuf>,
    },

    /// Show importer configuration definitions.
    Definitions {
        /// Only show one synchronizer.
        synchronizer: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the system store status.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    Completions {
        /// The shell to generate completions for.
        shell: Shell,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };
    if let Some(data_dir) = &cli.data_dir {
        config = config.with_data_dir(data_dir);
    }

    if let Err(e) = observability::init(LoggingConfig::from_settings(
        Some(&config.logging),
        cli.verbose,
    )) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, config: ConfsyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Export {
            output,
            plain,
            stdout,
        } => cmd_export(&config, output, plain, stdout),

        Commands::Import {
            file,
            set,
            config_file,
        } => cmd_import(&config, &file, &set, config_file.as_deref()),

        Commands::Validate {
            file,
            set,
            config_file,
        } => cmd_validate(&config, &file, &set, config_file.as_deref()),

        Commands::Definitions { synchronizer, json } => {
            cmd_definitions(&config, synchronizer.as_deref(), json)
        },

        Commands::Status { json } => cmd_status(&config, json),

        Commands::Completions { shell } => cmd_completions(shell),
    }
}

/// Loads configuration.
fn load_config(path: Option<&str>) -> Result<ConfsyncConfig, Box<dyn std::error::Error>> {
    // If a path is provided, load from that file
    if let Some(config_path) = path {
        return ConfsyncConfig::load_from_file(Path::new(config_path))
            .map_err(std::convert::Into::into);
    }

    // Environment override for config path
    if let Ok(config_path) = std::env::var("CONFSYNC_CONFIG_PATH") {
        if !config_path.trim().is_empty() {
            return ConfsyncConfig::load_from_file(Path::new(&config_path))
                .map_err(std::convert::Into::into);
        }
    }

    // Otherwise, load from default location
    Ok(ConfsyncConfig::load_default())
}

/// Opens the system store inside the configured data directory.
fn open_service(config: &ConfsyncConfig) -> Result<SyncService, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(SqliteStore::new(config.db_path())?);
    Ok(SyncService::new(store))
}

/// Export command.
fn cmd_export(
    config: &ConfsyncConfig,
    output: Option<PathBuf>,
    plain: bool,
    stdout: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let mut options = config.export.options();
    if plain {
        options = ExportOptions {
            compress: false,
            ..options
        };
    }

    let mut reader = service.export_reader(&options)?;
    let messages = reader.messages();

    if stdout {
        let mut out = io::stdout().lock();
        io::copy(&mut reader, &mut out)?;
        out.flush()?;
    } else {
        let path = output.unwrap_or_else(|| {
            PathBuf::from(if options.compress {
                "confsync-export.xml.gz"
            } else {
                "confsync-export.xml"
            })
        });
        let mut file = File::create(&path)?;
        let bytes = io::copy(&mut reader, &mut file)?;
        println!("Wrote {bytes} bytes to {}", path.display());
    }

    for (id, messages) in messages.snapshot() {
        if let Some(notes) = &messages.notes {
            eprintln!("{id}: {notes}");
        }
        for error in &messages.errors {
            eprintln!("{id}: export error: {error}");
        }
    }
    Ok(())
}

/// Import command.
fn cmd_import(
    config: &ConfsyncConfig,
    file: &Path,
    set: &[String],
    config_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let configurations = build_configurations(set, config_file)?;

    let input = File::open(file)?;
    let report = service.import(input, &configurations)?;

    println!("Import complete");
    for (id, notes) in &report.importer_notes {
        println!("{id}: {notes}");
    }
    Ok(())
}

/// Validate command.
fn cmd_validate(
    config: &ConfsyncConfig,
    file: &Path,
    set: &[String],
    config_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let configurations = build_configurations(set, config_file)?;

    let input = BufReader::new(File::open(file)?);
    match service.validate(input, &configurations) {
        Ok(()) => {
            println!("Document is valid");
            Ok(())
        },
        Err(confsync::Error::Validation(report)) => {
            eprintln!("Validation found {} failure(s):", report.failures.len());
            for failure in &report.failures {
                eprintln!("  [{}] {}", failure.validator, failure.message);
            }
            Err("validation failed".into())
        },
        Err(e) => Err(e.into()),
    }
}

/// Definitions command.
fn cmd_definitions(
    config: &ConfsyncConfig,
    synchronizer: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let definitions = match synchronizer {
        Some(id) => vec![(id.to_string(), service.configuration_definition(id)?)],
        None => service
            .configuration_definitions()
            .into_iter()
            .map(|(id, def)| (id.to_string(), def))
            .collect(),
    };

    if json {
        let map: BTreeMap<_, _> = definitions.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    for (id, definition) in definitions {
        println!("{id}:");
        for property in &definition.properties {
            let default = property
                .default
                .as_ref()
                .and_then(PropertyValue::as_simple)
                .unwrap_or("-");
            println!(
                "  {} ({}) [default: {}]",
                property.name,
                property.kind.as_str(),
                default
            );
            println!("      {}", property.description);
        }
    }
    Ok(())
}

/// Status command.
fn cmd_status(config: &ConfsyncConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let counts = service.store().counts()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!("Store: {}", config.db_path().display());
    println!("  system settings:    {}", counts.settings);
    println!("  plugins:            {}", counts.plugins);
    println!("  resource types:     {}", counts.resource_types);
    println!("  metric definitions: {}", counts.metric_definitions);
    println!("  metric schedules:   {}", counts.metric_schedules);
    Ok(())
}

/// Completions command.
fn cmd_completions(shell: Shell) -> Result<(), Box<dyn std::error::Error>> {
    clap_complete::generate(shell, &mut Cli::command(), "confsync", &mut io::stdout());
    Ok(())
}

/// Builds importer configurations from `--set` entries and an optional JSON
/// file. `--set` entries win over the file.
fn build_configurations(
    set: &[String],
    config_file: Option<&Path>,
) -> Result<Vec<ImportConfiguration>, Box<dyn std::error::Error>> {
    let mut by_synchronizer: BTreeMap<String, ImportConfig> = BTreeMap::new();

    if let Some(path) = config_file {
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        let parsed: serde_json::Value = serde_json::from_str(&contents)?;
        let entries = parsed
            .as_object()
            .ok_or("configuration file must be a JSON object keyed by synchronizer id")?;
        for (id, values) in entries {
            let values = values
                .as_object()
                .ok_or_else(|| format!("configuration for '{id}' must be a JSON object"))?;
            let config = by_synchronizer.entry(id.clone()).or_default();
            for (name, value) in values {
                config.set(name, PropertyValue::from_json(value));
            }
        }
    }

    for entry in set {
        let (synchronizer, assignment) = entry
            .split_once(':')
            .ok_or_else(|| format!("invalid --set entry '{entry}', expected SYNC:KEY=VALUE"))?;
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| format!("invalid --set entry '{entry}', expected SYNC:KEY=VALUE"))?;
        by_synchronizer
            .entry(synchronizer.to_string())
            .or_default()
            .set(key, PropertyValue::simple(value));
    }

    Ok(by_synchronizer
        .into_iter()
        .map(|(id, config)| ImportConfiguration::new(id, config))
        .collect())
}
