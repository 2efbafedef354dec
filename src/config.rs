//! Runtime configuration for keyspace-report.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Command-line flags override whatever the file provides.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "keyspace-report",
    about = "Generates a memory utilization report from the keys of a Redis store"
)]
pub struct Cli {
    /// Name of this report (e.g. --name clientname). The aggregated keyspace
    /// is stored locally under this name so that future reports take less time.
    #[arg(long)]
    pub name: String,

    /// Discard the stored snapshot and rescan the store.
    #[arg(long)]
    pub regenerate: bool,

    /// How many levels deep the report should render.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub level: Option<u32>,

    /// Only show keys starting with this prefix (a trailing `*` is ignored).
    #[arg(long)]
    pub prefix: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "keyspace-report.json")]
    pub config: PathBuf,

    /// Store connection URL, overrides the configuration file.
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Directory holding report snapshots, overrides the configuration file.
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// Rebuild the snapshot if the live key set no longer matches it.
    #[arg(long)]
    pub verify_keyspace: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// How the report is written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Fixed-width console table.
    Table,
    /// JSON array of report rows.
    Json,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing store connection.
    pub store: StoreConfig,

    /// Snapshot cache settings.
    pub snapshot: SnapshotConfig,

    /// Report shape.
    pub report: ReportConfig,
}

/// Backing store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection URL (redis://host:port/db).
    pub url: String,

    /// `COUNT` hint for each SCAN round trip.
    pub scan_count: usize,

    /// Log aggregation progress every this many probed keys (0 = never).
    pub progress_every: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://redis_monitor_db:6379/0".to_string(),
            scan_count: 1000,
            progress_every: 10_000,
        }
    }
}

/// Snapshot cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Directory where `<name>.snapshot` files live.
    pub dir: PathBuf,

    /// zstd compression level (1-22).
    pub zstd_level: i32,

    /// Compare the stored keyspace fingerprint with the live store before
    /// trusting a snapshot.
    pub verify_keyspace: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/data"),
            zstd_level: 3,
            verify_keyspace: false,
        }
    }
}

/// Report shape settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Depth used when neither `--level` nor `--prefix` decide it.
    pub default_levels: u32,

    /// Keys longer than this are truncated in the table.
    pub key_width: usize,

    /// Separator between key segments.
    pub delimiter: char,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_levels: 3,
            key_width: 80,
            delimiter: ':',
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides on top of the loaded file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.redis_url {
            self.store.url = url.clone();
        }
        if let Some(dir) = &cli.snapshot_dir {
            self.snapshot.dir = dir.clone();
        }
        if cli.verify_keyspace {
            self.snapshot.verify_keyspace = true;
        }
    }
}
