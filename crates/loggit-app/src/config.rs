//! Configuration loading from file and environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use loggit_db::DbRuntimeSettings;
use loggit_sync::{RetryPolicy, SyncOptions};
use serde::Deserialize;
use thiserror::Error;

use crate::import::ImportOptions;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how the local databases are opened.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the event and settings databases.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections per database.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Replication tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Documents per push or pull request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    /// Consecutive failures before a session gives up. Unset retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// How long the CLI waits for pending changes to reach the remote.
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

/// Bulk import throttling.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    /// Imports larger than this are split into chunks of this size.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pause between consecutive chunks, in milliseconds.
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "loggit_sync=debug,warn").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".loggit")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    4
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_batch_size() -> usize {
    100
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> u32 {
    2
}

fn default_flush_timeout_ms() -> u64 {
    10_000
}

fn default_chunk_size() -> usize {
    200
}

fn default_pause_ms() -> u64 {
    1_000
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_attempts: None,
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            pause_ms: default_pause_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl StorageConfig {
    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.db")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.db")
    }

    pub fn runtime(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

impl SyncConfig {
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            batch_size: self.batch_size,
            retry: RetryPolicy {
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
                multiplier: self.backoff_multiplier,
                max_attempts: self.max_attempts,
            },
        }
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl ImportConfig {
    pub fn options(&self) -> ImportOptions {
        ImportOptions {
            chunk_size: self.chunk_size,
            pause: Duration::from_millis(self.pause_ms),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `LOGGIT_DATA_DIR` overrides `storage.data_dir`
/// - `LOGGIT_LOG_LEVEL` overrides `logging.level`
/// - `LOGGIT_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `LOGGIT_SYNC_POLL_MS` overrides `sync.poll_interval_ms`
/// - `LOGGIT_IMPORT_CHUNK_SIZE` overrides `import.chunk_size`
/// - `LOGGIT_IMPORT_PAUSE_MS` overrides `import.pause_ms`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %p.display(), "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides<F>(config: &mut Config, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = var("LOGGIT_DATA_DIR").filter(|d| !d.trim().is_empty()) {
        config.storage.data_dir = PathBuf::from(dir);
    }
    if let Some(level) = var("LOGGIT_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("LOGGIT_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(parsed) = var("LOGGIT_SYNC_POLL_MS").and_then(|v| v.parse().ok()) {
        config.sync.poll_interval_ms = parsed;
    }
    if let Some(parsed) = var("LOGGIT_IMPORT_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
        config.import.chunk_size = parsed;
    }
    if let Some(parsed) = var("LOGGIT_IMPORT_PAUSE_MS").and_then(|v| v.parse().ok()) {
        config.import.pause_ms = parsed;
    }
}
