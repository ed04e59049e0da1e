// mongobackup/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BACKUP_ROOT: &str = "./backups";
pub const DEFAULT_MAX_BACKUP_SIZE_BYTES: u64 = 512 * 1024 * 1024;
pub const DEFAULT_RETENTION_HOURS: u64 = 1;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Struct for deserializing config.json. Every field is optional; missing
/// fields fall back to the defaults above.
///
/// The MongoDB connection string is deliberately not part of this file; it
/// is read from the `MONGODB_URI` environment variable and never persisted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub backup_root: Option<PathBuf>,
    pub max_backup_size_bytes: Option<u64>,
    pub retention_hours: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
}

/// Application's internal, validated configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backup_root: PathBuf,
    pub max_backup_size: u64,
    pub retention: Duration,
    pub sweep_interval: Duration,
}

impl AppConfig {
    /// Loads configuration from a JSON file. A missing file is not an error:
    /// the tool runs with defaults.
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let raw = if config_path.exists() {
            let config_content = fs::read_to_string(config_path).with_context(|| {
                format!("Failed to read config file at {}", config_path.display())
            })?;
            serde_json::from_str(&config_content).with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?
        } else {
            RawJsonConfig::default()
        };
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let backup_root = raw
            .backup_root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_ROOT));
        if backup_root.as_os_str().is_empty() {
            anyhow::bail!("backup_root cannot be empty in config.json");
        }

        let max_backup_size = raw
            .max_backup_size_bytes
            .unwrap_or(DEFAULT_MAX_BACKUP_SIZE_BYTES);
        if max_backup_size == 0 {
            anyhow::bail!("max_backup_size_bytes must be greater than zero");
        }

        let retention_hours = raw.retention_hours.unwrap_or(DEFAULT_RETENTION_HOURS);

        let sweep_interval_secs = raw
            .sweep_interval_secs
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        if sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be greater than zero");
        }

        Ok(AppConfig {
            backup_root,
            max_backup_size,
            retention: Duration::from_secs(retention_hours * 3600),
            sweep_interval: Duration::from_secs(sweep_interval_secs),
        })
    }
}

/// Reads the MongoDB connection string from the environment. The value is
/// passed straight to the driver and the external tools; it is never logged.
pub fn mongo_uri_from_env() -> Result<String> {
    std::env::var("MONGODB_URI")
        .context("MONGODB_URI must be set (the connection string is never read from config.json)")
}
