use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

// Well-known paths relative to data_dir
pub const BACKUPS_DIR_NAME: &str = "backups";
pub const UPLOADS_DIR_NAME: &str = "uploads";
pub const ASSETS_DIR_NAME: &str = "public";
pub const TEMP_DIR_NAME: &str = "temp";

pub const DATABASE_URL_ENV: &str = "SAFEKEEP_DATABASE_URL";
pub const FALLBACK_DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const DATA_DIR_ENV: &str = "SAFEKEEP_DATA_DIR";
const RETENTION_INTERVAL_ENV: &str = "SAFEKEEP_RETENTION_INTERVAL";

const DEFAULT_RETENTION_INTERVAL_SECS: u64 = 3600;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error preparing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {details}")]
    InvalidConfiguration { details: String },
}

/// Filesystem layout and connection settings for one Safekeep instance.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Connection string of the live database. Only the dump adapter
    /// requires it, so a missing value is not an error here.
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub retention_interval_secs: u64,
}

impl ServerConfig {
    /// Derive the standard layout under `data_dir`.
    pub fn new(database_url: Option<String>, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            database_url: database_url.filter(|url| !url.trim().is_empty()),
            backups_dir: data_dir.join(BACKUPS_DIR_NAME),
            uploads_dir: data_dir.join(UPLOADS_DIR_NAME),
            assets_dir: data_dir.join(ASSETS_DIR_NAME),
            temp_dir: data_dir.join(TEMP_DIR_NAME),
            retention_interval_secs: DEFAULT_RETENTION_INTERVAL_SECS,
            data_dir,
        }
    }

    /// Build from `SAFEKEEP_*` environment variables.
    pub fn from_env() -> Self {
        let data_dir = std::env::var(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let database_url = resolve_database_url(
            std::env::var(DATABASE_URL_ENV).ok(),
            std::env::var(FALLBACK_DATABASE_URL_ENV).ok(),
        );

        let mut config = Self::new(database_url, data_dir);
        if let Some(interval) = std::env::var(RETENTION_INTERVAL_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.retention_interval_secs = interval;
        }
        config
    }

    pub fn with_uploads_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.uploads_dir = path.into();
        self
    }

    pub fn with_assets_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.assets_dir = path.into();
        self
    }

    pub fn with_backups_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.backups_dir = path.into();
        self
    }

    pub fn with_temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = path.into();
        self
    }

    pub fn with_retention_interval_secs(mut self, secs: u64) -> Self {
        self.retention_interval_secs = secs;
        self
    }

    /// Extraction staging area of one restore: `temp/restore/restore-<id>`.
    pub fn restore_staging_dir(&self, restore_id: i32) -> PathBuf {
        self.temp_dir
            .join("restore")
            .join(format!("restore-{}", restore_id))
    }

    /// Scratch area of one backup run: `temp/backup/backup-<id>`.
    pub fn backup_staging_dir(&self, backup_id: i32) -> PathBuf {
        self.temp_dir
            .join("backup")
            .join(format!("backup-{}", backup_id))
    }

    /// Name the uploads tree has inside an archive.
    pub fn uploads_entry_name(&self) -> String {
        entry_name(&self.uploads_dir, UPLOADS_DIR_NAME)
    }

    /// Name the assets tree has inside an archive.
    pub fn assets_entry_name(&self) -> String {
        entry_name(&self.assets_dir, ASSETS_DIR_NAME)
    }

    /// Create the directories the service writes into.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        if self.uploads_entry_name() == self.assets_entry_name() {
            return Err(ConfigError::InvalidConfiguration {
                details: format!(
                    "uploads and assets directories must have distinct names, both are '{}'",
                    self.uploads_entry_name()
                ),
            });
        }

        for dir in [&self.backups_dir, &self.temp_dir] {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        debug!(
            backups_dir = %self.backups_dir.display(),
            temp_dir = %self.temp_dir.display(),
            "Data directories ready"
        );
        Ok(())
    }
}

/// `SAFEKEEP_DATABASE_URL` wins over the generic `DATABASE_URL`; blank
/// values count as unset.
pub fn resolve_database_url(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|url| !url.trim().is_empty())
        .or_else(|| fallback.filter(|url| !url.trim().is_empty()))
}

fn entry_name(path: &Path, default: &str) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| default.to_string())
}
