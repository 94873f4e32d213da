use clap::{Args, ValueEnum};
use safekeep_backup::{
    BackupConfigService, BackupOrchestrator, OperationLeases, PgDumpAdapter, RestoreOrchestrator,
};
use safekeep_config::{resolve_database_url, ServerConfig, FALLBACK_DATABASE_URL_ENV};
use safekeep_database::DbConnection;
use safekeep_entities::types::BackupType;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Where the live database and the data directory are.
#[derive(Args, Clone, Debug)]
pub struct ConnectionArgs {
    /// Database connection URL (falls back to DATABASE_URL)
    #[arg(long, env = "SAFEKEEP_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Data directory holding backups/, uploads/, public/ and temp/
    #[arg(long, env = "SAFEKEEP_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Override the uploads directory
    #[arg(long, env = "SAFEKEEP_UPLOADS_DIR")]
    pub uploads_dir: Option<PathBuf>,

    /// Override the static assets directory
    #[arg(long, env = "SAFEKEEP_ASSETS_DIR")]
    pub assets_dir: Option<PathBuf>,
}

impl ConnectionArgs {
    pub fn server_config(&self) -> ServerConfig {
        let database_url = resolve_database_url(
            self.database_url.clone(),
            std::env::var(FALLBACK_DATABASE_URL_ENV).ok(),
        );
        let mut config = ServerConfig::new(database_url, self.data_dir.clone());
        if let Some(dir) = &self.uploads_dir {
            config = config.with_uploads_dir(dir.clone());
        }
        if let Some(dir) = &self.assets_dir {
            config = config.with_assets_dir(dir.clone());
        }
        config
    }
}

/// Backup types as they are spelled on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupKind {
    Full,
    DatabaseOnly,
    FilesOnly,
    SettingsOnly,
}

impl From<BackupKind> for BackupType {
    fn from(kind: BackupKind) -> Self {
        match kind {
            BackupKind::Full => BackupType::Full,
            BackupKind::DatabaseOnly => BackupType::DatabaseOnly,
            BackupKind::FilesOnly => BackupType::FilesOnly,
            BackupKind::SettingsOnly => BackupType::SettingsOnly,
        }
    }
}

/// Everything a command needs, wired the same way `serve` wires it.
pub struct AppContext {
    pub db: Arc<DbConnection>,
    pub config: Arc<ServerConfig>,
    pub backups: Arc<BackupOrchestrator>,
    pub restores: Arc<RestoreOrchestrator>,
    pub configs: BackupConfigService,
}

impl AppContext {
    pub async fn build(config: ServerConfig) -> anyhow::Result<Self> {
        let database_url = config.database_url.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "A database URL is required: pass --database-url or set SAFEKEEP_DATABASE_URL or DATABASE_URL"
            )
        })?;
        config.ensure_directories()?;
        let config = Arc::new(config);

        debug!("Initializing database connection...");
        let db = safekeep_database::establish_connection(&database_url).await?;

        let dumper = Arc::new(PgDumpAdapter::new(
            Some(database_url),
            config.backups_dir.clone(),
        ));
        let backups = Arc::new(BackupOrchestrator::new(
            db.clone(),
            config.clone(),
            dumper.clone(),
            OperationLeases::new(),
        ));
        let restores = Arc::new(RestoreOrchestrator::new(
            db.clone(),
            config.clone(),
            dumper,
            backups.clone(),
        ));

        Ok(Self {
            configs: BackupConfigService::new(db.clone()),
            db,
            config,
            backups,
            restores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(data_dir: &str) -> ConnectionArgs {
        ConnectionArgs {
            database_url: Some("postgres://app@localhost/app".into()),
            data_dir: PathBuf::from(data_dir),
            uploads_dir: None,
            assets_dir: None,
        }
    }

    #[test]
    fn test_layout_derived_from_data_dir() {
        let config = args("/srv/safekeep").server_config();
        assert_eq!(config.backups_dir, PathBuf::from("/srv/safekeep/backups"));
        assert_eq!(config.uploads_dir, PathBuf::from("/srv/safekeep/uploads"));
        assert_eq!(config.database_url.as_deref(), Some("postgres://app@localhost/app"));
    }

    #[test]
    fn test_directory_overrides() {
        let mut args = args("/srv/safekeep");
        args.uploads_dir = Some(PathBuf::from("/mnt/media"));
        args.assets_dir = Some(PathBuf::from("/var/www/static"));

        let config = args.server_config();
        assert_eq!(config.uploads_dir, PathBuf::from("/mnt/media"));
        assert_eq!(config.assets_entry_name(), "static");
    }

    #[test]
    fn test_backup_kind_maps_to_type() {
        assert_eq!(BackupType::from(BackupKind::DatabaseOnly), BackupType::DatabaseOnly);
        assert_eq!(
            BackupKind::from_str("settings-only", true).unwrap(),
            BackupKind::SettingsOnly
        );
    }
}
