use chrono::{DateTime, Utc};
use safekeep_config::ServerConfig;
use safekeep_core::{elapsed_secs, DBDateTime};
use safekeep_entities::types::{BackupFileType, BackupType, OperationStatus, TriggerSource};
use safekeep_entities::{backup_files, backups, operation_logs, restores};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::archive::{ArchiveCodec, DEFAULT_COMPRESSION_LEVEL};
use super::checksum::{ChecksumAlgorithm, ChecksumEngine};
use super::configs::{BackupConfigService, SETTINGS_FILE_NAME};
use super::dump::DatabaseDumper;
use super::leases::{Lease, LeaseKey, OperationLeases};
use super::operation_log::{LogOwner, OperationLog};
use super::replicator::FileTreeReplicator;
use super::BackupError;

/// What to capture and how to package it.
#[derive(Debug, Clone)]
pub struct CreateBackupOptions {
    pub name: String,
    pub description: Option<String>,
    pub backup_type: BackupType,
    pub include_uploads: bool,
    pub include_assets: bool,
    pub include_settings: bool,
    /// Recorded in the metadata; operation logs live in the database and
    /// are not archived separately.
    pub include_logs: bool,
    pub compression_enabled: bool,
    pub compression_level: u8,
    pub created_by: Option<i32>,
    pub triggered_by: TriggerSource,
    pub config_id: Option<i32>,
}

impl CreateBackupOptions {
    pub fn new(name: impl Into<String>, backup_type: BackupType) -> Self {
        Self {
            name: name.into(),
            description: None,
            backup_type,
            include_uploads: true,
            include_assets: true,
            include_settings: true,
            include_logs: true,
            compression_enabled: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            created_by: None,
            triggered_by: TriggerSource::Manual,
            config_id: None,
        }
    }

    fn effective_level(&self) -> u8 {
        if self.compression_enabled {
            self.compression_level
        } else {
            0
        }
    }

    fn validate(&self) -> Result<(), BackupError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        }
        if self.compression_level > 9 {
            errors.push(format!(
                "compression level {} is out of range 0-9",
                self.compression_level
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BackupError::Validation(errors))
        }
    }
}

/// One component headed for the archive.
#[derive(Debug, Clone)]
struct ManifestEntry {
    source: PathBuf,
    file_path: String,
    file_name: String,
    file_type: BackupFileType,
    file_size: i64,
    checksum: Option<String>,
    last_modified: Option<DBDateTime>,
}

/// Transient artifacts of one run, removed whatever the outcome.
#[derive(Debug, Default)]
struct Scratch {
    sql_dump: Option<PathBuf>,
    archive: Option<PathBuf>,
}

/// Drives the backup pipeline and owns the backup records.
pub struct BackupOrchestrator {
    db: Arc<DatabaseConnection>,
    config: Arc<ServerConfig>,
    dumper: Arc<dyn DatabaseDumper>,
    settings: BackupConfigService,
    archive: ArchiveCodec,
    checksums: ChecksumEngine,
    replicator: FileTreeReplicator,
    log: OperationLog,
    leases: OperationLeases,
}

impl BackupOrchestrator {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<ServerConfig>,
        dumper: Arc<dyn DatabaseDumper>,
        leases: OperationLeases,
    ) -> Self {
        Self {
            settings: BackupConfigService::new(db.clone()),
            log: OperationLog::new(db.clone()),
            archive: ArchiveCodec::new(),
            checksums: ChecksumEngine::new(),
            replicator: FileTreeReplicator::new(),
            db,
            config,
            dumper,
            leases,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn leases(&self) -> &OperationLeases {
        &self.leases
    }

    pub fn operation_log(&self) -> &OperationLog {
        &self.log
    }

    /// Run a backup to completion and return its id. On failure the row is
    /// left `failed` and the error is returned.
    pub async fn create_backup(&self, options: CreateBackupOptions) -> Result<i32, BackupError> {
        let (backup, _lease) = self.begin(&options).await?;
        let id = backup.id;
        self.run_pipeline(backup, options).await?;
        Ok(id)
    }

    /// Create the row and run the pipeline in the background. Poll
    /// [`BackupOrchestrator::get_backup`] for the outcome.
    pub async fn start_backup(
        self: &Arc<Self>,
        options: CreateBackupOptions,
    ) -> Result<i32, BackupError> {
        let (backup, lease) = self.begin(&options).await?;
        let id = backup.id;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _lease = lease;
            if let Err(e) = this.run_pipeline(backup, options).await {
                error!(backup_id = id, "Background backup failed: {}", e);
            }
        });
        Ok(id)
    }

    async fn begin(
        &self,
        options: &CreateBackupOptions,
    ) -> Result<(backups::Model, Lease), BackupError> {
        options.validate()?;

        // The row only becomes visible once its lease is held, so nothing
        // can delete or claim an in-progress backup nobody is running.
        let now = Utc::now();
        let txn = self.db.begin().await?;
        let backup = backups::ActiveModel {
            name: Set(format!(
                "{}-{}",
                options.name.trim(),
                now.format("%Y-%m-%dT%H-%M-%S%.3fZ")
            )),
            description: Set(options.description.clone()),
            backup_type: Set(options.backup_type),
            status: Set(OperationStatus::InProgress),
            started_at: Set(now),
            triggered_by: Set(options.triggered_by),
            created_by: Set(options.created_by),
            config_id: Set(options.config_id),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let lease = match self.leases.try_acquire(LeaseKey::Backup(backup.id)) {
            Some(lease) => lease,
            None => {
                txn.rollback().await?;
                return Err(BackupError::Conflict(format!(
                    "Backup {} is already running",
                    backup.id
                )));
            }
        };
        txn.commit().await?;

        info!(backup_id = backup.id, name = %backup.name, backup_type = %backup.backup_type, "Backup started");
        Ok((backup, lease))
    }

    async fn run_pipeline(
        &self,
        backup: backups::Model,
        options: CreateBackupOptions,
    ) -> Result<backups::Model, BackupError> {
        let owner = LogOwner::Backup(backup.id);
        let staging = self.config.backup_staging_dir(backup.id);
        let mut scratch = Scratch::default();

        self.log
            .info(
                owner,
                format!("Starting {} backup", backup.backup_type),
                Some(json!({
                    "backupType": backup.backup_type,
                    "compressionLevel": options.effective_level(),
                })),
            )
            .await;

        let result = self.produce(&backup, &options, &staging, &mut scratch).await;

        if let Some(sql) = &scratch.sql_dump {
            remove_file_logged(sql).await;
        }
        remove_dir_logged(&staging).await;

        match result {
            Ok(model) => Ok(model),
            Err(e) => {
                if let Some(archive) = &scratch.archive {
                    remove_file_logged(archive).await;
                }
                self.log
                    .error(owner, format!("Backup failed: {}", e), None)
                    .await;
                self.mark_failed(&backup, &e).await;
                Err(e)
            }
        }
    }

    async fn produce(
        &self,
        backup: &backups::Model,
        options: &CreateBackupOptions,
        staging: &Path,
        scratch: &mut Scratch,
    ) -> Result<backups::Model, BackupError> {
        let owner = LogOwner::Backup(backup.id);
        let mut manifest: Vec<ManifestEntry> = Vec::new();

        if options.backup_type.includes_database() {
            let step = Instant::now();
            let sql = match self.dumper.dump().await {
                Ok(path) => path,
                Err(e) => {
                    self.log
                        .error(owner, format!("Database dump failed: {}", e), None)
                        .await;
                    return Err(e.into());
                }
            };
            scratch.sql_dump = Some(sql.clone());

            let size = tokio::fs::metadata(&sql).await?.len() as i64;
            let md5 = self
                .checksums
                .checksum(&sql, ChecksumAlgorithm::Md5)
                .await?;
            let file_name = file_name_of(&sql);
            self.log
                .timed(
                    owner,
                    "Database dump completed",
                    Some(json!({ "file": file_name, "size": size })),
                    step,
                )
                .await;
            manifest.push(ManifestEntry {
                last_modified: modified_at(&sql).await,
                source: sql,
                file_path: file_name.clone(),
                file_name,
                file_type: BackupFileType::Database,
                file_size: size,
                checksum: Some(md5),
            });
        }

        if options.backup_type.includes_files() {
            if options.include_uploads {
                let entry = self
                    .collect_tree(
                        owner,
                        &self.config.uploads_dir,
                        self.config.uploads_entry_name(),
                        BackupFileType::Upload,
                        "Uploads",
                    )
                    .await;
                manifest.extend(entry);
            }
            if options.include_assets {
                let entry = self
                    .collect_tree(
                        owner,
                        &self.config.assets_dir,
                        self.config.assets_entry_name(),
                        BackupFileType::Asset,
                        "Assets",
                    )
                    .await;
                manifest.extend(entry);
            }
        }

        if options.backup_type.includes_settings() && options.include_settings {
            tokio::fs::create_dir_all(staging).await?;
            let path = staging.join(SETTINGS_FILE_NAME);
            let snapshot = self.settings.export_snapshot().await?;
            let size = snapshot.write_to(&path).await? as i64;
            let md5 = self
                .checksums
                .checksum(&path, ChecksumAlgorithm::Md5)
                .await?;
            self.log
                .info(
                    owner,
                    "Settings exported",
                    Some(json!({ "backupConfigs": snapshot.backup_configs.len() })),
                )
                .await;
            manifest.push(ManifestEntry {
                source: path,
                file_path: SETTINGS_FILE_NAME.to_string(),
                file_name: SETTINGS_FILE_NAME.to_string(),
                file_type: BackupFileType::Settings,
                file_size: size,
                checksum: Some(md5),
                last_modified: Some(snapshot.exported_at),
            });
        }

        if manifest.is_empty() {
            self.log
                .warn(owner, "No components available, archive will be empty", None)
                .await;
        }

        let step = Instant::now();
        let archive_path = self.archive_path_for(backup);
        scratch.archive = Some(archive_path.clone());
        let sources = manifest.iter().map(|m| m.source.clone()).collect();
        let summary = self
            .archive
            .create(sources, &archive_path, options.effective_level())
            .await?;
        let archive_size = summary.size;
        if !summary.skipped.is_empty() {
            self.log
                .warn(
                    owner,
                    format!(
                        "Skipped {} unreadable entries while archiving",
                        summary.skipped.len()
                    ),
                    Some(json!({ "skipped": summary.skipped })),
                )
                .await;
        }
        self.log
            .timed(
                owner,
                "Archive created",
                Some(json!({ "path": archive_path.display().to_string(), "size": archive_size })),
                step,
            )
            .await;

        let (md5, sha256) = self.checksums.checksum_pair(&archive_path).await?;

        let (database_tables, database_records, statistics_source) =
            if options.backup_type.includes_database() {
                match self.dumper.statistics().await {
                    Ok(stats) => (
                        Some(stats.table_count),
                        Some(stats.record_count),
                        "pg_stat_user_tables",
                    ),
                    Err(e) => {
                        self.log
                            .warn(
                                owner,
                                format!("Database statistics unavailable: {}", e),
                                None,
                            )
                            .await;
                        (Some(0), Some(0), "unavailable")
                    }
                }
            } else {
                (None, None, "not_applicable")
            };

        let components: Vec<&str> = manifest.iter().map(|m| component_name(m.file_type)).collect();
        let metadata = json!({
            "components": components,
            "compression": {
                "enabled": options.compression_enabled,
                "level": options.effective_level(),
            },
            "includeLogs": options.include_logs,
            "skippedEntries": summary.skipped.len(),
            "statistics": {
                "estimated": true,
                "source": statistics_source,
            },
            "environment": {
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let completed_at = Utc::now();
        let txn = self.db.begin().await?;
        for entry in &manifest {
            backup_files::ActiveModel {
                backup_id: Set(backup.id),
                file_path: Set(entry.file_path.clone()),
                file_name: Set(entry.file_name.clone()),
                file_type: Set(entry.file_type),
                file_size: Set(entry.file_size),
                checksum: Set(entry.checksum.clone()),
                last_modified: Set(entry.last_modified),
                created_at: Set(completed_at),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        let completed = backups::ActiveModel {
            id: Set(backup.id),
            status: Set(OperationStatus::Completed),
            file_path: Set(Some(archive_path.to_string_lossy().into_owned())),
            file_size: Set(Some(archive_size as i64)),
            checksum_md5: Set(Some(md5)),
            checksum_sha256: Set(Some(sha256)),
            database_tables: Set(database_tables),
            database_records: Set(database_records),
            file_count: Set(Some(manifest.len() as i32)),
            completed_at: Set(Some(completed_at)),
            duration_secs: Set(Some(elapsed_secs(backup.started_at, completed_at))),
            metadata: Set(Some(metadata)),
            ..Default::default()
        }
        .update(&txn)
        .await?;
        txn.commit().await?;

        self.log
            .info(
                owner,
                "Backup completed",
                Some(json!({
                    "size": archive_size,
                    "fileCount": manifest.len(),
                    "durationSecs": completed.duration_secs,
                })),
            )
            .await;
        info!(backup_id = backup.id, size = archive_size, "Backup completed");
        Ok(completed)
    }

    /// Manifest entry for an optional tree, or `None` (with a warning) when
    /// the tree is absent or unreadable.
    async fn collect_tree(
        &self,
        owner: LogOwner,
        path: &Path,
        entry_name: String,
        file_type: BackupFileType,
        label: &str,
    ) -> Option<ManifestEntry> {
        if !path.exists() {
            self.log
                .warn(
                    owner,
                    format!("{} directory not found, skipping", label),
                    Some(json!({ "path": path.display().to_string() })),
                )
                .await;
            return None;
        }
        if let Err(e) = tokio::fs::read_dir(path).await {
            self.log
                .warn(
                    owner,
                    format!("{} directory unreadable, skipping: {}", label, e),
                    Some(json!({ "path": path.display().to_string() })),
                )
                .await;
            return None;
        }

        let size = self.replicator.size_of(path).await as i64;
        let files = self.replicator.file_count(path).await;
        self.log
            .info(
                owner,
                format!("{} directory included", label),
                Some(json!({ "size": size, "files": files })),
            )
            .await;

        Some(ManifestEntry {
            source: path.to_path_buf(),
            file_path: format!("{}/", entry_name),
            file_name: entry_name,
            file_type,
            file_size: size,
            checksum: None,
            last_modified: modified_at(path).await,
        })
    }

    fn archive_path_for(&self, backup: &backups::Model) -> PathBuf {
        let stem: String = backup
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let path = self.config.backups_dir.join(format!("{}.zip", stem));
        if path.exists() {
            self.config
                .backups_dir
                .join(format!("{}-{}.zip", stem, backup.id))
        } else {
            path
        }
    }

    async fn mark_failed(&self, backup: &backups::Model, error: &BackupError) {
        let now = Utc::now();
        let update = backups::ActiveModel {
            id: Set(backup.id),
            status: Set(OperationStatus::Failed),
            file_path: Set(None),
            checksum_md5: Set(None),
            checksum_sha256: Set(None),
            error_message: Set(Some(error.to_string())),
            completed_at: Set(Some(now)),
            duration_secs: Set(Some(elapsed_secs(backup.started_at, now))),
            ..Default::default()
        };
        if let Err(e) = update.update(self.db.as_ref()).await {
            error!(backup_id = backup.id, "Failed to mark backup as failed: {}", e);
        }
    }

    /// Mark backups left `in_progress` by a previous process as failed.
    pub async fn fail_interrupted(&self) -> Result<u64, BackupError> {
        let now = Utc::now();
        let stranded = backups::Entity::find()
            .filter(backups::Column::Status.eq(OperationStatus::InProgress))
            .all(self.db.as_ref())
            .await?;

        let mut count = 0;
        for backup in stranded {
            let result = backups::Entity::update_many()
                .col_expr(backups::Column::Status, Expr::value(OperationStatus::Failed))
                .col_expr(
                    backups::Column::ErrorMessage,
                    Expr::value(Some("Interrupted by service restart".to_string())),
                )
                .col_expr(backups::Column::CompletedAt, Expr::value(Some(now)))
                .col_expr(
                    backups::Column::DurationSecs,
                    Expr::value(Some(elapsed_secs(backup.started_at, now))),
                )
                .filter(backups::Column::Id.eq(backup.id))
                .filter(backups::Column::Status.eq(OperationStatus::InProgress))
                .exec(self.db.as_ref())
                .await?;
            count += result.rows_affected;
        }
        if count > 0 {
            warn!(count, "Marked interrupted backups as failed");
        }
        Ok(count)
    }

    pub async fn list_backups(&self) -> Result<Vec<backups::Model>, BackupError> {
        Ok(backups::Entity::find()
            .order_by_desc(backups::Column::CreatedAt)
            .order_by_desc(backups::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn get_backup(&self, id: i32) -> Result<backups::Model, BackupError> {
        backups::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| BackupError::NotFound(format!("Backup {} not found", id)))
    }

    pub async fn get_files(&self, backup_id: i32) -> Result<Vec<backup_files::Model>, BackupError> {
        self.get_backup(backup_id).await?;
        Ok(backup_files::Entity::find()
            .filter(backup_files::Column::BackupId.eq(backup_id))
            .order_by_asc(backup_files::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn get_logs(
        &self,
        backup_id: i32,
    ) -> Result<Vec<operation_logs::Model>, BackupError> {
        self.get_backup(backup_id).await?;
        self.log.entries(LogOwner::Backup(backup_id)).await
    }

    /// Remove a backup's archive and its records. A missing or undeletable
    /// archive only produces a warning; the records are removed regardless.
    pub async fn delete_backup(&self, id: i32) -> Result<(), BackupError> {
        let backup = self.get_backup(id).await?;
        let _lease = self
            .leases
            .try_acquire_unless(LeaseKey::Backup(id), &[LeaseKey::BackupRead(id)])
            .ok_or_else(|| {
                BackupError::Conflict(format!("Backup {} is in use by a running operation", id))
            })?;

        if let Some(file_path) = &backup.file_path {
            match tokio::fs::remove_file(file_path).await {
                Ok(()) => info!(backup_id = id, path = %file_path, "Deleted backup archive"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(backup_id = id, path = %file_path, "Backup archive already missing")
                }
                Err(e) => warn!(
                    backup_id = id,
                    path = %file_path,
                    "Failed to delete backup archive: {}", e
                ),
            }
        }

        let txn = self.db.begin().await?;
        backup_files::Entity::delete_many()
            .filter(backup_files::Column::BackupId.eq(id))
            .exec(&txn)
            .await?;
        operation_logs::Entity::delete_many()
            .filter(operation_logs::Column::BackupId.eq(id))
            .exec(&txn)
            .await?;
        restores::Entity::update_many()
            .col_expr(restores::Column::BackupId, Expr::value(Option::<i32>::None))
            .filter(restores::Column::BackupId.eq(id))
            .exec(&txn)
            .await?;
        restores::Entity::update_many()
            .col_expr(
                restores::Column::PreRestoreBackupId,
                Expr::value(Option::<i32>::None),
            )
            .filter(restores::Column::PreRestoreBackupId.eq(id))
            .exec(&txn)
            .await?;
        backups::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(backup_id = id, "Backup deleted");
        Ok(())
    }

    /// True when the backup is completed, its archive exists and the
    /// archive's MD5 still matches the recorded one.
    pub async fn validate_integrity(&self, id: i32) -> Result<bool, BackupError> {
        let backup = self.get_backup(id).await?;
        let (Some(file_path), Some(expected)) = (&backup.file_path, &backup.checksum_md5) else {
            return Ok(false);
        };
        if backup.status != OperationStatus::Completed {
            return Ok(false);
        }
        let path = Path::new(file_path);
        if !path.is_file() {
            warn!(backup_id = id, path = %file_path, "Backup archive missing");
            return Ok(false);
        }
        match self.checksums.checksum(path, ChecksumAlgorithm::Md5).await {
            Ok(actual) => {
                let valid = actual.eq_ignore_ascii_case(expected);
                if !valid {
                    warn!(backup_id = id, expected = %expected, actual = %actual, "Backup checksum mismatch");
                }
                Ok(valid)
            }
            Err(e) => {
                warn!(backup_id = id, "Failed to checksum backup archive: {}", e);
                Ok(false)
            }
        }
    }
}

fn component_name(file_type: BackupFileType) -> &'static str {
    match file_type {
        BackupFileType::Database => "database",
        BackupFileType::Upload => "uploads",
        BackupFileType::Asset => "assets",
        BackupFileType::Settings => "settings",
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn modified_at(path: &Path) -> Option<DBDateTime> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

pub(crate) async fn remove_file_logged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

pub(crate) async fn remove_dir_logged(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, FAKE_TABLE_COUNT};
    use safekeep_entities::types::LogLevel;
    use std::fs;
    use std::io::Write;

    #[tokio::test]
    async fn test_database_only_backup_on_empty_schema() {
        let h = Harness::new().await;

        let id = h
            .backups
            .create_backup(CreateBackupOptions::new("db", BackupType::DatabaseOnly))
            .await
            .unwrap();

        let backup = h.backups.get_backup(id).await.unwrap();
        assert_eq!(backup.status, OperationStatus::Completed);
        assert!(backup.name.starts_with("db-"));
        assert!(backup.file_path.is_some());
        assert_eq!(backup.checksum_md5.as_ref().map(String::len), Some(32));
        assert_eq!(backup.checksum_sha256.as_ref().map(String::len), Some(64));
        assert_eq!(backup.error_message, None);
        assert_eq!(backup.file_count, Some(1));
        assert_eq!(backup.database_tables, Some(FAKE_TABLE_COUNT));

        let files = h.backups.get_files(id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_type, BackupFileType::Database);
        assert!(files[0].file_name.ends_with(".sql"));

        // The uncompressed dump does not outlive the run
        assert_eq!(h.sql_files_left(), 0);
        assert!(!h.config.backup_staging_dir(id).exists());
    }

    #[tokio::test]
    async fn test_full_backup_without_uploads_keeps_other_components() {
        let h = Harness::new().await;
        h.write_asset("index.html", b"<html></html>");
        h.write_asset("css/site.css", b"body {}");
        assert!(!h.config.uploads_dir.exists());

        let id = h
            .backups
            .create_backup(CreateBackupOptions::new("full", BackupType::Full))
            .await
            .unwrap();

        let backup = h.backups.get_backup(id).await.unwrap();
        assert_eq!(backup.status, OperationStatus::Completed);
        let types: Vec<_> = h
            .backups
            .get_files(id)
            .await
            .unwrap()
            .iter()
            .map(|f| f.file_type)
            .collect();
        assert_eq!(
            types,
            vec![
                BackupFileType::Database,
                BackupFileType::Asset,
                BackupFileType::Settings
            ]
        );
        assert_eq!(backup.file_count, Some(3));

        let logs = h.backups.get_logs(id).await.unwrap();
        assert!(logs
            .iter()
            .any(|l| l.level == LogLevel::Warn && l.message.contains("Uploads directory not found")));

        let metadata = backup.metadata.unwrap();
        assert_eq!(
            metadata["components"],
            json!(["database", "assets", "settings"])
        );
        assert_eq!(metadata["compression"]["level"], json!(6));
    }

    #[tokio::test]
    async fn test_files_only_skips_database() {
        let h = Harness::new().await;
        h.write_upload("avatar.png", b"png");

        let id = h
            .backups
            .create_backup(CreateBackupOptions::new("files", BackupType::FilesOnly))
            .await
            .unwrap();

        let backup = h.backups.get_backup(id).await.unwrap();
        assert_eq!(backup.status, OperationStatus::Completed);
        assert_eq!(backup.database_tables, None);
        assert_eq!(h.dumper.dump_calls(), 0);
        let files = h.backups.get_files(id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_type, BackupFileType::Upload);
        assert_eq!(files[0].file_path, "uploads/");
        assert_eq!(files[0].file_size, 3);
    }

    #[tokio::test]
    async fn test_settings_only_archives_settings() {
        let h = Harness::new().await;
        h.create_config("nightly", 7, 3).await;

        let id = h
            .backups
            .create_backup(CreateBackupOptions::new("settings", BackupType::SettingsOnly))
            .await
            .unwrap();

        let files = h.backups.get_files(id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_type, BackupFileType::Settings);
        assert_eq!(files[0].file_name, SETTINGS_FILE_NAME);
    }

    #[tokio::test]
    async fn test_dump_failure_marks_backup_failed() {
        let h = Harness::new().await;
        h.dumper.fail_dump(true);

        let err = h
            .backups
            .create_backup(CreateBackupOptions::new("broken", BackupType::Full))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Dump(_)));

        let backups = h.backups.list_backups().await.unwrap();
        assert_eq!(backups.len(), 1);
        let backup = &backups[0];
        assert_eq!(backup.status, OperationStatus::Failed);
        assert!(backup
            .error_message
            .as_deref()
            .unwrap()
            .contains("connection refused"));
        assert_eq!(backup.file_path, None);
        assert_eq!(backup.checksum_md5, None);
        assert!(backup.completed_at.is_some());
        assert!(h.backups.get_files(backup.id).await.unwrap().is_empty());
        assert_eq!(h.zip_files_left(), 0);
    }

    #[tokio::test]
    async fn test_invalid_options_create_no_row() {
        let h = Harness::new().await;
        let mut options = CreateBackupOptions::new("  ", BackupType::Full);
        options.compression_level = 12;

        match h.backups.create_backup(options).await.unwrap_err() {
            BackupError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(h.backups.list_backups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_missing_archive_succeeds() {
        let h = Harness::new().await;
        let id = h
            .backups
            .create_backup(CreateBackupOptions::new("gone", BackupType::DatabaseOnly))
            .await
            .unwrap();
        let path = h.backups.get_backup(id).await.unwrap().file_path.unwrap();
        fs::remove_file(&path).unwrap();

        h.backups.delete_backup(id).await.unwrap();

        assert!(matches!(
            h.backups.get_backup(id).await,
            Err(BackupError::NotFound(_))
        ));
        let orphans = backup_files::Entity::find()
            .filter(backup_files::Column::BackupId.eq(id))
            .all(h.db.as_ref())
            .await
            .unwrap();
        assert!(orphans.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_archive_and_logs() {
        let h = Harness::new().await;
        let id = h
            .backups
            .create_backup(CreateBackupOptions::new("bye", BackupType::DatabaseOnly))
            .await
            .unwrap();
        let path = h.backups.get_backup(id).await.unwrap().file_path.unwrap();
        assert!(!h.backups.get_logs(id).await.unwrap().is_empty());

        h.backups.delete_backup(id).await.unwrap();

        assert!(!Path::new(&path).exists());
        let logs = operation_logs::Entity::find()
            .filter(operation_logs::Column::BackupId.eq(id))
            .all(h.db.as_ref())
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_delete_while_in_use_conflicts() {
        let h = Harness::new().await;
        let id = h
            .backups
            .create_backup(CreateBackupOptions::new("busy", BackupType::DatabaseOnly))
            .await
            .unwrap();

        let _reader = h.leases.try_acquire(LeaseKey::BackupRead(id)).unwrap();
        assert!(matches!(
            h.backups.delete_backup(id).await,
            Err(BackupError::Conflict(_))
        ));
        assert!(h.backups.get_backup(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_held_lease_on_new_id_leaves_no_row() {
        let h = Harness::new().await;
        let existing = crate::testing::insert_backup_row(&h.db).await;
        let taken = h.leases.try_acquire(LeaseKey::Backup(existing + 1)).unwrap();

        let err = h
            .backups
            .create_backup(CreateBackupOptions::new("clash", BackupType::DatabaseOnly))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Conflict(_)));
        let rows = h.backups.list_backups().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, existing);

        drop(taken);
        let id = h
            .backups
            .create_backup(CreateBackupOptions::new("retry", BackupType::DatabaseOnly))
            .await
            .unwrap();
        assert_eq!(
            h.backups.get_backup(id).await.unwrap().status,
            OperationStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_integrity_detects_truncation() {
        let h = Harness::new().await;
        h.write_upload("doc.txt", b"some document contents");
        let id = h
            .backups
            .create_backup(CreateBackupOptions::new("check", BackupType::Full))
            .await
            .unwrap();
        assert!(h.backups.validate_integrity(id).await.unwrap());

        let path = h.backups.get_backup(id).await.unwrap().file_path.unwrap();
        let len = fs::metadata(&path).unwrap().len();
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len / 2).unwrap();
        assert!(!h.backups.validate_integrity(id).await.unwrap());

        fs::remove_file(&path).unwrap();
        assert!(!h.backups.validate_integrity(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_integrity_detects_tampering() {
        let h = Harness::new().await;
        let id = h
            .backups
            .create_backup(CreateBackupOptions::new("tamper", BackupType::DatabaseOnly))
            .await
            .unwrap();
        let path = h.backups.get_backup(id).await.unwrap().file_path.unwrap();
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"x").unwrap();

        assert!(!h.backups.validate_integrity(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_start_backup_runs_in_background() {
        let h = Harness::new().await;
        let id = h
            .backups
            .start_backup(CreateBackupOptions::new("bg", BackupType::DatabaseOnly))
            .await
            .unwrap();

        let backup = h.wait_for_backup(id).await;
        assert_eq!(backup.status, OperationStatus::Completed);
        assert!(!h.leases.is_held(LeaseKey::Backup(id)));
    }

    #[tokio::test]
    async fn test_fail_interrupted_backups() {
        let h = Harness::new().await;
        let id = crate::testing::insert_backup_row(&h.db).await;

        assert_eq!(h.backups.fail_interrupted().await.unwrap(), 1);
        let backup = h.backups.get_backup(id).await.unwrap();
        assert_eq!(backup.status, OperationStatus::Failed);
        assert!(backup.error_message.is_some());
        assert!(backup.completed_at.is_some());
        let duration = backup.duration_secs.expect("duration recorded");
        assert!(duration >= 0);

        // Already-terminal rows are left alone
        assert_eq!(h.backups.fail_interrupted().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_compression_disabled_stores_entries() {
        let h = Harness::new().await;
        let mut options = CreateBackupOptions::new("raw", BackupType::DatabaseOnly);
        options.compression_enabled = false;

        let id = h.backups.create_backup(options).await.unwrap();
        let metadata = h.backups.get_backup(id).await.unwrap().metadata.unwrap();
        assert_eq!(metadata["compression"]["enabled"], json!(false));
        assert_eq!(metadata["compression"]["level"], json!(0));
    }
}
