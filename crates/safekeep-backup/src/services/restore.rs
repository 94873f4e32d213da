use chrono::Utc;
use safekeep_config::ServerConfig;
use safekeep_core::elapsed_secs;
use safekeep_entities::types::{BackupType, OperationStatus};
use safekeep_entities::{backups, operation_logs, restores};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::archive::ArchiveCodec;
use super::backup::{remove_dir_logged, BackupOrchestrator, CreateBackupOptions};
use super::configs::{BackupConfigService, SettingsSnapshot, SETTINGS_FILE_NAME};
use super::dump::DatabaseDumper;
use super::leases::{Lease, LeaseKey, OperationLeases};
use super::operation_log::{LogOwner, OperationLog};
use super::replicator::FileTreeReplicator;
use super::BackupError;

const STEP_PRE_BACKUP: &str = "Creating pre-restore backup";
const STEP_EXTRACT: &str = "Extracting archive";
const STEP_DATABASE: &str = "Restoring database";
const STEP_SETTINGS: &str = "Restoring settings";
const STEP_FILES: &str = "Restoring files";
const STEP_COMPLETED: &str = "Completed";
const STEP_CANCELLED: &str = "Cancelled";

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub backup_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub restore_database: bool,
    pub restore_files: bool,
    pub restore_settings: bool,
    pub create_backup_before_restore: bool,
    pub created_by: Option<i32>,
}

impl RestoreOptions {
    pub fn new(backup_id: i32, name: impl Into<String>) -> Self {
        Self {
            backup_id,
            name: name.into(),
            description: None,
            restore_database: true,
            restore_files: true,
            restore_settings: true,
            create_backup_before_restore: true,
            created_by: None,
        }
    }

    /// Extraction, plus one step per enabled component. Settings ride along
    /// with the extraction and are not counted.
    pub fn total_steps(&self) -> i32 {
        1 + self.create_backup_before_restore as i32
            + self.restore_database as i32
            + self.restore_files as i32
    }
}

#[derive(Debug, Default)]
struct Progress {
    completed_steps: i32,
    tables_restored: i32,
    records_restored: i64,
    files_restored: i32,
}

/// Leases held for the lifetime of one restore run.
struct RunLeases {
    _source: Lease,
    _restore: Lease,
}

/// Replays backups into the live system and owns the restore records.
pub struct RestoreOrchestrator {
    db: Arc<DatabaseConnection>,
    config: Arc<ServerConfig>,
    dumper: Arc<dyn DatabaseDumper>,
    backups: Arc<BackupOrchestrator>,
    settings: BackupConfigService,
    archive: ArchiveCodec,
    replicator: FileTreeReplicator,
    log: OperationLog,
    leases: OperationLeases,
}

impl RestoreOrchestrator {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<ServerConfig>,
        dumper: Arc<dyn DatabaseDumper>,
        backups: Arc<BackupOrchestrator>,
    ) -> Self {
        Self {
            settings: BackupConfigService::new(db.clone()),
            log: OperationLog::new(db.clone()),
            archive: ArchiveCodec::new(),
            replicator: FileTreeReplicator::new(),
            leases: backups.leases().clone(),
            db,
            config,
            dumper,
            backups,
        }
    }

    /// Run a restore to completion and return its id.
    pub async fn restore_from_backup(&self, options: RestoreOptions) -> Result<i32, BackupError> {
        let (restore, backup, leases) = self.begin(&options).await?;
        let id = restore.id;
        let result = self.run(restore, backup, options).await;
        drop(leases);
        result.map(|_| id)
    }

    /// Validate, create the row and run the pipeline in the background.
    pub async fn start_restore(
        self: &Arc<Self>,
        options: RestoreOptions,
    ) -> Result<i32, BackupError> {
        let (restore, backup, leases) = self.begin(&options).await?;
        let id = restore.id;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _leases = leases;
            if let Err(e) = this.run(restore, backup, options).await {
                error!(restore_id = id, "Background restore ended without completing: {}", e);
            }
        });
        Ok(id)
    }

    /// Every precondition is checked before anything is written; all
    /// violations are reported together.
    async fn validate(&self, options: &RestoreOptions) -> Result<backups::Model, BackupError> {
        let mut errors = Vec::new();
        if options.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        }
        if !options.restore_database && !options.restore_files && !options.restore_settings {
            errors.push("nothing to restore: database, files and settings are all disabled".to_string());
        }

        let id = options.backup_id;
        let backup = backups::Entity::find_by_id(id).one(self.db.as_ref()).await?;
        let Some(backup) = backup else {
            errors.push(format!("backup {} does not exist", id));
            return Err(BackupError::Validation(errors));
        };

        let completed = backup.status == OperationStatus::Completed;
        if !completed {
            errors.push(format!(
                "backup {} has status {}, expected completed",
                id, backup.status
            ));
        }
        match backup.file_path.as_deref() {
            None => errors.push(format!("backup {} has no archive", id)),
            Some(path) if !Path::new(path).is_file() => {
                errors.push(format!("archive {} of backup {} does not exist", path, id))
            }
            Some(_) if completed => {
                if !self.backups.validate_integrity(id).await? {
                    errors.push(format!(
                        "backup {} failed the integrity check: archive checksum does not match",
                        id
                    ));
                }
            }
            Some(_) => {}
        }

        if errors.is_empty() {
            Ok(backup)
        } else {
            Err(BackupError::Validation(errors))
        }
    }

    async fn begin(
        &self,
        options: &RestoreOptions,
    ) -> Result<(restores::Model, backups::Model, RunLeases), BackupError> {
        let backup = self.validate(options).await?;

        let source_lease = self
            .leases
            .try_acquire_unless(
                LeaseKey::BackupRead(backup.id),
                &[LeaseKey::Backup(backup.id)],
            )
            .ok_or_else(|| {
                BackupError::Conflict(format!(
                    "Backup {} is being modified by another operation",
                    backup.id
                ))
            })?;

        let now = Utc::now();
        let restore = restores::ActiveModel {
            name: Set(options.name.trim().to_string()),
            description: Set(options.description.clone()),
            backup_id: Set(Some(backup.id)),
            status: Set(OperationStatus::InProgress),
            completed_steps: Set(0),
            total_steps: Set(options.total_steps()),
            restore_database: Set(options.restore_database),
            restore_files: Set(options.restore_files),
            restore_settings: Set(options.restore_settings),
            create_backup_before_restore: Set(options.create_backup_before_restore),
            started_at: Set(now),
            created_by: Set(options.created_by),
            metadata: Set(Some(json!({
                "sourceBackup": {
                    "id": backup.id,
                    "name": backup.name,
                    "backupType": backup.backup_type,
                    "fileSize": backup.file_size,
                    "createdAt": backup.created_at,
                }
            }))),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        let restore_lease = self
            .leases
            .try_acquire(LeaseKey::Restore(restore.id))
            .ok_or_else(|| {
                BackupError::Conflict(format!("Restore {} is already running", restore.id))
            })?;

        info!(restore_id = restore.id, backup_id = backup.id, "Restore started");
        Ok((
            restore,
            backup,
            RunLeases {
                _source: source_lease,
                _restore: restore_lease,
            },
        ))
    }

    async fn run(
        &self,
        restore: restores::Model,
        backup: backups::Model,
        options: RestoreOptions,
    ) -> Result<restores::Model, BackupError> {
        let owner = LogOwner::Restore(restore.id);
        let staging = self.config.restore_staging_dir(restore.id);
        let mut progress = Progress::default();

        self.log
            .info(
                owner,
                format!("Restoring from backup {}", backup.name),
                Some(json!({
                    "backupId": backup.id,
                    "totalSteps": restore.total_steps,
                    "restoreDatabase": options.restore_database,
                    "restoreFiles": options.restore_files,
                    "restoreSettings": options.restore_settings,
                    "createBackupBeforeRestore": options.create_backup_before_restore,
                })),
            )
            .await;

        let result = self
            .execute(&restore, &backup, &options, &staging, &mut progress)
            .await;

        remove_dir_logged(&staging).await;

        match result {
            Ok(()) => self.finalize(&restore, &progress).await,
            Err(BackupError::Cancelled(reason)) => {
                self.log
                    .info(owner, "Restore stopped at a step boundary after cancellation", None)
                    .await;
                Err(BackupError::Cancelled(reason))
            }
            Err(e) => {
                self.log
                    .error(owner, format!("Restore failed: {}", e), None)
                    .await;
                self.mark_failed(&restore, &progress, &e).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        restore: &restores::Model,
        backup: &backups::Model,
        options: &RestoreOptions,
        staging: &Path,
        progress: &mut Progress,
    ) -> Result<(), BackupError> {
        let owner = LogOwner::Restore(restore.id);

        if options.create_backup_before_restore {
            self.begin_step(restore.id, STEP_PRE_BACKUP).await?;
            let step = Instant::now();
            let mut pre = CreateBackupOptions::new(
                format!("pre-restore-{}", options.name.trim()),
                BackupType::Full,
            );
            pre.description = Some(format!("Automatic snapshot before restore {}", restore.id));
            pre.created_by = options.created_by;

            let pre_id = match self.backups.create_backup(pre).await {
                Ok(id) => id,
                Err(e) => {
                    self.log
                        .error(owner, format!("Pre-restore backup failed: {}", e), None)
                        .await;
                    return Err(e);
                }
            };
            // Recorded regardless of status: a cancelled restore still points
            // at the snapshot it took.
            restores::Entity::update_many()
                .col_expr(restores::Column::PreRestoreBackupId, Expr::value(Some(pre_id)))
                .filter(restores::Column::Id.eq(restore.id))
                .exec(self.db.as_ref())
                .await?;
            progress.completed_steps += 1;
            self.update_in_progress(
                restore.id,
                vec![(
                    restores::Column::CompletedSteps,
                    Expr::value(progress.completed_steps),
                )],
            )
            .await?;
            self.log
                .timed(
                    owner,
                    "Pre-restore backup created",
                    Some(json!({ "backupId": pre_id })),
                    step,
                )
                .await;
        }

        self.begin_step(restore.id, STEP_EXTRACT).await?;
        let step = Instant::now();
        let archive = backup
            .file_path
            .as_deref()
            .ok_or_else(|| BackupError::Internal(format!("backup {} has no archive", backup.id)))?;
        let extracted = self.archive.extract(Path::new(archive), staging).await?;
        self.complete_step(restore.id, progress).await?;
        self.log
            .timed(
                owner,
                "Archive extracted",
                Some(json!({ "files": extracted })),
                step,
            )
            .await;

        if options.restore_database {
            self.begin_step(restore.id, STEP_DATABASE).await?;
            match find_sql_dump(staging).await? {
                Some(sql) => {
                    let step = Instant::now();
                    let stats = match self.dumper.restore(&sql).await {
                        Ok(stats) => stats,
                        Err(e) => {
                            self.log
                                .error(owner, format!("Database restore failed: {}", e), None)
                                .await;
                            return Err(e.into());
                        }
                    };
                    progress.tables_restored = stats.tables_restored;
                    progress.records_restored = stats.records_restored;
                    self.log
                        .timed(
                            owner,
                            "Database restored",
                            Some(json!({
                                "tablesRestored": stats.tables_restored,
                                "recordsRestored": stats.records_restored,
                                "estimated": true,
                            })),
                            step,
                        )
                        .await;
                }
                None => {
                    self.log
                        .warn(owner, "No database dump in backup, skipping database restore", None)
                        .await;
                }
            }
            self.complete_step(restore.id, progress).await?;
        }

        if options.restore_settings {
            let settings = staging.join(SETTINGS_FILE_NAME);
            if settings.is_file() {
                self.begin_step(restore.id, STEP_SETTINGS).await?;
                let snapshot = SettingsSnapshot::read_from(&settings).await?;
                let applied = self.settings.apply_snapshot(&snapshot).await?;
                self.log
                    .info(
                        owner,
                        "Settings restored",
                        Some(json!({ "backupConfigs": applied })),
                    )
                    .await;
            } else {
                self.log
                    .warn(owner, "No settings snapshot in backup, skipping settings restore", None)
                    .await;
            }
        }

        if options.restore_files {
            self.begin_step(restore.id, STEP_FILES).await?;
            let trees = [
                (
                    "Uploads",
                    self.config.uploads_entry_name(),
                    self.config.uploads_dir.clone(),
                ),
                (
                    "Assets",
                    self.config.assets_entry_name(),
                    self.config.assets_dir.clone(),
                ),
            ];
            for (label, entry, live) in trees {
                let source = staging.join(&entry);
                if !source.is_dir() {
                    self.log
                        .warn(
                            owner,
                            format!("{} not present in backup, skipping", label),
                            None,
                        )
                        .await;
                    continue;
                }
                let step = Instant::now();
                let copied = self.replicator.copy_tree(&source, &live).await?;
                progress.files_restored += copied as i32;
                self.log
                    .timed(
                        owner,
                        format!("{} restored", label),
                        Some(json!({ "files": copied, "destination": live.display().to_string() })),
                        step,
                    )
                    .await;
            }
            self.complete_step(restore.id, progress).await?;
        }

        Ok(())
    }

    /// Record the step about to run, or stop if the restore was cancelled.
    async fn begin_step(&self, restore_id: i32, label: &str) -> Result<(), BackupError> {
        self.update_in_progress(
            restore_id,
            vec![(
                restores::Column::CurrentStep,
                Expr::value(Some(label.to_string())),
            )],
        )
        .await
    }

    async fn complete_step(&self, restore_id: i32, progress: &mut Progress) -> Result<(), BackupError> {
        progress.completed_steps += 1;
        self.update_in_progress(
            restore_id,
            vec![(
                restores::Column::CompletedSteps,
                Expr::value(progress.completed_steps),
            )],
        )
        .await
    }

    /// Apply `changes` only while the row is still `in_progress`. A row that
    /// has left that state was cancelled underneath us.
    async fn update_in_progress(
        &self,
        restore_id: i32,
        changes: Vec<(restores::Column, sea_orm::sea_query::SimpleExpr)>,
    ) -> Result<(), BackupError> {
        let mut update = restores::Entity::update_many()
            .filter(restores::Column::Id.eq(restore_id))
            .filter(restores::Column::Status.eq(OperationStatus::InProgress));
        for (column, value) in changes {
            update = update.col_expr(column, value);
        }
        let result = update.exec(self.db.as_ref()).await?;
        if result.rows_affected == 0 {
            return Err(BackupError::Cancelled(format!(
                "restore {} is no longer in progress",
                restore_id
            )));
        }
        Ok(())
    }

    async fn finalize(
        &self,
        restore: &restores::Model,
        progress: &Progress,
    ) -> Result<restores::Model, BackupError> {
        let now = Utc::now();
        self.update_in_progress(
            restore.id,
            vec![
                (
                    restores::Column::Status,
                    Expr::value(OperationStatus::Completed),
                ),
                (
                    restores::Column::CurrentStep,
                    Expr::value(Some(STEP_COMPLETED.to_string())),
                ),
                (restores::Column::CompletedSteps, Expr::value(restore.total_steps)),
                (
                    restores::Column::TablesRestored,
                    Expr::value(Some(progress.tables_restored)),
                ),
                (
                    restores::Column::RecordsRestored,
                    Expr::value(Some(progress.records_restored)),
                ),
                (
                    restores::Column::FilesRestored,
                    Expr::value(Some(progress.files_restored)),
                ),
                (restores::Column::CompletedAt, Expr::value(Some(now))),
                (
                    restores::Column::DurationSecs,
                    Expr::value(Some(elapsed_secs(restore.started_at, now))),
                ),
            ],
        )
        .await?;

        self.log
            .info(
                LogOwner::Restore(restore.id),
                "Restore completed",
                Some(json!({
                    "tablesRestored": progress.tables_restored,
                    "recordsRestored": progress.records_restored,
                    "filesRestored": progress.files_restored,
                })),
            )
            .await;
        info!(restore_id = restore.id, "Restore completed");
        self.get_restore(restore.id).await
    }

    async fn mark_failed(&self, restore: &restores::Model, progress: &Progress, error: &BackupError) {
        let now = Utc::now();
        let changes = vec![
            (restores::Column::Status, Expr::value(OperationStatus::Failed)),
            (
                restores::Column::ErrorMessage,
                Expr::value(Some(error.to_string())),
            ),
            (
                restores::Column::TablesRestored,
                Expr::value(Some(progress.tables_restored)),
            ),
            (
                restores::Column::RecordsRestored,
                Expr::value(Some(progress.records_restored)),
            ),
            (
                restores::Column::FilesRestored,
                Expr::value(Some(progress.files_restored)),
            ),
            (restores::Column::CompletedAt, Expr::value(Some(now))),
            (
                restores::Column::DurationSecs,
                Expr::value(Some(elapsed_secs(restore.started_at, now))),
            ),
        ];
        match self.update_in_progress(restore.id, changes).await {
            Ok(()) => {}
            Err(BackupError::Cancelled(_)) => {
                warn!(restore_id = restore.id, "Restore failed after cancellation; keeping cancelled status")
            }
            Err(e) => error!(restore_id = restore.id, "Failed to mark restore as failed: {}", e),
        }
    }

    /// Stop a running restore at its next step boundary. Steps already
    /// applied are not undone.
    pub async fn cancel_restore(&self, id: i32) -> Result<restores::Model, BackupError> {
        let restore = self.get_restore(id).await?;
        if restore.status.is_terminal() {
            return Err(BackupError::Conflict(format!(
                "Restore {} is already {}",
                id, restore.status
            )));
        }

        let now = Utc::now();
        let result = restores::Entity::update_many()
            .col_expr(restores::Column::Status, Expr::value(OperationStatus::Cancelled))
            .col_expr(
                restores::Column::CurrentStep,
                Expr::value(Some(STEP_CANCELLED.to_string())),
            )
            .col_expr(restores::Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(
                restores::Column::DurationSecs,
                Expr::value(Some(elapsed_secs(restore.started_at, now))),
            )
            .filter(restores::Column::Id.eq(id))
            .filter(restores::Column::Status.is_in([
                OperationStatus::Pending,
                OperationStatus::InProgress,
            ]))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(BackupError::Conflict(format!(
                "Restore {} finished before it could be cancelled",
                id
            )));
        }

        self.log
            .info(
                LogOwner::Restore(id),
                "Restore cancelled; the step in flight runs to completion",
                Some(json!({
                    "currentStep": restore.current_step,
                    "completedSteps": restore.completed_steps,
                })),
            )
            .await;
        self.get_restore(id).await
    }

    /// Mark restores left `in_progress` by a previous process as failed.
    pub async fn fail_interrupted(&self) -> Result<u64, BackupError> {
        let now = Utc::now();
        let stranded = restores::Entity::find()
            .filter(restores::Column::Status.eq(OperationStatus::InProgress))
            .all(self.db.as_ref())
            .await?;

        let mut count = 0;
        for restore in stranded {
            let result = restores::Entity::update_many()
                .col_expr(restores::Column::Status, Expr::value(OperationStatus::Failed))
                .col_expr(
                    restores::Column::ErrorMessage,
                    Expr::value(Some("Interrupted by service restart".to_string())),
                )
                .col_expr(restores::Column::CompletedAt, Expr::value(Some(now)))
                .col_expr(
                    restores::Column::DurationSecs,
                    Expr::value(Some(elapsed_secs(restore.started_at, now))),
                )
                .filter(restores::Column::Id.eq(restore.id))
                .filter(restores::Column::Status.eq(OperationStatus::InProgress))
                .exec(self.db.as_ref())
                .await?;
            count += result.rows_affected;
        }
        if count > 0 {
            warn!(count, "Marked interrupted restores as failed");
        }
        Ok(count)
    }

    pub async fn list_restores(&self) -> Result<Vec<restores::Model>, BackupError> {
        Ok(restores::Entity::find()
            .order_by_desc(restores::Column::CreatedAt)
            .order_by_desc(restores::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn get_restore(&self, id: i32) -> Result<restores::Model, BackupError> {
        restores::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| BackupError::NotFound(format!("Restore {} not found", id)))
    }

    pub async fn get_logs(
        &self,
        restore_id: i32,
    ) -> Result<Vec<operation_logs::Model>, BackupError> {
        self.get_restore(restore_id).await?;
        self.log.entries(LogOwner::Restore(restore_id)).await
    }
}

/// The `.sql` file at the top of an extracted archive, if any.
async fn find_sql_dump(staging: &Path) -> Result<Option<PathBuf>, BackupError> {
    let mut dumps = Vec::new();
    let mut entries = tokio::fs::read_dir(staging).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "sql") && entry.file_type().await?.is_file() {
            dumps.push(path);
        }
    }
    dumps.sort();
    if dumps.len() > 1 {
        warn!(
            count = dumps.len(),
            "Archive holds several SQL dumps, using {}",
            dumps[0].display()
        );
    }
    Ok(dumps.into_iter().next())
}
