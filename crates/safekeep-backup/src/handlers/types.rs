use safekeep_entities::types::{
    BackupFileType, BackupType, LogLevel, OperationKind, OperationStatus, StorageLocation,
    TriggerSource,
};
use safekeep_entities::{backup_configs, backup_files, backups, operation_logs, restores};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::services::{
    BackupConfigService, BackupOrchestrator, CreateBackupOptions, RestoreOptions,
    RestoreOrchestrator,
};

pub struct BackupAppState {
    pub backup_orchestrator: Arc<BackupOrchestrator>,
    pub restore_orchestrator: Arc<RestoreOrchestrator>,
    pub config_service: BackupConfigService,
}

pub fn create_backup_app_state(
    backup_orchestrator: Arc<BackupOrchestrator>,
    restore_orchestrator: Arc<RestoreOrchestrator>,
    config_service: BackupConfigService,
) -> Arc<BackupAppState> {
    Arc::new(BackupAppState {
        backup_orchestrator,
        restore_orchestrator,
        config_service,
    })
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackupRequest {
    #[schema(example = "before-upgrade")]
    pub name: String,
    pub description: Option<String>,
    pub backup_type: BackupType,
    pub include_uploads: Option<bool>,
    pub include_assets: Option<bool>,
    pub include_settings: Option<bool>,
    pub include_logs: Option<bool>,
    pub compression_enabled: Option<bool>,
    /// 0 (store) to 9
    #[schema(example = 6)]
    pub compression_level: Option<u8>,
    pub config_id: Option<i32>,
}

impl CreateBackupRequest {
    pub fn into_options(self) -> CreateBackupOptions {
        let mut options = CreateBackupOptions::new(self.name, self.backup_type);
        options.description = self.description;
        options.include_uploads = self.include_uploads.unwrap_or(true);
        options.include_assets = self.include_assets.unwrap_or(true);
        options.include_settings = self.include_settings.unwrap_or(true);
        options.include_logs = self.include_logs.unwrap_or(true);
        options.compression_enabled = self.compression_enabled.unwrap_or(true);
        if let Some(level) = self.compression_level {
            options.compression_level = level;
        }
        options.config_id = self.config_id;
        options
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRestoreRequest {
    pub backup_id: i32,
    #[schema(example = "rollback-to-monday")]
    pub name: String,
    pub description: Option<String>,
    pub restore_database: Option<bool>,
    pub restore_files: Option<bool>,
    pub restore_settings: Option<bool>,
    pub create_backup_before_restore: Option<bool>,
}

impl CreateRestoreRequest {
    pub fn into_options(self) -> RestoreOptions {
        let mut options = RestoreOptions::new(self.backup_id, self.name);
        options.description = self.description;
        options.restore_database = self.restore_database.unwrap_or(true);
        options.restore_files = self.restore_files.unwrap_or(true);
        options.restore_settings = self.restore_settings.unwrap_or(true);
        options.create_backup_before_restore = self.create_backup_before_restore.unwrap_or(true);
        options
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedResponse {
    pub id: i32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBackupResponse {
    pub id: i32,
    pub valid: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListConfigsQuery {
    /// Include soft-deleted configs
    pub include_inactive: Option<bool>,
}

/// Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub backup_type: BackupType,
    pub status: OperationStatus,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub checksum_md5: Option<String>,
    pub checksum_sha256: Option<String>,
    /// Estimate from catalog statistics
    pub database_tables: Option<i32>,
    /// Estimate from catalog statistics
    pub database_records: Option<i64>,
    pub file_count: Option<i32>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub duration_secs: Option<i64>,
    pub error_message: Option<String>,
    pub triggered_by: TriggerSource,
    pub created_by: Option<i32>,
    pub config_id: Option<i32>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
}

impl From<backups::Model> for BackupResponse {
    fn from(backup: backups::Model) -> Self {
        Self {
            id: backup.id,
            name: backup.name,
            description: backup.description,
            backup_type: backup.backup_type,
            status: backup.status,
            file_path: backup.file_path,
            file_size: backup.file_size,
            checksum_md5: backup.checksum_md5,
            checksum_sha256: backup.checksum_sha256,
            database_tables: backup.database_tables,
            database_records: backup.database_records,
            file_count: backup.file_count,
            started_at: backup.started_at.timestamp_millis(),
            completed_at: backup.completed_at.map(|dt| dt.timestamp_millis()),
            duration_secs: backup.duration_secs,
            error_message: backup.error_message,
            triggered_by: backup.triggered_by,
            created_by: backup.created_by,
            config_id: backup.config_id,
            metadata: backup.metadata,
            created_at: backup.created_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupFileResponse {
    pub id: i32,
    pub backup_id: i32,
    pub file_path: String,
    pub file_name: String,
    pub file_type: BackupFileType,
    pub file_size: i64,
    pub checksum: Option<String>,
    pub last_modified: Option<i64>,
}

impl From<backup_files::Model> for BackupFileResponse {
    fn from(file: backup_files::Model) -> Self {
        Self {
            id: file.id,
            backup_id: file.backup_id,
            file_path: file.file_path,
            file_name: file.file_name,
            file_type: file.file_type,
            file_size: file.file_size,
            checksum: file.checksum,
            last_modified: file.last_modified.map(|dt| dt.timestamp_millis()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub backup_id: Option<i32>,
    pub status: OperationStatus,
    pub current_step: Option<String>,
    pub completed_steps: i32,
    pub total_steps: i32,
    pub restore_database: bool,
    pub restore_files: bool,
    pub restore_settings: bool,
    pub create_backup_before_restore: bool,
    pub pre_restore_backup_id: Option<i32>,
    /// Parsed from restore tool output; approximate
    pub tables_restored: Option<i32>,
    /// Parsed from restore tool output; approximate
    pub records_restored: Option<i64>,
    pub files_restored: Option<i32>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub duration_secs: Option<i64>,
    pub error_message: Option<String>,
    pub created_by: Option<i32>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
}

impl From<restores::Model> for RestoreResponse {
    fn from(restore: restores::Model) -> Self {
        Self {
            id: restore.id,
            name: restore.name,
            description: restore.description,
            backup_id: restore.backup_id,
            status: restore.status,
            current_step: restore.current_step,
            completed_steps: restore.completed_steps,
            total_steps: restore.total_steps,
            restore_database: restore.restore_database,
            restore_files: restore.restore_files,
            restore_settings: restore.restore_settings,
            create_backup_before_restore: restore.create_backup_before_restore,
            pre_restore_backup_id: restore.pre_restore_backup_id,
            tables_restored: restore.tables_restored,
            records_restored: restore.records_restored,
            files_restored: restore.files_restored,
            started_at: restore.started_at.timestamp_millis(),
            completed_at: restore.completed_at.map(|dt| dt.timestamp_millis()),
            duration_secs: restore.duration_secs,
            error_message: restore.error_message,
            created_by: restore.created_by,
            metadata: restore.metadata,
            created_at: restore.created_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperationLogResponse {
    pub id: i32,
    pub operation_type: OperationKind,
    pub level: LogLevel,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub duration_ms: Option<i64>,
    pub created_at: i64,
}

impl From<operation_logs::Model> for OperationLogResponse {
    fn from(entry: operation_logs::Model) -> Self {
        Self {
            id: entry.id,
            operation_type: entry.operation_type,
            level: entry.level,
            message: entry.message,
            data: entry.data,
            duration_ms: entry.duration_ms,
            created_at: entry.created_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfigResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub backup_type: BackupType,
    pub storage_location: StorageLocation,
    pub schedule: Option<String>,
    pub is_schedule_enabled: bool,
    pub retention_days: i32,
    pub max_backups: i32,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<backup_configs::Model> for BackupConfigResponse {
    fn from(config: backup_configs::Model) -> Self {
        Self {
            id: config.id,
            name: config.name,
            description: config.description,
            backup_type: config.backup_type,
            storage_location: config.storage_location,
            schedule: config.schedule,
            is_schedule_enabled: config.is_schedule_enabled,
            retention_days: config.retention_days,
            max_backups: config.max_backups,
            is_active: config.is_active,
            created_at: config.created_at.timestamp_millis(),
            updated_at: config.updated_at.timestamp_millis(),
        }
    }
}
