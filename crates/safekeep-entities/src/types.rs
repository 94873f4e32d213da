use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use utoipa::ToSchema;

/// What a backup captures.
/// NOTE: Use db_type = "Text" for SQLite compatibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveActiveEnum, EnumIter, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    #[sea_orm(string_value = "full")]
    Full,
    #[sea_orm(string_value = "database_only")]
    DatabaseOnly,
    #[sea_orm(string_value = "files_only")]
    FilesOnly,
    #[sea_orm(string_value = "settings_only")]
    SettingsOnly,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::DatabaseOnly => "database_only",
            BackupType::FilesOnly => "files_only",
            BackupType::SettingsOnly => "settings_only",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "full" => Some(BackupType::Full),
            "database_only" => Some(BackupType::DatabaseOnly),
            "files_only" => Some(BackupType::FilesOnly),
            "settings_only" => Some(BackupType::SettingsOnly),
            _ => None,
        }
    }

    pub fn includes_database(&self) -> bool {
        matches!(self, BackupType::Full | BackupType::DatabaseOnly)
    }

    pub fn includes_files(&self) -> bool {
        matches!(self, BackupType::Full | BackupType::FilesOnly)
    }

    pub fn includes_settings(&self) -> bool {
        matches!(self, BackupType::Full | BackupType::SettingsOnly)
    }
}

impl Display for BackupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state shared by backups and restores.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveActiveEnum, EnumIter, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

impl Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of component a manifest entry describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveActiveEnum, EnumIter, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum BackupFileType {
    #[sea_orm(string_value = "database")]
    Database,
    #[sea_orm(string_value = "upload")]
    Upload,
    #[sea_orm(string_value = "asset")]
    Asset,
    #[sea_orm(string_value = "settings")]
    Settings,
}

impl BackupFileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupFileType::Database => "database",
            BackupFileType::Upload => "upload",
            BackupFileType::Asset => "asset",
            BackupFileType::Settings => "settings",
        }
    }
}

impl Display for BackupFileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveActiveEnum, EnumIter, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    #[sea_orm(string_value = "backup")]
    Backup,
    #[sea_orm(string_value = "restore")]
    Restore,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Backup => "backup",
            OperationKind::Restore => "restore",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveActiveEnum, EnumIter, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    #[sea_orm(string_value = "debug")]
    Debug,
    #[sea_orm(string_value = "info")]
    Info,
    #[sea_orm(string_value = "warn")]
    Warn,
    #[sea_orm(string_value = "error")]
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Who started a backup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveActiveEnum, EnumIter, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    #[sea_orm(string_value = "manual")]
    Manual,
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::Scheduled => "scheduled",
        }
    }
}

/// Where a config asks its archives to be kept. Only `local` is acted on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveActiveEnum, EnumIter, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    #[sea_orm(string_value = "local")]
    Local,
    #[sea_orm(string_value = "cloud")]
    Cloud,
    #[sea_orm(string_value = "both")]
    Both,
}

impl StorageLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageLocation::Local => "local",
            StorageLocation::Cloud => "cloud",
            StorageLocation::Both => "both",
        }
    }
}
