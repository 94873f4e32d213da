use chrono::Utc;
use cron::Schedule;
use safekeep_core::DBDateTime;
use safekeep_entities::backup_configs;
use safekeep_entities::types::{BackupType, StorageLocation};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use super::BackupError;

pub const SETTINGS_FILE_NAME: &str = "settings.json";
const SETTINGS_SNAPSHOT_VERSION: u32 = 1;

fn default_retention_days() -> i32 {
    30
}

fn default_max_backups() -> i32 {
    10
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackupConfig {
    pub name: String,
    pub description: Option<String>,
    pub backup_type: BackupType,
    #[serde(default)]
    pub storage_location: Option<StorageLocation>,
    /// Cron expression, 5 fields (minute first) or 6-7 fields (seconds first)
    pub schedule: Option<String>,
    #[serde(default)]
    pub is_schedule_enabled: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: i32,
    #[serde(default = "default_max_backups")]
    pub max_backups: i32,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBackupConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub backup_type: Option<BackupType>,
    pub storage_location: Option<StorageLocation>,
    pub schedule: Option<String>,
    pub is_schedule_enabled: Option<bool>,
    pub retention_days: Option<i32>,
    pub max_backups: Option<i32>,
    pub is_active: Option<bool>,
}

/// One config as stored in `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub name: String,
    pub description: Option<String>,
    pub backup_type: BackupType,
    pub storage_location: StorageLocation,
    pub schedule: Option<String>,
    pub is_schedule_enabled: bool,
    pub retention_days: i32,
    pub max_backups: i32,
    pub is_active: bool,
}

/// Serialized form of the service settings carried inside an archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub version: u32,
    pub exported_at: DBDateTime,
    pub backup_configs: Vec<ConfigSnapshot>,
}

impl SettingsSnapshot {
    pub async fn write_to(&self, path: &Path) -> Result<u64, BackupError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    pub async fn read_from(path: &Path) -> Result<Self, BackupError> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl From<&backup_configs::Model> for ConfigSnapshot {
    fn from(model: &backup_configs::Model) -> Self {
        Self {
            name: model.name.clone(),
            description: model.description.clone(),
            backup_type: model.backup_type,
            storage_location: model.storage_location,
            schedule: model.schedule.clone(),
            is_schedule_enabled: model.is_schedule_enabled,
            retention_days: model.retention_days,
            max_backups: model.max_backups,
            is_active: model.is_active,
        }
    }
}

/// Parse a cron expression, accepting the classic 5-field form.
pub fn parse_schedule(expression: &str) -> Result<Schedule, String> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| e.to_string())
}

/// CRUD over backup policies plus the settings snapshot.
#[derive(Clone)]
pub struct BackupConfigService {
    db: Arc<DatabaseConnection>,
}

impl BackupConfigService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        request: CreateBackupConfig,
    ) -> Result<backup_configs::Model, BackupError> {
        let mut errors = Vec::new();
        let name = request.name.trim().to_string();
        if name.is_empty() {
            errors.push("name must not be empty".to_string());
        }
        validate_policy(
            request.schedule.as_deref(),
            request.is_schedule_enabled,
            request.retention_days,
            request.max_backups,
            &mut errors,
        );
        if !errors.is_empty() {
            return Err(BackupError::Validation(errors));
        }
        self.ensure_name_free(&name, None).await?;

        let now = Utc::now();
        let config = backup_configs::ActiveModel {
            name: Set(name),
            description: Set(request.description),
            backup_type: Set(request.backup_type),
            storage_location: Set(request.storage_location.unwrap_or(StorageLocation::Local)),
            schedule: Set(request.schedule),
            is_schedule_enabled: Set(request.is_schedule_enabled),
            retention_days: Set(request.retention_days),
            max_backups: Set(request.max_backups),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        info!(config_id = config.id, name = %config.name, "Backup config created");
        Ok(config)
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<backup_configs::Model>, BackupError> {
        let mut query = backup_configs::Entity::find();
        if !include_inactive {
            query = query.filter(backup_configs::Column::IsActive.eq(true));
        }
        Ok(query
            .order_by_asc(backup_configs::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn get(&self, id: i32) -> Result<backup_configs::Model, BackupError> {
        backup_configs::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| BackupError::NotFound(format!("Backup config {} not found", id)))
    }

    pub async fn update(
        &self,
        id: i32,
        request: UpdateBackupConfig,
    ) -> Result<backup_configs::Model, BackupError> {
        let current = self.get(id).await?;

        let name = request.name.map(|n| n.trim().to_string());
        let schedule = request.schedule.or_else(|| current.schedule.clone());
        let is_schedule_enabled = request
            .is_schedule_enabled
            .unwrap_or(current.is_schedule_enabled);
        let retention_days = request.retention_days.unwrap_or(current.retention_days);
        let max_backups = request.max_backups.unwrap_or(current.max_backups);

        let mut errors = Vec::new();
        if name.as_deref().is_some_and(str::is_empty) {
            errors.push("name must not be empty".to_string());
        }
        validate_policy(
            schedule.as_deref(),
            is_schedule_enabled,
            retention_days,
            max_backups,
            &mut errors,
        );
        if !errors.is_empty() {
            return Err(BackupError::Validation(errors));
        }
        if let Some(name) = &name {
            self.ensure_name_free(name, Some(id)).await?;
        }

        let mut active = current.into_active_model();
        if let Some(name) = name {
            active.name = Set(name);
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(backup_type) = request.backup_type {
            active.backup_type = Set(backup_type);
        }
        if let Some(location) = request.storage_location {
            active.storage_location = Set(location);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.schedule = Set(schedule);
        active.is_schedule_enabled = Set(is_schedule_enabled);
        active.retention_days = Set(retention_days);
        active.max_backups = Set(max_backups);
        active.updated_at = Set(Utc::now());

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Soft delete: the row stays so existing backups keep their link.
    pub async fn deactivate(&self, id: i32) -> Result<backup_configs::Model, BackupError> {
        let current = self.get(id).await?;
        let mut active = current.into_active_model();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;
        info!(config_id = id, "Backup config deactivated");
        Ok(updated)
    }

    pub async fn export_snapshot(&self) -> Result<SettingsSnapshot, BackupError> {
        let configs = self.list(true).await?;
        Ok(SettingsSnapshot {
            version: SETTINGS_SNAPSHOT_VERSION,
            exported_at: Utc::now(),
            backup_configs: configs.iter().map(ConfigSnapshot::from).collect(),
        })
    }

    /// Upsert every config in `snapshot` by name. Configs not present in the
    /// snapshot are left alone. Returns the number of configs written.
    pub async fn apply_snapshot(&self, snapshot: &SettingsSnapshot) -> Result<usize, BackupError> {
        if snapshot.version != SETTINGS_SNAPSHOT_VERSION {
            return Err(BackupError::Validation(vec![format!(
                "unsupported settings snapshot version {}",
                snapshot.version
            )]));
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();
        for config in &snapshot.backup_configs {
            let existing = backup_configs::Entity::find()
                .filter(backup_configs::Column::Name.eq(config.name.as_str()))
                .one(&txn)
                .await?;

            let mut active = match existing {
                Some(model) => model.into_active_model(),
                None => backup_configs::ActiveModel {
                    name: Set(config.name.clone()),
                    created_at: Set(now),
                    ..Default::default()
                },
            };
            active.description = Set(config.description.clone());
            active.backup_type = Set(config.backup_type);
            active.storage_location = Set(config.storage_location);
            active.schedule = Set(config.schedule.clone());
            active.is_schedule_enabled = Set(config.is_schedule_enabled);
            active.retention_days = Set(config.retention_days);
            active.max_backups = Set(config.max_backups);
            active.is_active = Set(config.is_active);
            active.updated_at = Set(now);
            active.save(&txn).await?;
        }
        txn.commit().await?;

        Ok(snapshot.backup_configs.len())
    }

    async fn ensure_name_free(&self, name: &str, except: Option<i32>) -> Result<(), BackupError> {
        let mut query = backup_configs::Entity::find().filter(backup_configs::Column::Name.eq(name));
        if let Some(id) = except {
            query = query.filter(backup_configs::Column::Id.ne(id));
        }
        if query.one(self.db.as_ref()).await?.is_some() {
            return Err(BackupError::Conflict(format!(
                "A backup config named '{}' already exists",
                name
            )));
        }
        Ok(())
    }
}

fn validate_policy(
    schedule: Option<&str>,
    is_schedule_enabled: bool,
    retention_days: i32,
    max_backups: i32,
    errors: &mut Vec<String>,
) {
    match schedule.filter(|s| !s.trim().is_empty()) {
        Some(expression) => {
            if let Err(e) = parse_schedule(expression) {
                errors.push(format!("invalid schedule '{}': {}", expression, e));
            }
        }
        None if is_schedule_enabled => {
            errors.push("a schedule is required when scheduling is enabled".to_string())
        }
        None => {}
    }
    if retention_days < 0 {
        errors.push("retention_days must not be negative".to_string());
    }
    if max_backups < 0 {
        errors.push("max_backups must not be negative".to_string());
    }
}
