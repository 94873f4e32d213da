use chrono::Utc;
use safekeep_entities::operation_logs;
use safekeep_entities::types::{LogLevel, OperationKind};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::BackupError;

/// The backup or restore a log entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOwner {
    Backup(i32),
    Restore(i32),
}

impl LogOwner {
    fn kind(&self) -> OperationKind {
        match self {
            LogOwner::Backup(_) => OperationKind::Backup,
            LogOwner::Restore(_) => OperationKind::Restore,
        }
    }

    fn id(&self) -> i32 {
        match self {
            LogOwner::Backup(id) | LogOwner::Restore(id) => *id,
        }
    }
}

/// Append-only audit trail of backup and restore steps.
///
/// Writes never fail from the caller's point of view: an entry that cannot
/// be stored is reported through `tracing` and dropped.
#[derive(Clone)]
pub struct OperationLog {
    db: Arc<DatabaseConnection>,
}

impl OperationLog {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn append(
        &self,
        owner: LogOwner,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<Value>,
        duration_ms: Option<i64>,
    ) {
        let message = message.into();
        let kind = owner.kind().as_str();
        let owner_id = owner.id();
        match level {
            LogLevel::Debug => debug!(operation = kind, owner_id, "{}", message),
            LogLevel::Info => info!(operation = kind, owner_id, "{}", message),
            LogLevel::Warn => warn!(operation = kind, owner_id, "{}", message),
            LogLevel::Error => error!(operation = kind, owner_id, "{}", message),
        }

        let (backup_id, restore_id) = match owner {
            LogOwner::Backup(id) => (Some(id), None),
            LogOwner::Restore(id) => (None, Some(id)),
        };
        let entry = operation_logs::ActiveModel {
            backup_id: Set(backup_id),
            restore_id: Set(restore_id),
            operation_type: Set(owner.kind()),
            level: Set(level),
            message: Set(message),
            data: Set(data),
            duration_ms: Set(duration_ms),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        if let Err(e) = entry.insert(self.db.as_ref()).await {
            error!(
                operation = kind,
                owner_id, "Failed to persist operation log entry: {}", e
            );
        }
    }

    pub async fn info(&self, owner: LogOwner, message: impl Into<String>, data: Option<Value>) {
        self.append(owner, LogLevel::Info, message, data, None).await
    }

    pub async fn warn(&self, owner: LogOwner, message: impl Into<String>, data: Option<Value>) {
        self.append(owner, LogLevel::Warn, message, data, None).await
    }

    pub async fn error(&self, owner: LogOwner, message: impl Into<String>, data: Option<Value>) {
        self.append(owner, LogLevel::Error, message, data, None).await
    }

    /// Info entry carrying how long the step took.
    pub async fn timed(
        &self,
        owner: LogOwner,
        message: impl Into<String>,
        data: Option<Value>,
        started: std::time::Instant,
    ) {
        let duration_ms = started.elapsed().as_millis() as i64;
        self.append(owner, LogLevel::Info, message, data, Some(duration_ms))
            .await
    }

    pub async fn entries(&self, owner: LogOwner) -> Result<Vec<operation_logs::Model>, BackupError> {
        let filter = match owner {
            LogOwner::Backup(id) => operation_logs::Column::BackupId.eq(id),
            LogOwner::Restore(id) => operation_logs::Column::RestoreId.eq(id),
        };
        let entries = operation_logs::Entity::find()
            .filter(filter)
            .order_by_asc(operation_logs::Column::Id)
            .all(self.db.as_ref())
            .await?;
        Ok(entries)
    }
}
