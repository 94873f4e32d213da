use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use safekeep_core::DBDateTime;

use crate::types::OperationStatus;

/// A request to replay a backup into the live system.
///
/// `completed_steps` only grows and never exceeds `total_steps`, which is
/// fixed when the row is created.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "restores")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    /// Source backup; cleared if that backup is later deleted
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
    pub tables_restored: Option<i32>,
    pub records_restored: Option<i64>,
    pub files_restored: Option<i32>,
    pub started_at: DBDateTime,
    pub completed_at: Option<DBDateTime>,
    pub duration_secs: Option<i64>,
    pub error_message: Option<String>,
    pub created_by: Option<i32>,
    pub metadata: Option<Json>,
    pub created_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::backups::Entity",
        from = "Column::BackupId",
        to = "super::backups::Column::Id",
        on_delete = "SetNull"
    )]
    Backup,
    #[sea_orm(has_many = "super::operation_logs::Entity")]
    OperationLogs,
}

impl Related<super::backups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Backup.def()
    }
}

impl Related<super::operation_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OperationLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
