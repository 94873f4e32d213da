use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use safekeep_core::DBDateTime;

use crate::types::{LogLevel, OperationKind};

/// Append-only audit entry owned by exactly one backup or restore.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "operation_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub backup_id: Option<i32>,
    pub restore_id: Option<i32>,
    pub operation_type: OperationKind,
    pub level: LogLevel,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub data: Option<Json>,
    pub duration_ms: Option<i64>,
    pub created_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::backups::Entity",
        from = "Column::BackupId",
        to = "super::backups::Column::Id",
        on_delete = "Cascade"
    )]
    Backup,
    #[sea_orm(
        belongs_to = "super::restores::Entity",
        from = "Column::RestoreId",
        to = "super::restores::Column::Id",
        on_delete = "Cascade"
    )]
    Restore,
}

impl Related<super::backups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Backup.def()
    }
}

impl Related<super::restores::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Restore.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
