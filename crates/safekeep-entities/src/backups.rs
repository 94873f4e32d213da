use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use safekeep_core::DBDateTime;

use crate::types::{BackupType, OperationStatus, TriggerSource};

/// A point-in-time snapshot of database and/or file state.
///
/// `file_path` and both checksums are set exactly when `status` is
/// `completed`; `error_message` is set exactly when it is `failed`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "backups")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub backup_type: BackupType,
    pub status: OperationStatus,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub checksum_md5: Option<String>,
    pub checksum_sha256: Option<String>,
    pub database_tables: Option<i32>,
    pub database_records: Option<i64>,
    pub file_count: Option<i32>,
    pub started_at: DBDateTime,
    pub completed_at: Option<DBDateTime>,
    pub duration_secs: Option<i64>,
    pub error_message: Option<String>,
    pub triggered_by: TriggerSource,
    pub created_by: Option<i32>,
    pub config_id: Option<i32>,
    pub metadata: Option<Json>,
    pub created_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::backup_files::Entity")]
    BackupFiles,
    #[sea_orm(has_many = "super::operation_logs::Entity")]
    OperationLogs,
    #[sea_orm(
        belongs_to = "super::backup_configs::Entity",
        from = "Column::ConfigId",
        to = "super::backup_configs::Column::Id"
    )]
    BackupConfig,
}

impl Related<super::backup_files::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BackupFiles.def()
    }
}

impl Related<super::operation_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OperationLogs.def()
    }
}

impl Related<super::backup_configs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BackupConfig.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
