use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use safekeep_core::DBDateTime;

use crate::types::BackupFileType;

/// Manifest entry for one component stored inside a backup archive.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "backup_files")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub backup_id: i32,
    /// Path of the entry relative to the archive root
    pub file_path: String,
    pub file_name: String,
    pub file_type: BackupFileType,
    pub file_size: i64,
    pub checksum: Option<String>,
    pub last_modified: Option<DBDateTime>,
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
}

impl Related<super::backups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Backup.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
