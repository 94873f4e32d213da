use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use safekeep_core::DBDateTime;

use crate::types::{BackupType, StorageLocation};

/// Reusable backup policy. Soft-deleted by clearing `is_active`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "backup_configs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub description: Option<String>,
    pub backup_type: BackupType,
    pub storage_location: StorageLocation,
    pub schedule: Option<String>,
    pub is_schedule_enabled: bool,
    pub retention_days: i32,
    pub max_backups: i32,
    pub is_active: bool,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::backups::Entity")]
    Backups,
}

impl Related<super::backups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Backups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
