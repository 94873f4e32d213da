//! Test utilities for database integration tests
//!
//! Every `TestDatabase` is a freshly migrated SQLite file inside its own
//! temporary directory, so tests are isolated from each other and need no
//! running database server.

use crate::DbConnection;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, Statement};
use sea_orm_migration::MigratorTrait;
use safekeep_migrations::Migrator;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Tables in deletion order (children first).
const TABLES: [&str; 5] = [
    "operation_logs",
    "restores",
    "backup_files",
    "backups",
    "backup_configs",
];

pub struct TestDatabase {
    pub db: Arc<DbConnection>,
    pub database_url: String,
    /// Keeps the database file alive for the lifetime of the test
    dir: TempDir,
}

impl TestDatabase {
    /// Create a new migrated test database.
    pub async fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let database_url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());

        let mut opt = ConnectOptions::new(database_url.clone());
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await?;

        Migrator::up(&db, None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

        Ok(Self {
            db: Arc::new(db),
            database_url,
            dir,
        })
    }

    /// Directory holding the database file; tests may put fixtures here.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub async fn test_connection(&self) -> anyhow::Result<()> {
        self.db
            .execute(Statement::from_string(
                self.db.get_database_backend(),
                "SELECT 1".to_string(),
            ))
            .await?;
        Ok(())
    }

    /// Remove every row from every table.
    pub async fn cleanup_all_tables(&self) -> anyhow::Result<()> {
        for table in TABLES {
            self.db
                .execute(Statement::from_string(
                    self.db.get_database_backend(),
                    format!("DELETE FROM {}", table),
                ))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
    use safekeep_entities::backup_configs;
    use safekeep_entities::types::{BackupType, StorageLocation};

    #[tokio::test]
    async fn test_new_database_is_migrated() -> anyhow::Result<()> {
        let test_db = TestDatabase::new().await?;
        test_db.test_connection().await?;

        let now = Utc::now();
        backup_configs::ActiveModel {
            name: Set("nightly".to_string()),
            backup_type: Set(BackupType::Full),
            storage_location: Set(StorageLocation::Local),
            is_schedule_enabled: Set(false),
            retention_days: Set(7),
            max_backups: Set(3),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(test_db.db.as_ref())
        .await?;

        let count = backup_configs::Entity::find()
            .count(test_db.db.as_ref())
            .await?;
        assert_eq!(count, 1);

        test_db.cleanup_all_tables().await?;
        let count = backup_configs::Entity::find()
            .count(test_db.db.as_ref())
            .await?;
        assert_eq!(count, 0);
        Ok(())
    }
}
