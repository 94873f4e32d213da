//! Database connection management

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use safekeep_core::{ServiceError, ServiceResult};
use safekeep_migrations::{Migrator, MigratorTrait};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub type DbConnection = DatabaseConnection;

/// Connect to `database_url` and bring the schema up to date.
pub async fn establish_connection(database_url: &str) -> ServiceResult<Arc<DbConnection>> {
    let mut opt = ConnectOptions::new(database_url);
    if database_url.starts_with("sqlite:") {
        // SQLite serialises writers; a single connection avoids SQLITE_BUSY
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(20).min_connections(2);
    }
    opt.connect_timeout(Duration::from_secs(30))
        .sqlx_logging(false);

    let db = Database::connect(opt)
        .await
        .map_err(|e| ServiceError::Database(e.to_string()))?;

    Migrator::up(&db, None)
        .await
        .map_err(|e| ServiceError::Database(e.to_string()))?;
    debug!("Database migrations applied");

    Ok(Arc::new(db))
}
