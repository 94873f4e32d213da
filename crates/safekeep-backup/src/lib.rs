//! Backup and restore orchestration: database dumps, file trees, archives
//! and the bookkeeping that ties them together.

pub mod handlers;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use handlers::{configure_routes, create_backup_app_state, BackupApiDoc, BackupAppState};
pub use services::*;
