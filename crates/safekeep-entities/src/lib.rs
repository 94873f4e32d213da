pub mod types;
pub mod backup_configs;
pub mod backups;
pub mod backup_files;
pub mod restores;
pub mod operation_logs;

pub mod prelude;
