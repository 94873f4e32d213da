pub use super::backup_configs::Entity as BackupConfigs;
pub use super::backup_files::Entity as BackupFiles;
pub use super::backups::Entity as Backups;
pub use super::operation_logs::Entity as OperationLogs;
pub use super::restores::Entity as Restores;
