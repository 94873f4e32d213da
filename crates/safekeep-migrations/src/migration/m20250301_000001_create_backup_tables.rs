//! Creates the backup/restore bookkeeping tables.
//!
//! Foreign keys are declared inline with the table so the schema also
//! builds on SQLite, which cannot add constraints after the fact.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BackupConfigs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BackupConfigs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BackupConfigs::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(BackupConfigs::Description).text().null())
                    .col(ColumnDef::new(BackupConfigs::BackupType).string().not_null())
                    .col(
                        ColumnDef::new(BackupConfigs::StorageLocation)
                            .string()
                            .not_null()
                            .default("local"),
                    )
                    .col(ColumnDef::new(BackupConfigs::Schedule).string().null())
                    .col(
                        ColumnDef::new(BackupConfigs::IsScheduleEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(BackupConfigs::RetentionDays)
                            .integer()
                            .not_null()
                            .default(30),
                    )
                    .col(
                        ColumnDef::new(BackupConfigs::MaxBackups)
                            .integer()
                            .not_null()
                            .default(10),
                    )
                    .col(
                        ColumnDef::new(BackupConfigs::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(BackupConfigs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BackupConfigs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Backups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Backups::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Backups::Name).string().not_null())
                    .col(ColumnDef::new(Backups::Description).text().null())
                    .col(ColumnDef::new(Backups::BackupType).string().not_null())
                    .col(ColumnDef::new(Backups::Status).string().not_null())
                    .col(ColumnDef::new(Backups::FilePath).string().null())
                    .col(ColumnDef::new(Backups::FileSize).big_integer().null())
                    .col(ColumnDef::new(Backups::ChecksumMd5).string().null())
                    .col(ColumnDef::new(Backups::ChecksumSha256).string().null())
                    .col(ColumnDef::new(Backups::DatabaseTables).integer().null())
                    .col(ColumnDef::new(Backups::DatabaseRecords).big_integer().null())
                    .col(ColumnDef::new(Backups::FileCount).integer().null())
                    .col(
                        ColumnDef::new(Backups::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Backups::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Backups::DurationSecs).big_integer().null())
                    .col(ColumnDef::new(Backups::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(Backups::TriggeredBy)
                            .string()
                            .not_null()
                            .default("manual"),
                    )
                    .col(ColumnDef::new(Backups::CreatedBy).integer().null())
                    .col(ColumnDef::new(Backups::ConfigId).integer().null())
                    .col(ColumnDef::new(Backups::Metadata).json().null())
                    .col(
                        ColumnDef::new(Backups::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_backups_config_id")
                            .from(Backups::Table, Backups::ConfigId)
                            .to(BackupConfigs::Table, BackupConfigs::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BackupFiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BackupFiles::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BackupFiles::BackupId).integer().not_null())
                    .col(ColumnDef::new(BackupFiles::FilePath).string().not_null())
                    .col(ColumnDef::new(BackupFiles::FileName).string().not_null())
                    .col(ColumnDef::new(BackupFiles::FileType).string().not_null())
                    .col(
                        ColumnDef::new(BackupFiles::FileSize)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(BackupFiles::Checksum).string().null())
                    .col(
                        ColumnDef::new(BackupFiles::LastModified)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(BackupFiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_backup_files_backup_id")
                            .from(BackupFiles::Table, BackupFiles::BackupId)
                            .to(Backups::Table, Backups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Restores::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Restores::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Restores::Name).string().not_null())
                    .col(ColumnDef::new(Restores::Description).text().null())
                    .col(ColumnDef::new(Restores::BackupId).integer().null())
                    .col(ColumnDef::new(Restores::Status).string().not_null())
                    .col(ColumnDef::new(Restores::CurrentStep).string().null())
                    .col(
                        ColumnDef::new(Restores::CompletedSteps)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Restores::TotalSteps)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Restores::RestoreDatabase)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Restores::RestoreFiles)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Restores::RestoreSettings)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Restores::CreateBackupBeforeRestore)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Restores::PreRestoreBackupId).integer().null())
                    .col(ColumnDef::new(Restores::TablesRestored).integer().null())
                    .col(ColumnDef::new(Restores::RecordsRestored).big_integer().null())
                    .col(ColumnDef::new(Restores::FilesRestored).integer().null())
                    .col(
                        ColumnDef::new(Restores::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Restores::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Restores::DurationSecs).big_integer().null())
                    .col(ColumnDef::new(Restores::ErrorMessage).text().null())
                    .col(ColumnDef::new(Restores::CreatedBy).integer().null())
                    .col(ColumnDef::new(Restores::Metadata).json().null())
                    .col(
                        ColumnDef::new(Restores::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_restores_backup_id")
                            .from(Restores::Table, Restores::BackupId)
                            .to(Backups::Table, Backups::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OperationLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OperationLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OperationLogs::BackupId).integer().null())
                    .col(ColumnDef::new(OperationLogs::RestoreId).integer().null())
                    .col(
                        ColumnDef::new(OperationLogs::OperationType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OperationLogs::Level).string().not_null())
                    .col(ColumnDef::new(OperationLogs::Message).text().not_null())
                    .col(ColumnDef::new(OperationLogs::Data).json().null())
                    .col(ColumnDef::new(OperationLogs::DurationMs).big_integer().null())
                    .col(
                        ColumnDef::new(OperationLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_operation_logs_backup_id")
                            .from(OperationLogs::Table, OperationLogs::BackupId)
                            .to(Backups::Table, Backups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_operation_logs_restore_id")
                            .from(OperationLogs::Table, OperationLogs::RestoreId)
                            .to(Restores::Table, Restores::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Lookups by owner and the retention sweep's (config, status, age) scan
        manager
            .create_index(
                Index::create()
                    .name("idx_backups_config_status_created")
                    .table(Backups::Table)
                    .col(Backups::ConfigId)
                    .col(Backups::Status)
                    .col(Backups::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_backup_files_backup_id")
                    .table(BackupFiles::Table)
                    .col(BackupFiles::BackupId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_operation_logs_backup_id")
                    .table(OperationLogs::Table)
                    .col(OperationLogs::BackupId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_operation_logs_restore_id")
                    .table(OperationLogs::Table)
                    .col(OperationLogs::RestoreId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OperationLogs::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Restores::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BackupFiles::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Backups::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BackupConfigs::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum BackupConfigs {
    Table,
    Id,
    Name,
    Description,
    BackupType,
    StorageLocation,
    Schedule,
    IsScheduleEnabled,
    RetentionDays,
    MaxBackups,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Backups {
    Table,
    Id,
    Name,
    Description,
    BackupType,
    Status,
    FilePath,
    FileSize,
    ChecksumMd5,
    ChecksumSha256,
    DatabaseTables,
    DatabaseRecords,
    FileCount,
    StartedAt,
    CompletedAt,
    DurationSecs,
    ErrorMessage,
    TriggeredBy,
    CreatedBy,
    ConfigId,
    Metadata,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BackupFiles {
    Table,
    Id,
    BackupId,
    FilePath,
    FileName,
    FileType,
    FileSize,
    Checksum,
    LastModified,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Restores {
    Table,
    Id,
    Name,
    Description,
    BackupId,
    Status,
    CurrentStep,
    CompletedSteps,
    TotalSteps,
    RestoreDatabase,
    RestoreFiles,
    RestoreSettings,
    CreateBackupBeforeRestore,
    PreRestoreBackupId,
    TablesRestored,
    RecordsRestored,
    FilesRestored,
    StartedAt,
    CompletedAt,
    DurationSecs,
    ErrorMessage,
    CreatedBy,
    Metadata,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OperationLogs {
    Table,
    Id,
    BackupId,
    RestoreId,
    OperationType,
    Level,
    Message,
    Data,
    DurationMs,
    CreatedAt,
}
