pub mod archive;
pub mod backup;
pub mod checksum;
pub mod configs;
pub mod dump;
mod error;
pub mod leases;
pub mod operation_log;
pub mod replicator;
pub mod restore;
pub mod retention;

pub use archive::{ArchiveCodec, ArchiveError, ArchiveSummary};
pub use backup::{BackupOrchestrator, CreateBackupOptions};
pub use checksum::{ChecksumAlgorithm, ChecksumEngine, ChecksumError};
pub use configs::{BackupConfigService, CreateBackupConfig, SettingsSnapshot, UpdateBackupConfig};
pub use dump::{
    DatabaseDumper, DatabaseStatistics, DumpError, PgDumpAdapter, RestoreStats,
    BOOKKEEPING_TABLES,
};
pub use error::BackupError;
pub use leases::{LeaseKey, OperationLeases};
pub use operation_log::{LogOwner, OperationLog};
pub use replicator::{FileTreeReplicator, ReplicationError};
pub use restore::{RestoreOptions, RestoreOrchestrator};
pub use retention::{RetentionSweeper, SweepReport};
