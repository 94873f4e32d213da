use thiserror::Error;

use super::archive::ArchiveError;
use super::checksum::ChecksumError;
use super::dump::DumpError;
use super::replicator::ReplicationError;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Database dump failed: {0}")]
    Dump(String),

    #[error("Database restore failed: {0}")]
    Restore(String),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for BackupError {
    fn from(error: std::io::Error) -> Self {
        BackupError::Io(error.to_string())
    }
}

impl From<ChecksumError> for BackupError {
    fn from(error: ChecksumError) -> Self {
        BackupError::Io(error.to_string())
    }
}

impl From<ReplicationError> for BackupError {
    fn from(error: ReplicationError) -> Self {
        BackupError::Io(error.to_string())
    }
}

impl From<DumpError> for BackupError {
    fn from(error: DumpError) -> Self {
        match error {
            DumpError::Configuration(msg) => BackupError::Configuration(msg),
            err @ DumpError::RestoreFailed { .. } => BackupError::Restore(err.to_string()),
            err => BackupError::Dump(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for BackupError {
    fn from(error: tokio::task::JoinError) -> Self {
        BackupError::Internal(format!("Background task failed: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_lists_every_violation() {
        let err = BackupError::Validation(vec![
            "backup 3 has status in_progress, expected completed".to_string(),
            "backup 3 has no archive".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: backup 3 has status in_progress, expected completed; backup 3 has no archive"
        );
    }

    #[test]
    fn test_dump_errors_keep_their_kind() {
        let missing: BackupError = DumpError::Configuration("no DATABASE_URL".into()).into();
        assert!(matches!(missing, BackupError::Configuration(_)));

        let restore: BackupError = DumpError::RestoreFailed {
            tool: "psql".into(),
            exit_code: Some(3),
            stderr: "ERROR: relation exists".into(),
        }
        .into();
        match restore {
            BackupError::Restore(msg) => assert!(msg.contains("ERROR: relation exists")),
            other => panic!("unexpected error: {:?}", other),
        }

        let dump: BackupError = DumpError::DumpFailed {
            tool: "pg_dump".into(),
            exit_code: Some(1),
            stderr: "connection refused".into(),
        }
        .into();
        assert!(matches!(dump, BackupError::Dump(_)));
    }
}
