pub(crate) mod backup_handler;
pub(crate) mod config_handler;
pub(crate) mod restore_handler;
pub(crate) mod types;

use axum::http::StatusCode;
use axum::Router;
use safekeep_core::problemdetails::{self, Problem, ProblemDetails};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::services::BackupError;
pub use types::{create_backup_app_state, BackupAppState};

impl From<BackupError> for Problem {
    fn from(error: BackupError) -> Self {
        match error {
            BackupError::NotFound(msg) => problemdetails::new(StatusCode::NOT_FOUND)
                .with_title("Resource Not Found")
                .with_detail(msg),

            BackupError::Validation(errors) => problemdetails::new(StatusCode::BAD_REQUEST)
                .with_title("Validation Error")
                .with_detail(errors.join("; "))
                .with_value("errors", errors),

            BackupError::Conflict(msg) => problemdetails::new(StatusCode::CONFLICT)
                .with_title("Conflict")
                .with_detail(msg),

            BackupError::Cancelled(msg) => problemdetails::new(StatusCode::CONFLICT)
                .with_title("Operation Cancelled")
                .with_detail(msg),

            BackupError::Configuration(msg) => {
                problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                    .with_title("Configuration Error")
                    .with_detail(msg)
            }

            BackupError::Dump(msg) => problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_title("Database Dump Failed")
                .with_detail(msg),

            BackupError::Restore(msg) => problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_title("Database Restore Failed")
                .with_detail(msg),

            BackupError::Archive(e) => problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_title("Archive Error")
                .with_detail(e.to_string()),

            BackupError::Io(msg) => problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_title("Filesystem Error")
                .with_detail(msg),

            BackupError::Database(e) => problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_title("Database Error")
                .with_detail(e.to_string()),

            BackupError::Serialization(e) => {
                problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                    .with_title("Serialization Error")
                    .with_detail(e.to_string())
            }

            BackupError::Internal(msg) => problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_title("Internal Server Error")
                .with_detail(msg),
        }
    }
}

pub fn configure_routes() -> Router<Arc<BackupAppState>> {
    Router::new()
        .merge(backup_handler::configure_routes())
        .merge(restore_handler::configure_routes())
        .merge(config_handler::configure_routes())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        backup_handler::create_backup,
        backup_handler::list_backups,
        backup_handler::get_backup,
        backup_handler::delete_backup,
        backup_handler::list_backup_files,
        backup_handler::list_backup_logs,
        backup_handler::verify_backup,
        restore_handler::create_restore,
        restore_handler::list_restores,
        restore_handler::get_restore,
        restore_handler::list_restore_logs,
        restore_handler::cancel_restore,
        config_handler::list_configs,
        config_handler::create_config,
        config_handler::get_config,
        config_handler::update_config,
        config_handler::delete_config,
    ),
    components(
        schemas(
            ProblemDetails,
            types::CreateBackupRequest,
            types::CreateRestoreRequest,
            types::CreatedResponse,
            types::VerifyBackupResponse,
            types::BackupResponse,
            types::BackupFileResponse,
            types::RestoreResponse,
            types::OperationLogResponse,
            types::BackupConfigResponse,
            crate::services::CreateBackupConfig,
            crate::services::UpdateBackupConfig,
        )
    ),
    info(
        title = "Safekeep API",
        description = "Backup and restore orchestration. Backups capture a database dump and \
        the uploads and assets trees into checksummed archives; restores replay them, \
        optionally taking a safety snapshot first.",
        version = "1.0.0"
    ),
    tags(
        (name = "Backups", description = "Backup creation, inspection and deletion"),
        (name = "Restores", description = "Restore runs and their progress"),
        (name = "Backup Configs", description = "Reusable backup and retention policies")
    )
)]
pub struct BackupApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_validation_problem_lists_errors() {
        let problem = Problem::from(BackupError::Validation(vec![
            "backup 1 does not exist".into(),
            "name must not be empty".into(),
        ]));
        assert_eq!(problem.status_code, StatusCode::BAD_REQUEST);
        assert_eq!(
            problem.body["errors"],
            serde_json::json!(["backup 1 does not exist", "name must not be empty"])
        );
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (BackupError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (BackupError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                BackupError::Dump("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                BackupError::Configuration("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(Problem::from(error).into_response().status(), status);
        }
    }

    #[test]
    fn test_openapi_lists_routes() {
        let doc = BackupApiDoc::openapi();
        for path in ["/backups", "/backups/{id}", "/restores/{id}/cancel", "/backup-configs"] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
