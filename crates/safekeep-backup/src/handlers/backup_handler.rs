use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use safekeep_core::problemdetails::{Problem, ProblemDetails};
use std::sync::Arc;
use tracing::info;

use super::types::{
    BackupAppState, BackupFileResponse, BackupResponse, CreateBackupRequest, CreatedResponse,
    OperationLogResponse, VerifyBackupResponse,
};

pub fn configure_routes() -> Router<Arc<BackupAppState>> {
    Router::new()
        .route("/backups", get(list_backups).post(create_backup))
        .route("/backups/{id}", get(get_backup).delete(delete_backup))
        .route("/backups/{id}/files", get(list_backup_files))
        .route("/backups/{id}/logs", get(list_backup_logs))
        .route("/backups/{id}/verify", post(verify_backup))
}

/// Start a backup; it runs in the background, poll `GET /backups/{id}`
#[utoipa::path(
    tag = "Backups",
    post,
    path = "/backups",
    request_body = CreateBackupRequest,
    responses(
        (status = 201, description = "Backup started", body = CreatedResponse),
        (status = 400, description = "Invalid request", body = ProblemDetails),
        (status = 500, description = "Internal server error", body = ProblemDetails)
    )
)]
pub(crate) async fn create_backup(
    State(app_state): State<Arc<BackupAppState>>,
    Json(request): Json<CreateBackupRequest>,
) -> Result<impl IntoResponse, Problem> {
    let id = app_state
        .backup_orchestrator
        .start_backup(request.into_options())
        .await
        .map_err(Problem::from)?;

    info!(backup_id = id, "Backup requested over HTTP");
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

#[utoipa::path(
    tag = "Backups",
    get,
    path = "/backups",
    responses(
        (status = 200, description = "All backups, newest first", body = Vec<BackupResponse>),
        (status = 500, description = "Internal server error", body = ProblemDetails)
    )
)]
pub(crate) async fn list_backups(
    State(app_state): State<Arc<BackupAppState>>,
) -> Result<impl IntoResponse, Problem> {
    let backups = app_state
        .backup_orchestrator
        .list_backups()
        .await
        .map_err(Problem::from)?;
    let responses: Vec<BackupResponse> = backups.into_iter().map(Into::into).collect();
    Ok(Json(responses))
}

#[utoipa::path(
    tag = "Backups",
    get,
    path = "/backups/{id}",
    params(("id" = i32, Path, description = "Backup ID")),
    responses(
        (status = 200, description = "Backup details", body = BackupResponse),
        (status = 404, description = "Backup not found", body = ProblemDetails)
    )
)]
pub(crate) async fn get_backup(
    State(app_state): State<Arc<BackupAppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let backup = app_state
        .backup_orchestrator
        .get_backup(id)
        .await
        .map_err(Problem::from)?;
    Ok(Json(BackupResponse::from(backup)))
}

#[utoipa::path(
    tag = "Backups",
    delete,
    path = "/backups/{id}",
    params(("id" = i32, Path, description = "Backup ID")),
    responses(
        (status = 204, description = "Backup deleted"),
        (status = 404, description = "Backup not found", body = ProblemDetails),
        (status = 409, description = "Backup in use by a running operation", body = ProblemDetails)
    )
)]
pub(crate) async fn delete_backup(
    State(app_state): State<Arc<BackupAppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    app_state
        .backup_orchestrator
        .delete_backup(id)
        .await
        .map_err(Problem::from)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    tag = "Backups",
    get,
    path = "/backups/{id}/files",
    params(("id" = i32, Path, description = "Backup ID")),
    responses(
        (status = 200, description = "Manifest entries of the backup", body = Vec<BackupFileResponse>),
        (status = 404, description = "Backup not found", body = ProblemDetails)
    )
)]
pub(crate) async fn list_backup_files(
    State(app_state): State<Arc<BackupAppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let files = app_state
        .backup_orchestrator
        .get_files(id)
        .await
        .map_err(Problem::from)?;
    let responses: Vec<BackupFileResponse> = files.into_iter().map(Into::into).collect();
    Ok(Json(responses))
}

#[utoipa::path(
    tag = "Backups",
    get,
    path = "/backups/{id}/logs",
    params(("id" = i32, Path, description = "Backup ID")),
    responses(
        (status = 200, description = "Operation log in creation order", body = Vec<OperationLogResponse>),
        (status = 404, description = "Backup not found", body = ProblemDetails)
    )
)]
pub(crate) async fn list_backup_logs(
    State(app_state): State<Arc<BackupAppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let entries = app_state
        .backup_orchestrator
        .get_logs(id)
        .await
        .map_err(Problem::from)?;
    let responses: Vec<OperationLogResponse> = entries.into_iter().map(Into::into).collect();
    Ok(Json(responses))
}

/// Recompute the archive checksum and compare it with the recorded one
#[utoipa::path(
    tag = "Backups",
    post,
    path = "/backups/{id}/verify",
    params(("id" = i32, Path, description = "Backup ID")),
    responses(
        (status = 200, description = "Integrity check result", body = VerifyBackupResponse),
        (status = 404, description = "Backup not found", body = ProblemDetails)
    )
)]
pub(crate) async fn verify_backup(
    State(app_state): State<Arc<BackupAppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let valid = app_state
        .backup_orchestrator
        .validate_integrity(id)
        .await
        .map_err(Problem::from)?;
    Ok(Json(VerifyBackupResponse { id, valid }))
}

#[cfg(test)]
mod tests {
    use crate::handlers::{configure_routes, create_backup_app_state};
    use crate::services::CreateBackupOptions;
    use crate::testing::Harness;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use safekeep_entities::types::BackupType;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(h: &Harness) -> Router {
        configure_routes().with_state(create_backup_app_state(
            h.backups.clone(),
            h.restores.clone(),
            h.configs.clone(),
        ))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_create_backup_returns_id_and_completes() {
        let h = Harness::new().await;
        let (status, body) = send(
            app(&h),
            "POST",
            "/backups",
            Some(json!({
                "name": "nightly",
                "backupType": "database_only",
                "compressionLevel": 3
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_i64().unwrap() as i32;
        let backup = h.wait_for_backup(id).await;
        assert_eq!(backup.status.as_str(), "completed");

        let (status, body) = send(app(&h), "GET", &format!("/backups/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["backupType"], "database_only");
        assert_eq!(body["metadata"]["compression"]["level"], 3);
        assert!(body["startedAt"].is_i64());
    }

    #[tokio::test]
    async fn test_create_backup_rejects_bad_level() {
        let h = Harness::new().await;
        let (status, body) = send(
            app(&h),
            "POST",
            "/backups",
            Some(json!({ "name": "x", "backupType": "full", "compressionLevel": 11 })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["title"], "Validation Error");
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_files_logs_verify_delete() {
        let h = Harness::new().await;
        let id = h
            .backups
            .create_backup(CreateBackupOptions::new("api", BackupType::DatabaseOnly))
            .await
            .unwrap();

        let (status, body) = send(app(&h), "GET", "/backups", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, files) = send(app(&h), "GET", &format!("/backups/{}/files", id), None).await;
        assert_eq!(files[0]["fileType"], "database");

        let (_, logs) = send(app(&h), "GET", &format!("/backups/{}/logs", id), None).await;
        assert!(!logs.as_array().unwrap().is_empty());

        let (status, verify) = send(app(&h), "POST", &format!("/backups/{}/verify", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verify["valid"], true);

        let (status, _) = send(app(&h), "DELETE", &format!("/backups/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, problem) = send(app(&h), "GET", &format!("/backups/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(problem["title"], "Resource Not Found");
    }
}
