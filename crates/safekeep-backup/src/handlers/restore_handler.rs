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
    BackupAppState, CreateRestoreRequest, CreatedResponse, OperationLogResponse, RestoreResponse,
};

pub fn configure_routes() -> Router<Arc<BackupAppState>> {
    Router::new()
        .route("/restores", get(list_restores).post(create_restore))
        .route("/restores/{id}", get(get_restore))
        .route("/restores/{id}/logs", get(list_restore_logs))
        .route("/restores/{id}/cancel", post(cancel_restore))
}

/// Validate and start a restore; progress is visible on `GET /restores/{id}`
#[utoipa::path(
    tag = "Restores",
    post,
    path = "/restores",
    request_body = CreateRestoreRequest,
    responses(
        (status = 201, description = "Restore started", body = CreatedResponse),
        (status = 400, description = "Restore request failed validation", body = ProblemDetails),
        (status = 409, description = "Source backup is being deleted", body = ProblemDetails),
        (status = 500, description = "Internal server error", body = ProblemDetails)
    )
)]
pub(crate) async fn create_restore(
    State(app_state): State<Arc<BackupAppState>>,
    Json(request): Json<CreateRestoreRequest>,
) -> Result<impl IntoResponse, Problem> {
    let backup_id = request.backup_id;
    let id = app_state
        .restore_orchestrator
        .start_restore(request.into_options())
        .await
        .map_err(Problem::from)?;

    info!(restore_id = id, backup_id, "Restore requested over HTTP");
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

#[utoipa::path(
    tag = "Restores",
    get,
    path = "/restores",
    responses(
        (status = 200, description = "All restores, newest first", body = Vec<RestoreResponse>),
        (status = 500, description = "Internal server error", body = ProblemDetails)
    )
)]
pub(crate) async fn list_restores(
    State(app_state): State<Arc<BackupAppState>>,
) -> Result<impl IntoResponse, Problem> {
    let restores = app_state
        .restore_orchestrator
        .list_restores()
        .await
        .map_err(Problem::from)?;
    let responses: Vec<RestoreResponse> = restores.into_iter().map(Into::into).collect();
    Ok(Json(responses))
}

#[utoipa::path(
    tag = "Restores",
    get,
    path = "/restores/{id}",
    params(("id" = i32, Path, description = "Restore ID")),
    responses(
        (status = 200, description = "Restore details and progress", body = RestoreResponse),
        (status = 404, description = "Restore not found", body = ProblemDetails)
    )
)]
pub(crate) async fn get_restore(
    State(app_state): State<Arc<BackupAppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let restore = app_state
        .restore_orchestrator
        .get_restore(id)
        .await
        .map_err(Problem::from)?;
    Ok(Json(RestoreResponse::from(restore)))
}

#[utoipa::path(
    tag = "Restores",
    get,
    path = "/restores/{id}/logs",
    params(("id" = i32, Path, description = "Restore ID")),
    responses(
        (status = 200, description = "Operation log in creation order", body = Vec<OperationLogResponse>),
        (status = 404, description = "Restore not found", body = ProblemDetails)
    )
)]
pub(crate) async fn list_restore_logs(
    State(app_state): State<Arc<BackupAppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let entries = app_state
        .restore_orchestrator
        .get_logs(id)
        .await
        .map_err(Problem::from)?;
    let responses: Vec<OperationLogResponse> = entries.into_iter().map(Into::into).collect();
    Ok(Json(responses))
}

/// Request cancellation; the run stops at its next step boundary
#[utoipa::path(
    tag = "Restores",
    post,
    path = "/restores/{id}/cancel",
    params(("id" = i32, Path, description = "Restore ID")),
    responses(
        (status = 200, description = "Restore marked as cancelled", body = RestoreResponse),
        (status = 404, description = "Restore not found", body = ProblemDetails),
        (status = 409, description = "Restore already finished", body = ProblemDetails)
    )
)]
pub(crate) async fn cancel_restore(
    State(app_state): State<Arc<BackupAppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let restore = app_state
        .restore_orchestrator
        .cancel_restore(id)
        .await
        .map_err(Problem::from)?;
    info!(restore_id = id, "Restore cancellation requested");
    Ok(Json(RestoreResponse::from(restore)))
}
