use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use safekeep_core::problemdetails::{Problem, ProblemDetails};
use std::sync::Arc;

use super::types::{BackupAppState, BackupConfigResponse, ListConfigsQuery};
use crate::services::{CreateBackupConfig, UpdateBackupConfig};

pub fn configure_routes() -> Router<Arc<BackupAppState>> {
    Router::new()
        .route("/backup-configs", get(list_configs).post(create_config))
        .route(
            "/backup-configs/{id}",
            get(get_config).patch(update_config).delete(delete_config),
        )
}

#[utoipa::path(
    tag = "Backup Configs",
    get,
    path = "/backup-configs",
    params(ListConfigsQuery),
    responses(
        (status = 200, description = "Backup configs", body = Vec<BackupConfigResponse>),
        (status = 500, description = "Internal server error", body = ProblemDetails)
    )
)]
pub(crate) async fn list_configs(
    State(app_state): State<Arc<BackupAppState>>,
    Query(query): Query<ListConfigsQuery>,
) -> Result<impl IntoResponse, Problem> {
    let configs = app_state
        .config_service
        .list(query.include_inactive.unwrap_or(false))
        .await
        .map_err(Problem::from)?;
    let responses: Vec<BackupConfigResponse> = configs.into_iter().map(Into::into).collect();
    Ok(Json(responses))
}

#[utoipa::path(
    tag = "Backup Configs",
    post,
    path = "/backup-configs",
    request_body = CreateBackupConfig,
    responses(
        (status = 201, description = "Config created", body = BackupConfigResponse),
        (status = 400, description = "Invalid config", body = ProblemDetails),
        (status = 409, description = "Name already taken", body = ProblemDetails)
    )
)]
pub(crate) async fn create_config(
    State(app_state): State<Arc<BackupAppState>>,
    Json(request): Json<CreateBackupConfig>,
) -> Result<impl IntoResponse, Problem> {
    let config = app_state
        .config_service
        .create(request)
        .await
        .map_err(Problem::from)?;
    Ok((StatusCode::CREATED, Json(BackupConfigResponse::from(config))))
}

#[utoipa::path(
    tag = "Backup Configs",
    get,
    path = "/backup-configs/{id}",
    params(("id" = i32, Path, description = "Config ID")),
    responses(
        (status = 200, description = "Config details", body = BackupConfigResponse),
        (status = 404, description = "Config not found", body = ProblemDetails)
    )
)]
pub(crate) async fn get_config(
    State(app_state): State<Arc<BackupAppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let config = app_state
        .config_service
        .get(id)
        .await
        .map_err(Problem::from)?;
    Ok(Json(BackupConfigResponse::from(config)))
}

#[utoipa::path(
    tag = "Backup Configs",
    patch,
    path = "/backup-configs/{id}",
    params(("id" = i32, Path, description = "Config ID")),
    request_body = UpdateBackupConfig,
    responses(
        (status = 200, description = "Config updated", body = BackupConfigResponse),
        (status = 400, description = "Invalid config", body = ProblemDetails),
        (status = 404, description = "Config not found", body = ProblemDetails)
    )
)]
pub(crate) async fn update_config(
    State(app_state): State<Arc<BackupAppState>>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateBackupConfig>,
) -> Result<impl IntoResponse, Problem> {
    let config = app_state
        .config_service
        .update(id, request)
        .await
        .map_err(Problem::from)?;
    Ok(Json(BackupConfigResponse::from(config)))
}

/// Soft delete: the config stops applying retention but stays referenced
/// by its backups.
#[utoipa::path(
    tag = "Backup Configs",
    delete,
    path = "/backup-configs/{id}",
    params(("id" = i32, Path, description = "Config ID")),
    responses(
        (status = 204, description = "Config deactivated"),
        (status = 404, description = "Config not found", body = ProblemDetails)
    )
)]
pub(crate) async fn delete_config(
    State(app_state): State<Arc<BackupAppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    app_state
        .config_service
        .deactivate(id)
        .await
        .map_err(Problem::from)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::handlers::{configure_routes, create_backup_app_state};
    use crate::testing::Harness;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
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
    async fn test_config_lifecycle() {
        let h = Harness::new().await;
        let (status, created) = send(
            app(&h),
            "POST",
            "/backup-configs",
            Some(json!({
                "name": "nightly",
                "backupType": "full",
                "schedule": "0 2 * * *",
                "isScheduleEnabled": true
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["retentionDays"], 30);
        assert_eq!(created["maxBackups"], 10);
        let id = created["id"].as_i64().unwrap();

        let (status, updated) = send(
            app(&h),
            "PATCH",
            &format!("/backup-configs/{}", id),
            Some(json!({ "retentionDays": 7 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["retentionDays"], 7);
        assert_eq!(updated["name"], "nightly");

        let (status, _) = send(app(&h), "DELETE", &format!("/backup-configs/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, active) = send(app(&h), "GET", "/backup-configs", None).await;
        assert!(active.as_array().unwrap().is_empty());

        let (_, all) = send(app(&h), "GET", "/backup-configs?includeInactive=true", None).await;
        assert_eq!(all[0]["isActive"], false);
    }

    #[tokio::test]
    async fn test_invalid_schedule_and_duplicate_name() {
        let h = Harness::new().await;
        let (status, body) = send(
            app(&h),
            "POST",
            "/backup-configs",
            Some(json!({ "name": "bad", "backupType": "full", "schedule": "every day" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"].is_array());

        h.create_config("taken", 30, 10).await;
        let (status, _) = send(
            app(&h),
            "POST",
            "/backup-configs",
            Some(json!({ "name": "taken", "backupType": "full" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(app(&h), "GET", "/backup-configs/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
