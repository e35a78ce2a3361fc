use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use std::sync::Arc;

use crate::daemon::protocol::*;
use crate::daemon::DaemonState;
use crate::models::build::BuildRecord;

pub async fn health(State(state): State<Arc<DaemonState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.uptime_secs(),
        queued: state.queued_jobs(),
    })
}

pub async fn list_builds(
    State(state): State<Arc<DaemonState>>,
) -> Result<Json<BuildListResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.store.get_all().await {
        Ok(builds) => Ok(Json(BuildListResponse { builds })),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

pub async fn get_build(
    State(state): State<Arc<DaemonState>>,
    Path(commit_id): Path<String>,
) -> Result<Json<BuildRecord>, (StatusCode, Json<ErrorResponse>)> {
    match state.store.get_by_commit_id(&commit_id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No build recorded for commit '{}'", commit_id),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}
