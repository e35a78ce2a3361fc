use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

use crate::daemon::protocol::{ErrorResponse, QueuedResponse};
use crate::daemon::scheduler::Job;
use crate::daemon::DaemonState;
use crate::models::events::WebhookEvent;

/// Seconds a sender is asked to wait when the build queue is full
const RETRY_AFTER_SECS: &str = "30";

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub async fn handle_webhook(
    State(state): State<Arc<DaemonState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(kind) = headers.get("x-github-event").and_then(|v| v.to_str().ok()) {
        if kind != "push" {
            tracing::debug!("Ignoring '{}' event", kind);
            return StatusCode::NO_CONTENT.into_response();
        }
    }

    let event = match WebhookEvent::parse(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Rejected webhook: {}", e);
            return error(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let queued = QueuedResponse {
        commit_id: event.commit_id.clone(),
        branch: event.branch_name.clone(),
    };

    match state.scheduler_tx.try_send(Job::Build(event)) {
        Ok(()) => {
            tracing::info!(
                "Queued build for {} (branch: {})",
                &queued.commit_id[..7.min(queued.commit_id.len())],
                queued.branch
            );
            (StatusCode::ACCEPTED, Json(queued)).into_response()
        }
        Err(TrySendError::Full(_)) => {
            tracing::warn!("Build queue full, asking sender to retry {}", queued.commit_id);
            let mut resp = error(StatusCode::SERVICE_UNAVAILABLE, "build queue is full");
            resp.headers_mut().insert(
                header::RETRY_AFTER,
                header::HeaderValue::from_static(RETRY_AFTER_SECS),
            );
            resp
        }
        Err(TrySendError::Closed(_)) => {
            tracing::error!("Scheduler is not running, dropping {}", queued.commit_id);
            error(StatusCode::SERVICE_UNAVAILABLE, "scheduler is not running")
        }
    }
}
