use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::daemon::{handlers, webhook, DaemonState};
use crate::error::CiError;

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn run<F>(state: Arc<DaemonState>, shutdown: F) -> Result<(), CiError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("0.0.0.0:{}", state.config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        "Listening on {} (webhook path: {})",
        addr,
        state.config.server.webhook_path
    );

    axum::serve(listener, create_router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub fn create_router(state: Arc<DaemonState>) -> Router {
    let webhook_path = state.config.server.webhook_path.clone();
    Router::new()
        .route(&webhook_path, post(webhook::handle_webhook))
        .route("/builds", get(handlers::list_builds))
        .route("/builds/:commit_id", get(handlers::get_build))
        .route("/api/health", get(handlers::health))
        .with_state(state)
}
