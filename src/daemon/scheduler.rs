use std::sync::Arc;
use tokio::sync::mpsc;

use crate::models::events::WebhookEvent;
use crate::pipeline::Orchestrator;

#[derive(Debug)]
pub enum Job {
    Build(WebhookEvent),
}

/// Run the scheduler loop. Jobs are drained one at a time: the next job is
/// not picked up until the previous pipeline has cleaned up.
pub async fn run(mut rx: mpsc::Receiver<Job>, orchestrator: Arc<Orchestrator>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Build(event) => {
                let commit = event.commit_id.clone();
                let orchestrator = Arc::clone(&orchestrator);

                // A panicking run must not take the queue down with it.
                let result = tokio::spawn(async move { orchestrator.run(&event).await }).await;
                match result {
                    Ok(summary) if summary.passed() => {
                        tracing::info!("[{}] Build passed ({})", commit, summary.outcome);
                    }
                    Ok(summary) => {
                        tracing::warn!("[{}] Build failed ({})", commit, summary.outcome);
                    }
                    Err(e) => {
                        tracing::error!("[{}] Pipeline task aborted: {}", commit, e);
                    }
                }
            }
        }
    }
    tracing::info!("Scheduler stopped");
}
