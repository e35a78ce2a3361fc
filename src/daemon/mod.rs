pub mod handlers;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod webhook;

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::GlobalConfig;
use crate::pipeline::Orchestrator;
use crate::status::{CommitStatusReporter, StatusReporter};
use crate::store::BuildHistoryStore;

/// Shared daemon state accessible by all handlers
pub struct DaemonState {
    pub config: GlobalConfig,
    pub store: BuildHistoryStore,
    pub started_at: Instant,
    pub scheduler_tx: mpsc::Sender<scheduler::Job>,
}

impl DaemonState {
    pub fn new(
        config: GlobalConfig,
        store: BuildHistoryStore,
        scheduler_tx: mpsc::Sender<scheduler::Job>,
    ) -> Self {
        Self {
            config,
            store,
            started_at: Instant::now(),
            scheduler_tx,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Jobs accepted but not yet picked up by the scheduler
    pub fn queued_jobs(&self) -> usize {
        self.scheduler_tx.max_capacity() - self.scheduler_tx.capacity()
    }
}

/// Main entry point for the daemon
pub async fn run(config: GlobalConfig) -> anyhow::Result<()> {
    tracing::info!("Starting hookci...");

    let store = BuildHistoryStore::open(&config.database.path)?;
    tracing::info!("Build history at {}", config.database.path.display());

    if config.credentials.is_empty() {
        tracing::warn!("No repository credentials configured, commit statuses will not be reported");
    }
    let reporter: Arc<dyn StatusReporter> = Arc::new(CommitStatusReporter::from_config(&config));
    let orchestrator = Arc::new(Orchestrator::new(
        config.pipeline.clone(),
        config.status.context.clone(),
        reporter,
        store.clone(),
    ));

    let (scheduler_tx, scheduler_rx) = mpsc::channel(config.server.queue_capacity);
    let state = Arc::new(DaemonState::new(config, store, scheduler_tx));

    // Start scheduler
    let scheduler = tokio::spawn(scheduler::run(scheduler_rx, orchestrator));

    tracing::info!("hookci is running");

    server::run(Arc::clone(&state), shutdown_signal()).await?;

    tracing::info!("Stopped accepting webhooks, finishing accepted builds...");
    tokio::select! {
        _ = drain(state, scheduler) => {
            tracing::info!("Shutdown complete");
        }
        _ = shutdown_signal() => {
            tracing::warn!("Second shutdown signal, abandoning remaining builds");
        }
    }

    Ok(())
}

/// Close the build queue and wait until every accepted job has run.
///
/// The queue closes once the last handle on `state` is gone; the scheduler
/// then drains what is left and stops.
pub async fn drain(state: Arc<DaemonState>, scheduler: JoinHandle<()>) {
    drop(state);
    if let Err(e) = scheduler.await {
        tracing::error!("Scheduler task failed: {}", e);
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::global::PipelineConfig;
    use crate::models::build::PipelineOutcome;
    use crate::models::events::WebhookEvent;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    struct NoopReporter;

    #[async_trait]
    impl StatusReporter for NoopReporter {
        async fn report(
            &self,
            _outcome: PipelineOutcome,
            _repository: &str,
            _commit_id: &str,
            _context: &str,
            _description: &str,
        ) -> PipelineOutcome {
            PipelineOutcome::Success
        }
    }

    fn push(commit: &str) -> scheduler::Job {
        scheduler::Job::Build(WebhookEvent {
            repository_url: "https://github.com/octo/widgets".into(),
            branch_name: "main".into(),
            commit_id: commit.into(),
            received_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_drain_finishes_running_and_queued_builds() {
        let root = tempfile::tempdir().unwrap();
        let work_dir = root.path().join("to_build");
        let sh = |s: &str| vec!["sh".to_string(), "-c".to_string(), s.to_string()];
        let mut config = GlobalConfig::default();
        config.pipeline = PipelineConfig {
            work_dir: work_dir.clone(),
            clone_command: sh("mkdir -p {dir}"),
            build_command: sh("sleep 1; echo built {commit}"),
            test_command: sh("true"),
            test_source_dir: "src/test".into(),
            clone_timeout_secs: 10,
            build_timeout_secs: 10,
            test_timeout_secs: 10,
        };
        let store = BuildHistoryStore::open_in_memory().unwrap();
        let orchestrator = Arc::new(Orchestrator::new(
            config.pipeline.clone(),
            "ci/hookci",
            Arc::new(NoopReporter),
            store.clone(),
        ));
        let (tx, rx) = mpsc::channel(4);
        let state = Arc::new(DaemonState::new(config, store.clone(), tx));
        let scheduler = tokio::spawn(scheduler::run(rx, orchestrator));

        state.scheduler_tx.try_send(push("c0ffee01")).unwrap();
        state.scheduler_tx.try_send(push("c0ffee02")).unwrap();

        // Wait until the first build is mid-stage
        for _ in 0..100 {
            if work_dir.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(work_dir.exists());

        tokio::time::timeout(Duration::from_secs(20), drain(state, scheduler))
            .await
            .unwrap();

        let first = store.get_by_commit_id("c0ffee01").await.unwrap().unwrap();
        assert!(first.build_logs.contains("built c0ffee01"));
        assert!(store.get_by_commit_id("c0ffee02").await.unwrap().is_some());
        assert!(!work_dir.exists());
    }
}
