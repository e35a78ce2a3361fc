use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::Instrument;

use crate::config::global::PipelineConfig;
use crate::models::build::{PipelineOutcome, RunSummary};
use crate::models::events::WebhookEvent;
use crate::pipeline::process::{run_stage, StageExit, StageRun};
use crate::pipeline::workspace::Workspace;
use crate::status::StatusReporter;
use crate::store::BuildHistoryStore;
use crate::utils::render_args;

/// Drives clone, build, test, status report, persistence and cleanup for one
/// push event at a time.
pub struct Orchestrator {
    config: PipelineConfig,
    context: String,
    reporter: Arc<dyn StatusReporter>,
    store: BuildHistoryStore,
    // Guards the fixed working directory.
    in_flight: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        context: impl Into<String>,
        reporter: Arc<dyn StatusReporter>,
        store: BuildHistoryStore,
    ) -> Self {
        Self {
            config,
            context: context.into(),
            reporter,
            store,
            in_flight: Mutex::new(()),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.config.work_dir
    }

    /// Run the whole pipeline for `event`. Concurrent callers wait for the
    /// run in flight to finish its cleanup before they start cloning.
    pub async fn run(&self, event: &WebhookEvent) -> RunSummary {
        let _permit = self.in_flight.lock().await;
        let span = tracing::info_span!(
            "pipeline",
            run_id = %uuid::Uuid::new_v4(),
            commit = %event.short_commit(),
            branch = %event.branch_name,
        );
        self.run_exclusive(event).instrument(span).await
    }

    async fn run_exclusive(&self, event: &WebhookEvent) -> RunSummary {
        if event.commit_id.is_empty() {
            tracing::error!("Refusing to run pipeline without a commit id");
            return RunSummary {
                outcome: PipelineOutcome::IoError,
                status: PipelineOutcome::StatusReportError,
                persist: PipelineOutcome::PersistError,
            };
        }

        tracing::info!(repository = %event.repository_url, "Pipeline started");
        let mut log = String::new();

        let summary = match Workspace::prepare(self.work_dir()).await {
            Ok(workspace) => {
                let outcome = self.execute_stages(event, &mut log).await;
                let status = self.report_status(event, outcome).await;
                let persist = self.persist(event, &log).await;
                if let Err(e) = workspace.release().await {
                    tracing::error!("Cleanup of {} failed: {}", self.work_dir().display(), e);
                }
                RunSummary {
                    outcome,
                    status,
                    persist,
                }
            }
            Err(e) => {
                tracing::error!("Could not prepare {}: {}", self.work_dir().display(), e);
                log.push_str(&format!("could not prepare working directory: {}\n", e));
                let outcome = PipelineOutcome::IoError;
                let status = self.report_status(event, outcome).await;
                let persist = self.persist(event, &log).await;
                RunSummary {
                    outcome,
                    status,
                    persist,
                }
            }
        };

        tracing::info!(
            outcome = %summary.outcome,
            status = %summary.status,
            persist = %summary.persist,
            "Pipeline finished"
        );
        summary
    }

    async fn execute_stages(&self, event: &WebhookEvent, log: &mut String) -> PipelineOutcome {
        let cloned = self.clone_repository(event, log).await;
        if cloned != PipelineOutcome::Success {
            return cloned;
        }
        let built = self.trigger_build(event, log).await;
        if built != PipelineOutcome::Success {
            return built;
        }
        self.trigger_testing(event, log).await
    }

    fn render(&self, template: &[String], event: &WebhookEvent) -> Vec<String> {
        let dir = self.work_dir().to_string_lossy();
        render_args(
            template,
            &[
                ("repo", event.repository_url.as_str()),
                ("branch", event.branch_name.as_str()),
                ("commit", event.commit_id.as_str()),
                ("dir", dir.as_ref()),
            ],
        )
    }

    /// Fetch only the pushed branch into the working directory. Clone output
    /// is kept in the log only when the clone fails.
    pub async fn clone_repository(&self, event: &WebhookEvent, log: &mut String) -> PipelineOutcome {
        tracing::info!("Cloning {} ({})", event.repository_url, event.branch_name);
        let argv = self.render(&self.config.clone_command, event);
        let run = run_stage(&argv, None, self.config.clone_timeout()).await;

        let outcome = classify("clone", &run, PipelineOutcome::CloneError);
        if outcome != PipelineOutcome::Success {
            log.push_str(&run.output);
            if let StageExit::LaunchFailed(msg) = &run.exit {
                log.push_str(&format!("{}\n", msg));
            }
        }
        outcome
    }

    /// Build inside the working directory with test execution excluded.
    pub async fn trigger_build(&self, event: &WebhookEvent, log: &mut String) -> PipelineOutcome {
        if !is_dir(self.work_dir()).await {
            tracing::error!("Working directory {} missing after clone", self.work_dir().display());
            return PipelineOutcome::IoError;
        }
        tracing::info!("Building");
        let argv = self.render(&self.config.build_command, event);
        self.run_in_work_dir("build", &argv, self.config.build_timeout(), PipelineOutcome::BuildError, log)
            .await
    }

    /// Run the test suite, or return `NoTests` without launching anything when
    /// the tree has no test sources.
    pub async fn trigger_testing(&self, event: &WebhookEvent, log: &mut String) -> PipelineOutcome {
        let test_dir = self.work_dir().join(&self.config.test_source_dir);
        if !has_files(test_dir).await {
            tracing::info!("No test sources under {}, skipping tests", self.config.test_source_dir.display());
            return PipelineOutcome::NoTests;
        }
        tracing::info!("Testing");
        let argv = self.render(&self.config.test_command, event);
        self.run_in_work_dir("test", &argv, self.config.test_timeout(), PipelineOutcome::TestError, log)
            .await
    }

    async fn run_in_work_dir(
        &self,
        stage: &str,
        argv: &[String],
        timeout: Duration,
        failure: PipelineOutcome,
        log: &mut String,
    ) -> PipelineOutcome {
        let run = run_stage(argv, Some(self.work_dir()), timeout).await;
        log.push_str(&run.output);
        if let StageExit::LaunchFailed(msg) = &run.exit {
            log.push_str(&format!("{}\n", msg));
        }
        classify(stage, &run, failure)
    }

    async fn report_status(&self, event: &WebhookEvent, outcome: PipelineOutcome) -> PipelineOutcome {
        let Some(repository) = event.repository_identifier() else {
            tracing::warn!(
                "Cannot derive repository identifier from {}, status not reported",
                event.repository_url
            );
            return PipelineOutcome::StatusReportError;
        };
        self.reporter
            .report(
                outcome,
                &repository,
                &event.commit_id,
                &self.context,
                outcome.description(),
            )
            .await
    }

    async fn persist(&self, event: &WebhookEvent, log: &str) -> PipelineOutcome {
        match self
            .store
            .insert(&event.commit_id, &event.build_timestamp(), log)
            .await
        {
            Ok(()) => {
                tracing::debug!("Build history recorded");
                PipelineOutcome::Success
            }
            Err(e) => {
                tracing::error!("Build history not recorded: {}", e);
                PipelineOutcome::PersistError
            }
        }
    }
}

fn classify(stage: &str, run: &StageRun, failure: PipelineOutcome) -> PipelineOutcome {
    match &run.exit {
        StageExit::Success => PipelineOutcome::Success,
        StageExit::Failed(code) => {
            tracing::warn!(stage, exit_code = ?code, "Stage failed");
            failure
        }
        StageExit::TimedOut(after) => {
            tracing::warn!(stage, "Stage timed out after {}s", after.as_secs());
            failure
        }
        StageExit::LaunchFailed(msg) => {
            tracing::error!(stage, "Could not launch: {}", msg);
            PipelineOutcome::IoError
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

async fn has_files(dir: PathBuf) -> bool {
    tokio::task::spawn_blocking(move || contains_files(&dir))
        .await
        .unwrap_or(false)
}

/// True when `dir` holds at least one regular file at any depth
fn contains_files(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| match entry.file_type() {
        Ok(ft) if ft.is_file() => true,
        Ok(ft) if ft.is_dir() => contains_files(&entry.path()),
        _ => false,
    })
}
