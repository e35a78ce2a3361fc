use serde::{Deserialize, Serialize};

/// One row of build history.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub commit_id: String,
    pub build_date: String,
    pub build_logs: String,
}

/// Result of a single pipeline stage.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    Success,
    CloneError,
    BuildError,
    TestError,
    NoTests,
    StatusReportError,
    PersistError,
    IoError,
}

impl PipelineOutcome {
    /// `NoTests` is a skip, not a failure.
    pub fn is_success(self) -> bool {
        matches!(self, PipelineOutcome::Success | PipelineOutcome::NoTests)
    }

    /// Human-readable commit status description for a terminal outcome
    pub fn description(self) -> &'static str {
        match self {
            PipelineOutcome::Success => "Build and tests succeeded",
            PipelineOutcome::NoTests => "Build succeeded, tests skipped (no test sources)",
            PipelineOutcome::CloneError => "Could not clone the pushed branch",
            PipelineOutcome::BuildError => "Build failed",
            PipelineOutcome::TestError => "Tests failed",
            PipelineOutcome::IoError => "Build could not be run",
            PipelineOutcome::StatusReportError => "Status report failed",
            PipelineOutcome::PersistError => "Build history could not be saved",
        }
    }
}

impl std::fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineOutcome::Success => write!(f, "Success"),
            PipelineOutcome::CloneError => write!(f, "CloneError"),
            PipelineOutcome::BuildError => write!(f, "BuildError"),
            PipelineOutcome::TestError => write!(f, "TestError"),
            PipelineOutcome::NoTests => write!(f, "NoTests"),
            PipelineOutcome::StatusReportError => write!(f, "StatusReportError"),
            PipelineOutcome::PersistError => write!(f, "PersistError"),
            PipelineOutcome::IoError => write!(f, "IoError"),
        }
    }
}

/// What one pipeline run ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Terminal outcome of clone/build/test
    pub outcome: PipelineOutcome,
    /// `Success` or `StatusReportError`
    pub status: PipelineOutcome,
    /// `Success` or `PersistError`
    pub persist: PipelineOutcome,
}

impl RunSummary {
    pub fn passed(&self) -> bool {
        self.outcome.is_success()
    }
}
