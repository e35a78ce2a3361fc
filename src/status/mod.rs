//! Commit status reporting back to the source-control host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::GlobalConfig;
use crate::error::CiError;
use crate::models::build::PipelineOutcome;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Success,
    Failure,
}

impl From<PipelineOutcome> for StatusState {
    fn from(outcome: PipelineOutcome) -> Self {
        if outcome.is_success() {
            StatusState::Success
        } else {
            StatusState::Failure
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StatusPayload {
    pub state: StatusState,
    pub context: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Attach `outcome` to `commit_id` on the host. Returns `Success` or
    /// `StatusReportError`; never aborts the caller.
    async fn report(
        &self,
        outcome: PipelineOutcome,
        repository: &str,
        commit_id: &str,
        context: &str,
        description: &str,
    ) -> PipelineOutcome;
}

/// Posts commit statuses to a GitHub-compatible REST API.
pub struct CommitStatusReporter {
    client: reqwest::Client,
    api_base: String,
    user_agent: String,
    public_url: Option<String>,
    credentials: BTreeMap<String, String>,
}

impl CommitStatusReporter {
    pub fn new(
        api_base: impl Into<String>,
        user_agent: impl Into<String>,
        public_url: Option<String>,
        credentials: BTreeMap<String, String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
            public_url: public_url.map(|u| u.trim_end_matches('/').to_string()),
            credentials,
        }
    }

    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(
            config.status.api_base.clone(),
            config.status.user_agent.clone(),
            config.server.public_url.clone(),
            config.credentials.clone(),
        )
    }

    fn credential(&self, repository: &str) -> Result<&str, CiError> {
        self.credentials
            .get(repository)
            .map(String::as_str)
            .ok_or_else(|| CiError::NoCredential(repository.to_string()))
    }

    pub async fn post_status(
        &self,
        repository: &str,
        commit_id: &str,
        payload: &StatusPayload,
    ) -> Result<(), CiError> {
        let token = self.credential(repository)?;
        let url = format!(
            "{}/repos/{}/statuses/{}",
            self.api_base, repository, commit_id
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", &self.user_agent)
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if status != reqwest::StatusCode::CREATED {
            let text = resp.text().await.unwrap_or_default();
            return Err(CiError::StatusReport(format!("{} {}", status, text.trim())));
        }
        Ok(())
    }
}

#[async_trait]
impl StatusReporter for CommitStatusReporter {
    async fn report(
        &self,
        outcome: PipelineOutcome,
        repository: &str,
        commit_id: &str,
        context: &str,
        description: &str,
    ) -> PipelineOutcome {
        let payload = StatusPayload {
            state: outcome.into(),
            context: context.to_string(),
            description: description.to_string(),
            target_url: self
                .public_url
                .as_ref()
                .map(|base| format!("{}/builds/{}", base, commit_id)),
        };

        match self.post_status(repository, commit_id, &payload).await {
            Ok(()) => {
                tracing::info!(repository, commit = commit_id, state = ?payload.state, "Commit status reported");
                PipelineOutcome::Success
            }
            Err(e) => {
                tracing::warn!(repository, commit = commit_id, "Commit status not reported: {}", e);
                PipelineOutcome::StatusReportError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Received {
        calls: Vec<(String, String, Option<String>, StatusPayload)>,
    }

    type Shared = Arc<Mutex<Received>>;

    async fn record_status(
        State(shared): State<(Shared, StatusCode)>,
        Path((owner, repo, sha)): Path<(String, String, String)>,
        headers: HeaderMap,
        Json(payload): Json<StatusPayload>,
    ) -> StatusCode {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        shared.0.lock().unwrap().calls.push((
            format!("{}/{}", owner, repo),
            sha,
            auth,
            payload,
        ));
        shared.1
    }

    async fn spawn_host(reply: StatusCode) -> (String, Shared) {
        let shared: Shared = Arc::default();
        let app = Router::new()
            .route("/repos/:owner/:repo/statuses/:sha", post(record_status))
            .with_state((Arc::clone(&shared), reply));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), shared)
    }

    fn test_reporter(api_base: &str, public_url: Option<&str>) -> CommitStatusReporter {
        let mut credentials = BTreeMap::new();
        credentials.insert("octo/widgets".to_string(), "secret-token".to_string());
        CommitStatusReporter::new(api_base, "hookci-test", public_url.map(str::to_string), credentials)
    }

    #[tokio::test]
    async fn test_created_response_is_success() {
        let (base, shared) = spawn_host(StatusCode::CREATED).await;
        let reporter = test_reporter(&base, Some("https://ci.example.org/"));

        let outcome = reporter
            .report(
                PipelineOutcome::BuildError,
                "octo/widgets",
                "abc123",
                "ci/hookci",
                PipelineOutcome::BuildError.description(),
            )
            .await;
        assert_eq!(outcome, PipelineOutcome::Success);

        let received = shared.lock().unwrap();
        assert_eq!(received.calls.len(), 1);
        let (repo, sha, auth, payload) = &received.calls[0];
        assert_eq!(repo, "octo/widgets");
        assert_eq!(sha, "abc123");
        assert_eq!(auth.as_deref(), Some("Bearer secret-token"));
        assert_eq!(payload.state, StatusState::Failure);
        assert_eq!(payload.context, "ci/hookci");
        assert_eq!(payload.description, "Build failed");
        assert_eq!(
            payload.target_url.as_deref(),
            Some("https://ci.example.org/builds/abc123")
        );
    }

    #[tokio::test]
    async fn test_non_created_response_is_an_error() {
        let (base, _shared) = spawn_host(StatusCode::NOT_FOUND).await;
        let reporter = test_reporter(&base, None);
        let outcome = reporter
            .report(PipelineOutcome::Success, "octo/widgets", "abc123", "ci", "ok")
            .await;
        assert_eq!(outcome, PipelineOutcome::StatusReportError);

        let (base, _shared) = spawn_host(StatusCode::OK).await;
        let reporter = test_reporter(&base, None);
        let outcome = reporter
            .report(PipelineOutcome::Success, "octo/widgets", "abc123", "ci", "ok")
            .await;
        assert_eq!(outcome, PipelineOutcome::StatusReportError);
    }

    #[tokio::test]
    async fn test_unknown_repository_makes_no_call() {
        let (base, shared) = spawn_host(StatusCode::CREATED).await;
        let reporter = test_reporter(&base, None);

        let outcome = reporter
            .report(PipelineOutcome::Success, "octo/other", "abc123", "ci", "ok")
            .await;
        assert_eq!(outcome, PipelineOutcome::StatusReportError);
        assert!(shared.lock().unwrap().calls.is_empty());

        let err = reporter.credential("octo/widgets-fork").unwrap_err();
        assert!(matches!(err, CiError::NoCredential(_)));
    }

    #[tokio::test]
    async fn test_transport_error_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let reporter = test_reporter(&format!("http://{}", addr), None);
        let outcome = reporter
            .report(PipelineOutcome::Success, "octo/widgets", "abc123", "ci", "ok")
            .await;
        assert_eq!(outcome, PipelineOutcome::StatusReportError);
    }

    #[test]
    fn test_no_tests_reports_success_state() {
        assert_eq!(StatusState::from(PipelineOutcome::NoTests), StatusState::Success);
        assert_eq!(StatusState::from(PipelineOutcome::TestError), StatusState::Failure);
        let json = serde_json::to_value(StatusPayload {
            state: StatusState::Success,
            context: "c".into(),
            description: "d".into(),
            target_url: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"state": "success", "context": "c", "description": "d"}));
    }
}
