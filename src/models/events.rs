use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::CiError;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Raw push notification, only the fields the pipeline reads.
#[derive(Debug, Serialize, Deserialize)]
pub struct GitHubPushEvent {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub repository: Option<GitHubRepository>,
    pub head_commit: Option<GitHubCommit>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub url: Option<String>,
}

impl GitHubPushEvent {
    pub fn branch(&self) -> Option<&str> {
        self.git_ref
            .as_deref()
            .and_then(|r| r.strip_prefix(BRANCH_REF_PREFIX))
            .filter(|b| !b.is_empty())
    }
}

/// A validated push event, owned by the pipeline run it triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub repository_url: String,
    pub branch_name: String,
    pub commit_id: String,
    pub received_at: DateTime<Utc>,
}

fn commit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/commit/([0-9a-fA-F]+)(?:[/?#]|$)").expect("commit pattern is valid")
    })
}

/// Pull the hexadecimal hash out of a `.../commit/<sha>` URL
pub fn extract_commit_id(url: &str) -> Option<&str> {
    commit_pattern()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, CiError> {
        Self::parse_at(body, Utc::now())
    }

    pub fn parse_at(body: &[u8], received_at: DateTime<Utc>) -> Result<Self, CiError> {
        let raw: GitHubPushEvent = serde_json::from_slice(body)
            .map_err(|e| CiError::MalformedPayload(format!("invalid JSON: {}", e)))?;

        let git_ref = raw
            .git_ref
            .as_deref()
            .ok_or_else(|| CiError::MalformedPayload("missing 'ref'".into()))?;
        let branch_name = raw.branch().ok_or_else(|| {
            CiError::MalformedPayload(format!("'{}' is not a branch ref", git_ref))
        })?;

        let repository_url = raw
            .repository
            .as_ref()
            .and_then(|r| r.url.as_deref())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CiError::MalformedPayload("missing 'repository.url'".into()))?;

        let commit_url = raw
            .head_commit
            .as_ref()
            .and_then(|c| c.url.as_deref())
            .ok_or_else(|| CiError::MalformedPayload("missing 'head_commit.url'".into()))?;
        let commit_id = extract_commit_id(commit_url).ok_or_else(|| {
            CiError::MalformedPayload(format!("no commit hash in '{}'", commit_url))
        })?;

        Ok(Self {
            repository_url: repository_url.to_string(),
            branch_name: branch_name.to_string(),
            commit_id: commit_id.to_string(),
            received_at,
        })
    }

    /// The receipt time as stored in the history table
    pub fn build_timestamp(&self) -> String {
        crate::utils::format_timestamp(&self.received_at)
    }

    pub fn repository_identifier(&self) -> Option<String> {
        crate::utils::repo_identifier(&self.repository_url)
    }

    pub fn short_commit(&self) -> &str {
        &self.commit_id[..7.min(self.commit_id.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn payload(git_ref: Option<&str>, repo: Option<&str>, commit: Option<&str>) -> Vec<u8> {
        let mut obj = serde_json::Map::new();
        if let Some(r) = git_ref {
            obj.insert("ref".into(), r.into());
        }
        if let Some(u) = repo {
            obj.insert("repository".into(), serde_json::json!({ "url": u }));
        }
        if let Some(c) = commit {
            obj.insert("head_commit".into(), serde_json::json!({ "url": c }));
        }
        serde_json::to_vec(&obj).unwrap()
    }

    #[test]
    fn test_parse_well_formed_payload() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        let body = payload(
            Some("refs/heads/main"),
            Some("https://example/repo"),
            Some("https://example/repo/commit/abc123"),
        );
        let event = WebhookEvent::parse_at(&body, at).unwrap();
        assert_eq!(event.branch_name, "main");
        assert_eq!(event.repository_url, "https://example/repo");
        assert_eq!(event.commit_id, "abc123");
        assert_eq!(event.received_at, at);
        assert_eq!(event.build_timestamp(), "2024-01-01 12:30:00");
    }

    #[test]
    fn test_parse_keeps_nested_branch_names() {
        let body = payload(
            Some("refs/heads/feature/login"),
            Some("https://github.com/octo/widgets"),
            Some("https://github.com/octo/widgets/commit/0123456789abcdefABCDEF0123456789abcdef01"),
        );
        let event = WebhookEvent::parse(&body).unwrap();
        assert_eq!(event.branch_name, "feature/login");
        assert_eq!(event.commit_id, "0123456789abcdefABCDEF0123456789abcdef01");
        assert_eq!(event.repository_identifier().as_deref(), Some("octo/widgets"));
        assert_eq!(event.short_commit(), "0123456");
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let cases = [
            payload(None, Some("https://example/repo"), Some("https://example/repo/commit/abc")),
            payload(Some("refs/heads/main"), None, Some("https://example/repo/commit/abc")),
            payload(Some("refs/heads/main"), Some("https://example/repo"), None),
        ];
        for body in cases {
            let err = WebhookEvent::parse(&body).unwrap_err();
            assert!(matches!(err, CiError::MalformedPayload(_)), "got {:?}", err);
        }
    }

    #[test]
    fn test_parse_rejects_null_head_commit() {
        let body = br#"{"ref":"refs/heads/main","repository":{"url":"https://x/y"},"head_commit":null}"#;
        assert!(matches!(
            WebhookEvent::parse(body),
            Err(CiError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            WebhookEvent::parse(b"This is not a JSON string."),
            Err(CiError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_parse_rejects_tag_refs() {
        let body = payload(
            Some("refs/tags/v1.0"),
            Some("https://example/repo"),
            Some("https://example/repo/commit/abc123"),
        );
        assert!(matches!(
            WebhookEvent::parse(&body),
            Err(CiError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_parse_rejects_url_without_hash() {
        for url in [
            "https://example/repo/tree/main",
            "https://example/repo/commit/",
            "https://example/repo/commit/xyz",
        ] {
            let body = payload(Some("refs/heads/main"), Some("https://example/repo"), Some(url));
            assert!(
                matches!(WebhookEvent::parse(&body), Err(CiError::MalformedPayload(_))),
                "accepted {}",
                url
            );
        }
    }

    #[test]
    fn test_extract_commit_id_stops_at_path_boundary() {
        assert_eq!(
            extract_commit_id("https://h/o/r/commit/deadbeef/files?x=1"),
            Some("deadbeef")
        );
        assert_eq!(extract_commit_id("https://h/o/r/commit/deadbeef#L1"), Some("deadbeef"));
    }
}
