use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::paths;
use crate::error::CiError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GlobalConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub status: StatusConfig,
    /// Repository identifier (`owner/name`) to bearer token.
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Externally reachable base URL, used to link commit statuses back to
    /// the build detail endpoint.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            webhook_path: default_webhook_path(),
            log_level: default_log_level(),
            queue_capacity: default_queue_capacity(),
            public_url: None,
        }
    }
}

fn default_port() -> u16 {
    8029
}

fn default_webhook_path() -> String {
    "/".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_capacity() -> usize {
    16
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_clone_command")]
    pub clone_command: Vec<String>,
    #[serde(default = "default_build_command")]
    pub build_command: Vec<String>,
    #[serde(default = "default_test_command")]
    pub test_command: Vec<String>,
    #[serde(default = "default_test_source_dir")]
    pub test_source_dir: PathBuf,
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_secs: u64,
    #[serde(default = "default_stage_timeout")]
    pub build_timeout_secs: u64,
    #[serde(default = "default_stage_timeout")]
    pub test_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            clone_command: default_clone_command(),
            build_command: default_build_command(),
            test_command: default_test_command(),
            test_source_dir: default_test_source_dir(),
            clone_timeout_secs: default_clone_timeout(),
            build_timeout_secs: default_stage_timeout(),
            test_timeout_secs: default_stage_timeout(),
        }
    }
}

impl PipelineConfig {
    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }
}

fn default_work_dir() -> PathBuf {
    paths::work_dir()
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn default_clone_command() -> Vec<String> {
    argv(&[
        "git",
        "clone",
        "--branch",
        "{branch}",
        "--single-branch",
        "--depth",
        "1",
        "{repo}",
        "{dir}",
    ])
}

fn default_build_command() -> Vec<String> {
    argv(&["./gradlew", "build", "testClasses", "-x", "test"])
}

fn default_test_command() -> Vec<String> {
    argv(&["./gradlew", "test"])
}

fn default_test_source_dir() -> PathBuf {
    PathBuf::from("src/test")
}

fn default_clone_timeout() -> u64 {
    300
}

fn default_stage_timeout() -> u64 {
    1800
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    paths::database_path()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_context")]
    pub context: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            context: default_context(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_context() -> String {
    "ci/hookci".to_string()
}

fn default_user_agent() -> String {
    "hookci".to_string()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pipeline: PipelineConfig::default(),
            database: DatabaseConfig::default(),
            status: StatusConfig::default(),
            credentials: BTreeMap::new(),
        }
    }
}

impl GlobalConfig {
    /// Load from `path`, or from the default location when `None`. A missing
    /// file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, CiError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(paths::global_config_path);
        let config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            GlobalConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CiError> {
        if self.pipeline.work_dir.as_os_str().is_empty() {
            return Err(CiError::Config("pipeline.work_dir must not be empty".into()));
        }
        for (name, cmd) in [
            ("clone_command", &self.pipeline.clone_command),
            ("build_command", &self.pipeline.build_command),
            ("test_command", &self.pipeline.test_command),
        ] {
            if cmd.is_empty() || cmd[0].is_empty() {
                return Err(CiError::Config(format!("pipeline.{} must not be empty", name)));
            }
        }
        if self.server.queue_capacity == 0 {
            return Err(CiError::Config(
                "server.queue_capacity must be at least 1".into(),
            ));
        }
        if !self.server.webhook_path.starts_with('/') {
            return Err(CiError::Config(
                "server.webhook_path must start with '/'".into(),
            ));
        }
        let hook = self.server.webhook_path.trim_end_matches('/');
        if hook == "/builds" || hook.starts_with("/builds/") || hook.starts_with("/api/") {
            return Err(CiError::Config(format!(
                "server.webhook_path '{}' collides with a query route",
                self.server.webhook_path
            )));
        }
        Ok(())
    }
}
