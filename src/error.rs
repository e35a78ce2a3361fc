use thiserror::Error;

#[derive(Error, Debug)]
pub enum CiError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Status report failed: {0}")]
    StatusReport(String),

    #[error("No credential configured for repository '{0}'")]
    NoCredential(String),

    #[error("Persist error: {0}")]
    Persist(String),

    #[error("Build for commit '{0}' already recorded")]
    DuplicateCommit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<serde_json::Error> for CiError {
    fn from(e: serde_json::Error) -> Self {
        CiError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for CiError {
    fn from(e: toml::de::Error) -> Self {
        CiError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for CiError {
    fn from(e: reqwest::Error) -> Self {
        CiError::Http(e.to_string())
    }
}

impl From<rusqlite::Error> for CiError {
    fn from(e: rusqlite::Error) -> Self {
        CiError::Persist(e.to_string())
    }
}
