use serde::{Deserialize, Serialize};

use crate::models::build::BuildRecord;

// ---- Responses ----

#[derive(Debug, Serialize, Deserialize)]
pub struct QueuedResponse {
    pub commit_id: String,
    pub branch: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BuildListResponse {
    pub builds: Vec<BuildRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub queued: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
