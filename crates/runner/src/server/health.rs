//! Liveness endpoint.

use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "command-runner";

/// Body of a health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    /// RFC 3339 UTC time, second precision.
    pub timestamp: String,
    pub service: String,
}

impl HealthStatus {
    /// A healthy status stamped with the current time.
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            service: SERVICE_NAME.to_string(),
        }
    }
}

/// `GET /health`
pub async fn health_handler() -> Json<HealthStatus> {
    Json(HealthStatus::healthy())
}
