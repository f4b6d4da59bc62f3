//! `/health` endpoint.

use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Time of the check (RFC 3339).
    pub timestamp: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}
