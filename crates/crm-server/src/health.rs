//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Hub version.
    pub version: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket transports, including ones still tearing down.
    pub connections: usize,
    /// Users with a live session binding.
    pub online_users: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, online_users: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        version: crm_core::constants::VERSION,
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        online_users,
    }
}
