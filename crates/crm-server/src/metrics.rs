//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Call once at startup before
/// any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render the Prometheus text exposition.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket sessions admitted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions ended (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Sessions kicked by a newer login (counter).
pub const WS_SESSIONS_SUPERSEDED_TOTAL: &str = "ws_sessions_superseded_total";
/// Failed targeted or fan-out writes (counter, labels: reason).
pub const WS_DELIVERY_FAILURES_TOTAL: &str = "ws_delivery_failures_total";
/// Session lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Messages persisted (counter, labels: scene).
pub const IM_MESSAGES_TOTAL: &str = "im_messages_total";
/// Messages rejected after validation (counter, labels: reason).
pub const IM_ERRORS_TOTAL: &str = "im_errors_total";
/// Dashboard boards broadcast (counter, labels: board).
pub const DASHBOARD_PUSHES_TOTAL: &str = "dashboard_pushes_total";
