//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded; a second call
/// fails because a global recorder is already set.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

fn describe() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(WS_CONNECTIONS_TOTAL, "WebSocket connections accepted");
    describe_counter!(WS_DISCONNECTIONS_TOTAL, "WebSocket connections torn down");
    describe_gauge!(WS_CONNECTIONS_ACTIVE, "Currently registered WebSocket connections");
    describe_counter!(WS_MESSAGES_DROPPED_TOTAL, "Outbound messages dropped on a full queue");
    describe_counter!(WS_FRAMES_RECEIVED_TOTAL, "Inbound frames by message type");
    describe_counter!(WS_AUTH_FAILURES_TOTAL, "Rejected authentication attempts");
    describe_histogram!(WS_CONNECTION_DURATION_SECONDS, "Lifetime of WebSocket connections");
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Outbound messages dropped total (counter).
pub const WS_MESSAGES_DROPPED_TOTAL: &str = "ws_messages_dropped_total";
/// Inbound frames total (counter, labels: type).
pub const WS_FRAMES_RECEIVED_TOTAL: &str = "ws_frames_received_total";
/// Authentication failures total (counter).
pub const WS_AUTH_FAILURES_TOTAL: &str = "ws_auth_failures_total";
/// Connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
