//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway and WebSocket relay metrics
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `proxy_http_requests_total` (counter): forwarded HTTP requests by method, status
//! - `proxy_http_request_duration_seconds` (histogram): HTTP forwarding latency
//! - `proxy_ws_sessions_total` (counter): relayed sessions started
//! - `proxy_ws_sessions_active` (gauge): sessions currently relaying
//! - `proxy_ws_frames_total` (counter): frames forwarded by direction
//! - `proxy_ws_closes_total` (counter): closes forwarded by direction, code
//! - `proxy_ws_dial_failures_total` (counter): upstream dials that failed
//! - `proxy_ws_session_duration_seconds` (histogram): session lifetime
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until a recorder is installed, so tests
//!   and embedders pay nothing unless they opt in

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const HTTP_REQUESTS_TOTAL: &str = "proxy_http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "proxy_http_request_duration_seconds";
pub const WS_SESSIONS_TOTAL: &str = "proxy_ws_sessions_total";
pub const WS_SESSIONS_ACTIVE: &str = "proxy_ws_sessions_active";
pub const WS_FRAMES_TOTAL: &str = "proxy_ws_frames_total";
pub const WS_CLOSES_TOTAL: &str = "proxy_ws_closes_total";
pub const WS_DIAL_FAILURES_TOTAL: &str = "proxy_ws_dial_failures_total";
pub const WS_SESSION_DURATION_SECONDS: &str = "proxy_ws_session_duration_seconds";

/// Install the global recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one forwarded HTTP request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
}

pub fn ws_session_opened() {
    counter!(WS_SESSIONS_TOTAL).increment(1);
    gauge!(WS_SESSIONS_ACTIVE).increment(1.0);
}

pub fn ws_session_closed(duration: Duration) {
    gauge!(WS_SESSIONS_ACTIVE).decrement(1.0);
    histogram!(WS_SESSION_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub fn ws_frame_forwarded(direction: &'static str) {
    counter!(WS_FRAMES_TOTAL, "direction" => direction).increment(1);
}

pub fn ws_close_forwarded(direction: &'static str, code: u16) {
    counter!(WS_CLOSES_TOTAL, "direction" => direction, "code" => code.to_string()).increment(1);
}

pub fn ws_dial_failed() {
    counter!(WS_DIAL_FAILURES_TOTAL).increment(1);
}
