//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define interceptor metrics (captures, drops, observers, backend, tunnel)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `interceptor_captures_total` (counter): exchanges pushed to the capture queue
//! - `interceptor_captures_dropped_total` (counter): captures lost to overflow or capture failure
//! - `interceptor_observers` (gauge): connected observers
//! - `interceptor_backend_up` (gauge): 1=reachable, 0=unreachable
//! - `interceptor_tunnel_sessions_total` (counter): tunnel sessions by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Low-overhead metric updates (atomic operations)

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_capture(status: u16) {
    counter!("interceptor_captures_total", "status" => status.to_string()).increment(1);
}

pub fn record_captures_dropped(reason: &'static str, count: u64) {
    counter!("interceptor_captures_dropped_total", "reason" => reason).increment(count);
}

pub fn set_observers(count: usize) {
    gauge!("interceptor_observers").set(count as f64);
}

pub fn record_backend_health(port: u16, up: bool) {
    gauge!("interceptor_backend_up", "port" => port.to_string()).set(if up { 1.0 } else { 0.0 });
}

pub fn record_tunnel_session(outcome: &'static str) {
    counter!("interceptor_tunnel_sessions_total", "outcome" => outcome).increment(1);
}
