//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): requests by method, route, status
//! - `gate_request_duration_seconds` (histogram): latency distribution
//! - `gate_rejections_total` (counter): admission rejections by guard, reason
//! - `gate_notes_total` (gauge): notes held by this instance
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until a recorder is installed
//! - Prometheus exporter runs on its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("gate_requests_total", &labels).increment(1);
    metrics::histogram!("gate_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(guard: &'static str, reason: &'static str) {
    metrics::counter!("gate_rejections_total", "guard" => guard, "reason" => reason).increment(1);
}

pub fn record_note_count(count: usize) {
    metrics::gauge!("gate_notes_total").set(count as f64);
}
