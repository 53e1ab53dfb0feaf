//! Metrics collection and exposition.
//!
//! # Metrics
//! - `accel_proxy_requests_total` (counter): requests by method, status, route
//! - `accel_proxy_request_duration_seconds` (histogram): latency distribution
//! - `accel_proxy_queue_*`: admission queue configuration, occupancy,
//!   waiting time and rejections, labelled by `queue_name`
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until a recorder is installed, so
//!   library code and tests record unconditionally
//! - Prometheus exposition runs on its own listener

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    counter!("accel_proxy_requests_total", &labels).increment(1);
    histogram!("accel_proxy_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

/// Publish a queue's static configuration.
pub fn record_queue_config(name: &str, limit: usize, queue_limit: usize, timeout: Duration) {
    let labels = [("queue_name", name.to_string())];
    gauge!("accel_proxy_queue_limit", &labels).set(limit as f64);
    gauge!("accel_proxy_queue_queue_limit", &labels).set(queue_limit as f64);
    gauge!("accel_proxy_queue_timeout_seconds", &labels).set(timeout.as_secs_f64());
}

/// Publish a queue's live occupancy.
pub fn record_queue_occupancy(name: &str, busy: usize, waiting: usize) {
    let labels = [("queue_name", name.to_string())];
    gauge!("accel_proxy_queue_busy", &labels).set(busy as f64);
    gauge!("accel_proxy_queue_waiting", &labels).set(waiting as f64);
}

/// Record how long an admitted request waited for a busy slot.
pub fn record_queue_wait(name: &str, waited: Duration) {
    histogram!("accel_proxy_queue_waiting_time_seconds", "queue_name" => name.to_string())
        .record(waited.as_secs_f64());
}

/// Record a queue rejection (`too_many_requests` or `queueing_timedout`).
pub fn record_queue_error(name: &str, reason: &'static str) {
    counter!(
        "accel_proxy_queue_errors_total",
        "queue_name" => name.to_string(),
        "reason" => reason
    )
    .increment(1);
}
