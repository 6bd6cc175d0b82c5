//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pipeline_requests_total` (counter): completed traced requests by method, status
//! - `pipeline_request_duration_seconds` (histogram): latency distribution by method
//! - `pipeline_rate_limited_total` (counter): refused requests by reason
//!
//! # Design Decisions
//! - Updates go through the `metrics` facade; without an installed recorder
//!   they are no-ops, so tests need no setup
//! - Prometheus exposition is optional and runs on its own listener

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    counter!(
        "pipeline_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("pipeline_request_duration_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

/// Record a request refused by the rate limiter.
pub fn record_rate_limited(reason: &'static str) {
    counter!("pipeline_rate_limited_total", "reason" => reason).increment(1);
}
