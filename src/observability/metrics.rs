//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): completed requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_sampled_requests_total` (counter): requests selected by the tap
//! - `gateway_held_bytes_total` (counter): bytes released from deferred holds
//!
//! Exposition is a Prometheus scrape endpoint on its own listener.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter. Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "failed to install metrics exporter"),
    }
}

/// Record one completed request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}

/// Record a request selected for body observation.
pub fn record_sampled() {
    metrics::counter!("gateway_sampled_requests_total").increment(1);
}

/// Record a deferred-hold flush.
pub fn record_held_release(bytes: usize) {
    metrics::counter!("gateway_held_bytes_total").increment(bytes as u64);
}
