//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define dispatch metrics (requests, latency, rejections, panics, restarts)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `switchyard_requests_total` (counter): completed requests by status
//! - `switchyard_request_duration_seconds` (histogram): latency distribution
//! - `switchyard_rate_limited_total` (counter): admission rejections by scope
//! - `switchyard_handler_panics_total` (counter): recovered handler panics
//! - `switchyard_restarts_total` (counter): restart attempts by outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// A request finished with `status`.
pub fn record_request(status: u16, start: Instant) {
    counter!("switchyard_requests_total", "status" => status.to_string()).increment(1);
    histogram!("switchyard_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Admission turned a request away.
pub fn record_rate_limited(scope: &'static str) {
    counter!("switchyard_rate_limited_total", "scope" => scope).increment(1);
}

/// A handler panic was contained.
pub fn record_handler_panic() {
    counter!("switchyard_handler_panics_total").increment(1);
}

/// A restart was attempted; `outcome` is `spawned` or `failed`.
pub fn record_restart(outcome: &'static str) {
    counter!("switchyard_restarts_total", "outcome" => outcome).increment(1);
}
