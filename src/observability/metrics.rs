//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cold_serve_requests_total` (counter): dispatched requests by method, status
//! - `cold_serve_request_duration_seconds` (histogram): dispatch latency
//! - `cold_serve_active_connections` (gauge): open connections across listeners
//! - `cold_serve_handler_failures_total` (counter): failures by kind
//!
//! Recording before `init_metrics` is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> bool {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            tracing::info!(address = %addr, "Metrics endpoint listening");
            true
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
            false
        }
    }
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    counter!(
        "cold_serve_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("cold_serve_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_failure(kind: &str) {
    counter!("cold_serve_handler_failures_total", "kind" => kind.to_string()).increment(1);
}

pub fn connection_opened() {
    gauge!("cold_serve_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("cold_serve_active_connections").decrement(1.0);
}
