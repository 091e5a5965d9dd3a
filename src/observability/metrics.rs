//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): time to response head
//! - `gateway_pool_acquire_wait_seconds` (histogram): time waiting for a pool permit
//! - `gateway_pool_in_use` / `gateway_pool_idle` (gauges): per-endpoint pool occupancy
//! - `gateway_connections_opened_total` (counter): backend connects per endpoint
//! - `gateway_connections_discarded_total` (counter): closed connections by reason
//! - `gateway_endpoint_health` (gauge): 1=live, 0=dead
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed recorder it is a no-op
//! - The Prometheus exporter is only installed when enabled in config

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_acquire_wait(endpoint: &str, waited: Duration) {
    metrics::histogram!("gateway_pool_acquire_wait_seconds", "endpoint" => endpoint.to_string())
        .record(waited.as_secs_f64());
}

pub fn record_pool_occupancy(endpoint: &str, in_use: usize, idle: usize) {
    metrics::gauge!("gateway_pool_in_use", "endpoint" => endpoint.to_string()).set(in_use as f64);
    metrics::gauge!("gateway_pool_idle", "endpoint" => endpoint.to_string()).set(idle as f64);
}

pub fn record_connection_opened(endpoint: &str) {
    metrics::counter!("gateway_connections_opened_total", "endpoint" => endpoint.to_string())
        .increment(1);
}

pub fn record_connection_discarded(endpoint: &str, reason: &'static str) {
    metrics::counter!(
        "gateway_connections_discarded_total",
        "endpoint" => endpoint.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_endpoint_health(endpoint: &str, live: bool) {
    metrics::gauge!("gateway_endpoint_health", "endpoint" => endpoint.to_string())
        .set(if live { 1.0 } else { 0.0 });
}
