//! Metrics collection and exposition.
//!
//! # Metrics
//! - `auth_proxy_requests_total` (counter): proxied requests by method, status
//! - `auth_proxy_request_duration_seconds` (histogram): proxied request latency
//! - `auth_proxy_validations_total` (counter): credential validations by outcome
//! - `auth_proxy_probes_total` (counter): backend challenge probes by scheme
//! - `auth_proxy_clients_built_total` (counter): authenticated clients by digest priming
//! - `auth_proxy_bound_sessions` (gauge): sessions holding a bound client

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "auth_proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("auth_proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_validation(outcome: &'static str) {
    counter!("auth_proxy_validations_total", "outcome" => outcome).increment(1);
}

pub fn record_probe(scheme: &str) {
    counter!("auth_proxy_probes_total", "scheme" => scheme.to_ascii_lowercase()).increment(1);
}

pub fn record_client_built(digest_primed: bool) {
    let primed = if digest_primed { "true" } else { "false" };
    counter!("auth_proxy_clients_built_total", "digest_primed" => primed).increment(1);
}

pub fn record_bound_sessions(count: usize) {
    gauge!("auth_proxy_bound_sessions").set(count as f64);
}
