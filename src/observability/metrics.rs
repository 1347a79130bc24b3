//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, cache hit/miss, upstream errors)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): total requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_cache_lookups_total` (counter): lookups by result (hit, miss)
//! - `proxy_cache_stores_total` (counter): responses written to the cache
//! - `proxy_cache_entries` (gauge): entries currently held
//! - `proxy_cache_evictions_total` (counter): entries removed after expiry
//! - `proxy_cache_codec_errors_total` (counter): encode/decode failures by op
//! - `proxy_upstream_errors_total` (counter): failed outbound fetches
//! - `proxy_rejected_targets_total` (counter): requests forwarded without a valid `__host`
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("proxy_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_store() {
    metrics::counter!("proxy_cache_stores_total").increment(1);
}

pub fn record_cache_entries(count: usize) {
    metrics::gauge!("proxy_cache_entries").set(count as f64);
}

pub fn record_cache_evictions(count: usize) {
    metrics::counter!("proxy_cache_evictions_total").increment(count as u64);
}

pub fn record_codec_error(op: &'static str) {
    metrics::counter!("proxy_cache_codec_errors_total", "op" => op).increment(1);
}

pub fn record_upstream_error() {
    metrics::counter!("proxy_upstream_errors_total").increment(1);
}

pub fn record_rejected_target(reason: &'static str) {
    metrics::counter!("proxy_rejected_targets_total", "reason" => reason).increment(1);
}
