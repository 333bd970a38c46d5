//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): inbound requests by verdict
//! - `relay_hops_total` (counter): hops by outcome
//! - `relay_hop_duration_seconds` (histogram): hop latency, retries included
//! - `relay_error_reports_total` (counter): reports by send result
//!
//! Recording is a no-op until an exporter is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_verdict(verdict: &'static str) {
    ::metrics::counter!("relay_requests_total", "verdict" => verdict).increment(1);
}

pub fn record_hop(outcome: &'static str, start: Instant) {
    ::metrics::counter!("relay_hops_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("relay_hop_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_report(result: &'static str) {
    ::metrics::counter!("relay_error_reports_total", "result" => result).increment(1);
}
