//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): requests by downstream protocol, status
//! - `bridge_request_duration_seconds` (histogram): client-visible latency
//! - `bridge_span_reports_total` (counter): report outcomes (sent, failed, unsampled)
//! - `bridge_span_relay_total` (counter): relayed spans by transport, outcome
//! - `bridge_cpu_usage_percent` (gauge): process CPU, percent of one core
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(protocol: &'static str, status: u16, start: Instant) {
    counter!(
        "bridge_requests_total",
        "protocol" => protocol,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("bridge_request_duration_seconds", "protocol" => protocol)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_span_report(outcome: &'static str) {
    counter!("bridge_span_reports_total", "outcome" => outcome).increment(1);
}

pub fn record_span_relay(transport: &'static str, outcome: &'static str) {
    counter!(
        "bridge_span_relay_total",
        "transport" => transport,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_cpu_usage(service: &str, percent: f64) {
    gauge!("bridge_cpu_usage_percent", "service" => service.to_string()).set(percent);
}
