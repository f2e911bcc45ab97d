//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dappchain_rpc_requests_total` (counter): RPC requests by transport, method, outcome
//! - `dappchain_rpc_duration_seconds` (histogram): RPC round-trip latency
//! - `dappchain_tx_submitted_total` (counter): transactions by outcome
//! - `dappchain_events_received_total` (counter): pushed events by decoded name

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one RPC round trip.
pub fn record_rpc(transport: &str, method: &str, outcome: &'static str, start: Instant) {
    metrics::counter!(
        "dappchain_rpc_requests_total",
        "transport" => transport.to_string(),
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(
        "dappchain_rpc_duration_seconds",
        "transport" => transport.to_string(),
        "method" => method.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record the outcome of a transaction submission.
pub fn record_tx(outcome: &'static str) {
    metrics::counter!("dappchain_tx_submitted_total", "outcome" => outcome).increment(1);
}

/// Record an event pushed by a subscription.
pub fn record_event(event_name: Option<&str>) {
    let name = event_name.unwrap_or("unknown").to_string();
    metrics::counter!("dappchain_events_received_total", "event" => name).increment(1);
}

/// Record a pushed event that could not be parsed.
pub fn record_event_error() {
    metrics::counter!("dappchain_events_malformed_total").increment(1);
}
