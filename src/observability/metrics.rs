//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_selections_total` (counter): selections by algorithm, outcome
//! - `balancer_sticky_lookups_total` (counter): hit, miss, stale or error
//! - `balancer_failovers_total` (counter): retry, exhausted or deadline
//! - `balancer_health_transitions_total` (counter): by target status
//! - `balancer_servers`, `balancer_healthy_servers` (gauges)
//! - `balancer_server_healthy` (gauge): 1=healthy, 0=otherwise, per server
//! - `balancer_server_response_time_ms` (gauge): last probe latency, per server

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_selection(algorithm: &'static str, outcome: &'static str) {
    metrics::counter!("balancer_selections_total", "algorithm" => algorithm, "outcome" => outcome)
        .increment(1);
}

pub fn record_sticky_lookup(result: &'static str) {
    metrics::counter!("balancer_sticky_lookups_total", "result" => result).increment(1);
}

pub fn record_failover(outcome: &'static str) {
    metrics::counter!("balancer_failovers_total", "outcome" => outcome).increment(1);
}

pub fn record_health_transition(to: &'static str) {
    metrics::counter!("balancer_health_transitions_total", "to" => to).increment(1);
}

pub fn record_server_counts(total: usize, healthy: usize) {
    metrics::gauge!("balancer_servers").set(total as f64);
    metrics::gauge!("balancer_healthy_servers").set(healthy as f64);
}

pub fn record_server_health(server: &str, healthy: bool, response_time_ms: u64) {
    let server = server.to_string();
    metrics::gauge!("balancer_server_healthy", "server" => server.clone())
        .set(if healthy { 1.0 } else { 0.0 });
    metrics::gauge!("balancer_server_response_time_ms", "server" => server)
        .set(response_time_ms as f64);
}
