//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): proxied calls by service, status
//! - `gateway_request_duration_seconds` (histogram): proxied call latency
//! - `gateway_breaker_transitions_total` (counter): by service, new state
//! - `gateway_backend_health` (gauge): 1=healthy, 0=unhealthy
//! - `gateway_events_published_total` (counter): by routing key
//! - `gateway_events_publish_failures_total` (counter): by routing key
//! - `gateway_events_consumed_total` (counter): by queue, outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::BreakerState;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(service: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_breaker_transition(service: &str, state: BreakerState) {
    counter!(
        "gateway_breaker_transitions_total",
        "service" => service.to_string(),
        "state" => state.as_str()
    )
    .increment(1);
}

pub fn record_backend_health(service: &str, healthy: bool) {
    gauge!("gateway_backend_health", "service" => service.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_event_published(routing_key: &str) {
    counter!("gateway_events_published_total", "routing_key" => routing_key.to_string()).increment(1);
}

pub fn record_publish_failure(routing_key: &str) {
    counter!("gateway_events_publish_failures_total", "routing_key" => routing_key.to_string())
        .increment(1);
}

pub fn record_consumed(queue: &str, acked: bool) {
    counter!(
        "gateway_events_consumed_total",
        "queue" => queue.to_string(),
        "outcome" => if acked { "ack" } else { "reject" }
    )
    .increment(1);
}
