//! Metrics collection and exposition.
//!
//! # Metrics
//! - `service_in_flight_workers` (gauge): workers currently running
//! - `service_work_total` (counter): finished work by outcome
//! - `service_work_duration_seconds` (histogram): worker latency
//! - `service_refused_work_total` (counter): requests refused while stopping
//! - `service_drain_duration_seconds` (histogram): time spent in `stop`
//! - `service_shutdown_timeouts_total` (counter): drains that hit the deadline
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - The Prometheus exporter is opt-in via configuration

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn set_in_flight(count: u64) {
    gauge!("service_in_flight_workers").set(count as f64);
}

pub fn record_work(outcome: &'static str, duration: Duration) {
    counter!("service_work_total", "outcome" => outcome).increment(1);
    if outcome == "completed" {
        histogram!("service_work_duration_seconds").record(duration.as_secs_f64());
    }
}

pub fn record_refused_work() {
    counter!("service_refused_work_total").increment(1);
}

pub fn record_drain(duration: Duration, timed_out: bool) {
    histogram!("service_drain_duration_seconds").record(duration.as_secs_f64());
    if timed_out {
        counter!("service_shutdown_timeouts_total").increment(1);
    }
}
