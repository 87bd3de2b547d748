//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::lifecycle::signals::TerminationSignal;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Shutdown sequencing (deadline, signals, timeout policy).
    pub shutdown: ShutdownConfig,

    /// The external database dependency.
    pub database: DatabaseConfig,

    /// Request worker settings.
    pub worker: WorkerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// What happens to workers still running when the drain deadline elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StragglerPolicy {
    /// Leave connections running to completion; their results are discarded.
    #[default]
    Detach,
    /// Drop the remaining connections at the transport level.
    Abandon,
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Bound on the drain wait in milliseconds.
    pub deadline_ms: u64,

    /// Signals treated as a termination request.
    pub signals: Vec<TerminationSignal>,

    /// Fate of workers still in flight after the deadline.
    pub on_timeout: StragglerPolicy,

    /// Exit with a failure status when the drain timed out.
    pub fail_on_timeout: bool,
}

impl ShutdownConfig {
    /// The drain deadline as a [`Duration`].
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 5_000,
            signals: vec![TerminationSignal::Interrupt, TerminationSignal::Terminate],
            on_timeout: StragglerPolicy::Detach,
            fail_on_timeout: false,
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Name used in logs.
    pub name: String,

    /// Optional TCP address probed and held open while connected.
    pub address: Option<String>,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Simulated latency of establishing the connection.
    pub connect_latency_ms: u64,

    /// Simulated latency of tearing the connection down.
    pub close_latency_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "primary".to_string(),
            address: None,
            connect_timeout_ms: 5_000,
            connect_latency_ms: 500,
            close_latency_ms: 500,
        }
    }
}

/// Request worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Processing time of the default worker in milliseconds.
    pub work_duration_ms: u64,

    /// Upper bound on any requested work duration in milliseconds.
    pub max_work_duration_ms: u64,
}

impl WorkerConfig {
    pub fn work_duration(&self) -> Duration {
        Duration::from_millis(self.work_duration_ms)
    }

    pub fn max_work_duration(&self) -> Duration {
        Duration::from_millis(self.max_work_duration_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_duration_ms: 2_000,
            max_work_duration_ms: 30_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level directive used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Pretty output for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_service() {
        let config = ServiceConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.shutdown.deadline(), Duration::from_secs(5));
        assert_eq!(
            config.shutdown.signals,
            vec![TerminationSignal::Interrupt, TerminationSignal::Terminate]
        );
        assert_eq!(config.shutdown.on_timeout, StragglerPolicy::Detach);
        assert!(!config.shutdown.fail_on_timeout);
        assert_eq!(config.worker.work_duration(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [shutdown]
            deadline_ms = 1000
            on_timeout = "abandon"
            signals = ["terminate"]
            "#,
        )
        .unwrap();

        assert_eq!(config.shutdown.deadline_ms, 1000);
        assert_eq!(config.shutdown.on_timeout, StragglerPolicy::Abandon);
        assert_eq!(config.shutdown.signals, vec![TerminationSignal::Terminate]);
        assert_eq!(config.listener.max_connections, 10_000);
        assert_eq!(config.database.name, "primary");
    }
}
