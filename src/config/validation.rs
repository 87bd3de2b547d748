//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (deadline > 0, connection limit > 0)
//! - Check addresses parse before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroConnections,

    #[error("shutdown.deadline_ms must be greater than zero")]
    ZeroDeadline,

    #[error("shutdown.signals must name at least one signal")]
    NoSignals,

    #[error("worker.work_duration_ms ({work_ms}) exceeds worker.max_work_duration_ms ({max_ms})")]
    WorkExceedsMaximum { work_ms: u64, max_ms: u64 },

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }
    if config.shutdown.deadline_ms == 0 {
        errors.push(ValidationError::ZeroDeadline);
    }
    if config.shutdown.signals.is_empty() {
        errors.push(ValidationError::NoSignals);
    }
    if config.worker.work_duration_ms > config.worker.max_work_duration_ms {
        errors.push(ValidationError::WorkExceedsMaximum {
            work_ms: config.worker.work_duration_ms,
            max_ms: config.worker.max_work_duration_ms,
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
