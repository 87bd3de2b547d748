//! Request workers.
//!
//! # Responsibilities
//! - Handle one unit of inbound work per request
//! - Take a bounded amount of time doing it
//! - Report failures to the caller without affecting the server
//!
//! # Design Decisions
//! - Workers are unaware of shutdown; there is no cancellation point inside
//!   the work itself
//! - Durations are bounded by configuration; larger requests are rejected

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::WorkerConfig;
use crate::observability::metrics;

/// Failure of a single unit of work.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Requested duration exceeds the configured bound.
    #[error("requested work of {requested:?} exceeds the maximum of {max:?}")]
    DurationTooLong { requested: Duration, max: Duration },
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Worker failed");
        metrics::record_work("failed", Duration::ZERO);
        let status = match self {
            HandlerError::DurationTooLong { .. } => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Build the default worker routes.
pub fn routes(config: WorkerConfig) -> Router {
    Router::new()
        .route("/", get(default_work))
        .route("/work/{millis}", get(timed_work))
        .with_state(config)
}

async fn default_work(
    State(config): State<WorkerConfig>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    uri: Uri,
) -> String {
    tracing::info!(remote = %remote, path = %uri.path(), "Worker received request");
    perform(config.work_duration()).await;
    "Hello from the server! Request processed.\n".to_string()
}

async fn timed_work(
    State(config): State<WorkerConfig>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Path(millis): Path<u64>,
) -> Result<String, HandlerError> {
    let requested = Duration::from_millis(millis);
    let max = config.max_work_duration();
    if requested > max {
        return Err(HandlerError::DurationTooLong { requested, max });
    }

    tracing::info!(remote = %remote, duration_ms = millis, "Worker received timed request");
    perform(requested).await;
    Ok(format!("Processed {millis} ms of work.\n"))
}

/// The unit of work itself.
async fn perform(duration: Duration) {
    let start = Instant::now();
    tokio::time::sleep(duration).await;
    metrics::record_work("completed", start.elapsed());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_maps_to_bad_request() {
        let err = HandlerError::DurationTooLong {
            requested: Duration::from_secs(60),
            max: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("exceeds the maximum"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
