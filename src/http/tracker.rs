//! In-flight worker tracking.
//!
//! # Responsibilities
//! - Count workers from admission to response
//! - Refuse admission once the server starts stopping
//! - Let `stop` wait for the count to reach zero
//!
//! # Design Decisions
//! - Count and closed flag live in one watch channel, so admission and
//!   closing are atomic with respect to each other
//! - RAII guard decrements on drop, including when a connection is abandoned

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::observability::metrics;

/// Global atomic counter for work IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static WORK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkId(u64);

impl WorkId {
    fn next() -> Self {
        Self(WORK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Load {
    in_flight: u64,
    closed: bool,
}

/// Tracks in-flight workers for graceful shutdown.
#[derive(Debug, Clone)]
pub struct WorkTracker {
    load: Arc<watch::Sender<Load>>,
}

impl WorkTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Load::default());
        Self { load: Arc::new(tx) }
    }

    /// Admit a new worker. Returns `None` once the tracker is closed.
    pub fn try_track(&self) -> Option<WorkGuard> {
        let mut admitted = false;
        self.load.send_if_modified(|load| {
            if load.closed {
                return false;
            }
            load.in_flight += 1;
            admitted = true;
            true
        });
        if !admitted {
            return None;
        }

        let guard = WorkGuard {
            load: Arc::clone(&self.load),
            id: WorkId::next(),
        };
        metrics::set_in_flight(self.in_flight());
        tracing::trace!(work_id = %guard.id, "Work admitted");
        Some(guard)
    }

    /// Stop admitting new work. Idempotent.
    pub fn close(&self) {
        self.load.send_if_modified(|load| !std::mem::replace(&mut load.closed, true));
    }

    /// Get current in-flight worker count.
    pub fn in_flight(&self) -> u64 {
        self.load.borrow().in_flight
    }

    /// Wait until no worker is in flight.
    ///
    /// Returns immediately when nothing is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.load.subscribe();
        let _ = rx.wait_for(|load| load.in_flight == 0).await;
    }
}

impl Default for WorkTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a worker's lifetime.
/// Decrements the in-flight count when dropped.
#[derive(Debug)]
pub struct WorkGuard {
    load: Arc<watch::Sender<Load>>,
    id: WorkId,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        let mut remaining = 0;
        self.load.send_modify(|load| {
            load.in_flight -= 1;
            remaining = load.in_flight;
        });
        metrics::set_in_flight(remaining);
        tracing::trace!(work_id = %self.id, remaining, "Work finished");
    }
}

/// Middleware admitting each request as a tracked worker.
///
/// Requests arriving after the tracker closed (for example on a kept-alive
/// connection during shutdown) are refused without running the handler.
pub async fn track_work(
    State(tracker): State<WorkTracker>,
    request: Request,
    next: Next,
) -> Response {
    let Some(guard) = tracker.try_track() else {
        tracing::debug!(path = %request.uri().path(), "Refusing work while stopping");
        metrics::record_refused_work();
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response();
    };

    let response = next.run(request).await;
    drop(guard);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn work_id_unique() {
        let tracker = WorkTracker::new();
        let g1 = tracker.try_track().unwrap();
        let g2 = tracker.try_track().unwrap();
        assert_ne!(g1.id, g2.id);
        assert!(g2.id.0 > g1.id.0);
        assert!(g1.id.to_string().starts_with("work-"));
    }

    #[test]
    fn tracker_counts() {
        let tracker = WorkTracker::new();
        assert_eq!(tracker.in_flight(), 0);

        let guard1 = tracker.try_track().unwrap();
        assert_eq!(tracker.in_flight(), 1);

        let guard2 = tracker.try_track().unwrap();
        assert_eq!(tracker.in_flight(), 2);

        drop(guard1);
        assert_eq!(tracker.in_flight(), 1);

        drop(guard2);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn closed_tracker_refuses_work() {
        let tracker = WorkTracker::new();
        let guard = tracker.try_track().unwrap();

        tracker.close();
        tracker.close();
        assert!(tracker.try_track().is_none());
        assert_eq!(tracker.in_flight(), 1);

        drop(guard);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_empty() {
        let tracker = WorkTracker::new();
        timeout(Duration::from_millis(10), tracker.wait_idle())
            .await
            .expect("nothing in flight");
    }

    #[tokio::test]
    async fn wait_idle_wakes_on_last_guard() {
        let tracker = WorkTracker::new();
        let guard = tracker.try_track().unwrap();

        let waiter = tracker.clone();
        let wait = tokio::spawn(async move { waiter.wait_idle().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!wait.is_finished());

        drop(guard);
        timeout(Duration::from_millis(100), wait).await.unwrap().unwrap();
    }
}
