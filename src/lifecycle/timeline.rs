//! Ordered record of lifecycle transitions.
//!
//! Every transition the controller drives is logged and appended here with
//! its offset from controller start, so the full sequence can be
//! reconstructed after the fact (and awaited on in tests).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::lifecycle::signals::TerminationSignal;

/// A lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    ResourceOpened,
    ResourceOpenFailed,
    ServerStarted { address: SocketAddr },
    SignalReceived(TerminationSignal),
    ServerFailed,
    StopBegun { deadline: Duration },
    StopCompleted,
    StopTimedOut { in_flight: u64 },
    ResourceClosed,
    Exited,
}

/// A transition and when it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub phase: Phase,
    /// Time since the timeline was created.
    pub elapsed: Duration,
}

/// Shared, append-only event log.
#[derive(Debug, Clone)]
pub struct Timeline {
    origin: Instant,
    events: Arc<watch::Sender<Vec<LifecycleEvent>>>,
}

impl Timeline {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self {
            origin: Instant::now(),
            events: Arc::new(tx),
        }
    }

    /// Append a transition.
    pub fn record(&self, phase: Phase) -> LifecycleEvent {
        let event = LifecycleEvent {
            phase,
            elapsed: self.origin.elapsed(),
        };
        tracing::debug!(
            phase = ?event.phase,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "Lifecycle transition"
        );
        self.events.send_modify(|events| events.push(event.clone()));
        event
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.borrow().clone()
    }

    /// Snapshot of the phases so far, without timings.
    pub fn phases(&self) -> Vec<Phase> {
        self.events.borrow().iter().map(|e| e.phase.clone()).collect()
    }

    /// First recorded event matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&Phase) -> bool) -> Option<LifecycleEvent> {
        self.events.borrow().iter().find(|e| predicate(&e.phase)).cloned()
    }

    /// Wait until an event matching `predicate` has been recorded.
    pub async fn wait_for(&self, predicate: impl Fn(&Phase) -> bool) -> LifecycleEvent {
        let mut rx = self.events.subscribe();
        loop {
            if let Some(event) = self.find(&predicate) {
                return event;
            }
            // The sender lives as long as `self`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// Address the server was bound to, once started.
    pub async fn server_address(&self) -> SocketAddr {
        let event = self
            .wait_for(|phase| matches!(phase, Phase::ServerStarted { .. }))
            .await;
        match event.phase {
            Phase::ServerStarted { address } => address,
            _ => unreachable!("predicate only matches ServerStarted"),
        }
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}
