//! HTTP server with a drainable accept loop.
//!
//! # Responsibilities
//! - Wrap the worker router with in-flight tracking and request tracing
//! - Run the accept loop on its own task
//! - Stop accepting, drain in-flight workers within a deadline
//! - Surface fatal accept errors to the owner
//!
//! # State Machine
//! ```text
//! Created ──start()──▶ Running ──stop()──▶ Stopping ──drained / deadline──▶ Stopped
//! Created ──stop()──▶ Stopped
//! ```

use axum::Router;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::StragglerPolicy;
use crate::http::tracker::{track_work, WorkTracker};
use crate::lifecycle::shutdown::{Shutdown, ShutdownListener};
use crate::net::connection::{serve_connection, ConnectionContext, ConnectionId};
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// Errors reported by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` was called on a server that already left `Created`.
    #[error("server already started (state: {0:?})")]
    AlreadyStarted(ServerState),

    /// The accept path failed outside of a requested stop.
    #[error("fatal server error: {0}")]
    Fatal(#[source] ListenerError),
}

/// Draining did not finish before the deadline.
///
/// Not fatal: the listening socket is released either way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shutdown deadline of {deadline:?} elapsed with {in_flight} worker(s) in flight")]
pub struct ShutdownTimeoutError {
    pub deadline: Duration,
    pub in_flight: u64,
}

struct Inner {
    app: Router,
    policy: StragglerPolicy,
    tracker: WorkTracker,
    state: watch::Sender<ServerState>,
    /// Stops the accept loop and drains connections.
    drain: Shutdown,
    /// Drops connections left over after a timeout.
    abandon: Shutdown,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    fatal: Mutex<Option<ServerError>>,
    fatal_notify: Notify,
}

impl Inner {
    fn accept_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.accept_task.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fatal(&self) -> MutexGuard<'_, Option<ServerError>> {
        self.fatal.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The listener/server collaborator driven by the lifecycle controller.
///
/// Cheap to clone; clones share the same server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    /// Create a server around the given worker router.
    pub fn new(app: Router, policy: StragglerPolicy) -> Self {
        let tracker = WorkTracker::new();
        let app = Self::build_router(app, tracker.clone());
        let (state, _) = watch::channel(ServerState::Created);

        Self {
            inner: Arc::new(Inner {
                app,
                policy,
                tracker,
                state,
                drain: Shutdown::new(),
                abandon: Shutdown::new(),
                accept_task: Mutex::new(None),
                fatal: Mutex::new(None),
                fatal_notify: Notify::new(),
            }),
        }
    }

    /// Wrap the worker router with tracking and tracing middleware.
    fn build_router(app: Router, tracker: WorkTracker) -> Router {
        app.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(axum::middleware::from_fn_with_state(tracker, track_work)),
        )
    }

    /// Begin accepting on `listener`. Returns without waiting for the server to stop.
    pub fn start(&self, listener: Listener) -> Result<SocketAddr, ServerError> {
        let mut previous = ServerState::Created;
        let started = self.inner.state.send_if_modified(|state| {
            previous = *state;
            if *state == ServerState::Created {
                *state = ServerState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ServerError::AlreadyStarted(previous));
        }

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.inner.state.send_replace(ServerState::Stopped);
                return Err(ServerError::Fatal(ListenerError::Bind(e)));
            }
        };

        let inner = Arc::clone(&self.inner);
        let accept_shutdown = self.inner.drain.subscribe();
        let handle = tokio::spawn(accept_loop(inner, listener, accept_shutdown));
        *self.inner.accept_task() = Some(handle);

        tracing::info!(address = %addr, "Server started");
        Ok(addr)
    }

    /// Stop accepting and drain in-flight workers, waiting at most `deadline`.
    ///
    /// Calling it again after the server stopped is a no-op returning `Ok`.
    pub async fn stop(&self, deadline: Duration) -> Result<(), ShutdownTimeoutError> {
        let mut previous = ServerState::Created;
        self.inner.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                ServerState::Created => {
                    *state = ServerState::Stopped;
                    true
                }
                ServerState::Running => {
                    *state = ServerState::Stopping;
                    true
                }
                ServerState::Stopping | ServerState::Stopped => false,
            }
        });

        match previous {
            ServerState::Created => {
                tracing::info!("Server stopped before it was started");
                return Ok(());
            }
            ServerState::Stopping => {
                tracing::debug!("Server stop already in progress, waiting for it");
                let mut rx = self.inner.state.subscribe();
                let _ = rx.wait_for(|state| *state == ServerState::Stopped).await;
                return Ok(());
            }
            ServerState::Stopped => {
                tracing::debug!("Server already stopped");
                return Ok(());
            }
            ServerState::Running => {}
        }

        let started = Instant::now();
        tracing::info!(
            deadline_ms = deadline.as_millis() as u64,
            in_flight = self.inner.tracker.in_flight(),
            "Server stopping"
        );

        // No work is admitted from here on.
        self.inner.tracker.close();
        self.inner.drain.trigger();

        let mut accept_task = self.inner.accept_task().take();
        let drain = async {
            if let Some(task) = accept_task.as_mut() {
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "Accept loop task failed");
                }
                accept_task = None;
            }
            self.inner.tracker.wait_idle().await;
        };

        let drained = tokio::time::timeout(deadline, drain).await;
        let result = match drained {
            Ok(()) => {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Server drained gracefully"
                );
                metrics::record_drain(started.elapsed(), false);
                Ok(())
            }
            Err(_) => {
                let in_flight = self.inner.tracker.in_flight();
                tracing::warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    deadline_ms = deadline.as_millis() as u64,
                    in_flight,
                    policy = ?self.inner.policy,
                    "Server shutdown deadline elapsed with work in flight"
                );
                metrics::record_drain(started.elapsed(), true);
                // The accept loop must not outlive stop; the listening socket goes with it.
                if let Some(task) = accept_task.take() {
                    task.abort();
                }
                if self.inner.policy == StragglerPolicy::Abandon {
                    self.inner.abandon.trigger();
                }
                Err(ShutdownTimeoutError { deadline, in_flight })
            }
        };

        self.inner.state.send_replace(ServerState::Stopped);
        tracing::info!("Server stopped");
        result
    }

    /// Completes with the error that ended the accept loop, if it ever fails.
    ///
    /// Pending forever while the server is healthy.
    pub async fn fatal_error(&self) -> ServerError {
        loop {
            let fatal = self.inner.fatal().take();
            if let Some(err) = fatal {
                return err;
            }
            self.inner.fatal_notify.notified().await;
        }
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.borrow()
    }

    /// Number of workers currently in flight.
    pub fn in_flight(&self) -> u64 {
        self.inner.tracker.in_flight()
    }
}

async fn accept_loop(inner: Arc<Inner>, listener: Listener, mut shutdown: ShutdownListener) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, remote, permit)) => {
                let ctx = ConnectionContext {
                    id: ConnectionId::new(),
                    remote,
                    app: inner.app.clone(),
                    drain: inner.drain.subscribe(),
                    abandon: inner.abandon.subscribe(),
                    permit,
                };
                tokio::spawn(serve_connection(stream, ctx));
            }
            Err(e) if e.is_transient() => {
                tracing::debug!(error = %e, "Transient accept error");
            }
            Err(e) => {
                tracing::error!(error = %e, "Accept loop failed");
                *inner.fatal() = Some(ServerError::Fatal(e));
                inner.fatal_notify.notify_one();
                break;
            }
        }
    }

    tracing::debug!(
        available_permits = listener.available_permits(),
        max_connections = listener.max_connections(),
        "Accept loop exited, releasing listener"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;
    use axum::routing::get;

    async fn bound_listener() -> Listener {
        Listener::bind(&ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            max_connections: 16,
        })
        .await
        .unwrap()
    }

    fn hello() -> Router {
        Router::new().route("/", get(|| async { "hi" }))
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let server = Server::new(hello(), StragglerPolicy::Detach);
        assert_eq!(server.state(), ServerState::Created);

        server.start(bound_listener().await).unwrap();
        assert_eq!(server.state(), ServerState::Running);

        server.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let server = Server::new(hello(), StragglerPolicy::Detach);
        server.start(bound_listener().await).unwrap();

        let err = server.start(bound_listener().await).unwrap_err();
        assert!(matches!(err, ServerError::AlreadyStarted(ServerState::Running)));

        server.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let server = Server::new(hello(), StragglerPolicy::Detach);
        server.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);

        let err = server.start(bound_listener().await).unwrap_err();
        assert!(matches!(err, ServerError::AlreadyStarted(ServerState::Stopped)));
    }

    #[tokio::test]
    async fn test_stop_releases_listening_port() {
        let server = Server::new(hello(), StragglerPolicy::Detach);
        let addr = server.start(bound_listener().await).unwrap();

        server.stop(Duration::from_secs(1)).await.unwrap();

        tokio::net::TcpListener::bind(addr)
            .await
            .expect("port should be free after stop");
    }

    #[test]
    fn test_timeout_error_display() {
        let err = ShutdownTimeoutError {
            deadline: Duration::from_secs(5),
            in_flight: 2,
        };
        assert!(err.to_string().contains("2 worker(s) in flight"));
    }
}
