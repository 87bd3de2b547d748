//! Per-connection serving and lifecycle.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Serve HTTP/1.1 and HTTP/2 on an accepted stream
//! - Drain the connection gracefully when the server stops
//! - Drop the connection outright when it is abandoned
//!
//! Connection States:
//!     Active → Draining → (closed, task exits)

use axum::{extract::ConnectInfo, Router};
use hyper::{body::Incoming, Request};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tower::Service;

use crate::lifecycle::shutdown::ShutdownListener;
use crate::net::listener::ConnectionPermit;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is active and processing requests.
    Active,
    /// Connection is draining (no new requests, finishing in-flight).
    Draining,
}

/// Everything a connection task needs besides the stream.
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub remote: SocketAddr,
    pub app: Router,
    /// Fires when the server begins stopping.
    pub drain: ShutdownListener,
    /// Fires when stragglers are to be dropped.
    pub abandon: ShutdownListener,
    pub permit: ConnectionPermit,
}

/// Serve one connection until the peer closes it, it drains, or it is abandoned.
pub async fn serve_connection(stream: TcpStream, ctx: ConnectionContext) {
    let ConnectionContext {
        id,
        remote,
        app,
        mut drain,
        mut abandon,
        permit,
    } = ctx;

    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(remote));
        app.clone().call(request)
    });

    let builder = Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut state = ConnectionState::Active;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(connection_id = %id, peer_addr = %remote, error = %e, "Connection error");
                }
                break;
            }
            _ = drain.recv(), if state == ConnectionState::Active => {
                tracing::trace!(connection_id = %id, "Connection draining");
                conn.as_mut().graceful_shutdown();
                state = ConnectionState::Draining;
            }
            _ = abandon.recv() => {
                tracing::warn!(connection_id = %id, peer_addr = %remote, "Abandoning connection with work in flight");
                break;
            }
        }
    }

    drop(permit);
    tracing::trace!(connection_id = %id, last_state = ?state, "Connection closed");
}
