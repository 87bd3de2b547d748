//! External dependency subsystem.
//!
//! # Data Flow
//! ```text
//! Controller (sole owner, &mut access)
//!     → open()   before the server starts
//!     → close()  after the server has stopped
//! ```
//!
//! # Design Decisions
//! - Exactly two operations cross this boundary: open and close
//! - open failure is fatal to startup and never retried
//! - close is infallible and a logged no-op when not connected

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub mod database;

pub use database::Database;

/// Failure to establish connectivity with a resource.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {address} after {timeout:?}")]
    Timeout { address: String, timeout: Duration },
}

/// A stateful dependency owned by the lifecycle controller.
pub trait Resource: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Whether `open` has completed and `close` has not.
    fn is_connected(&self) -> bool;

    /// Establish connectivity.
    fn open(&mut self) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Tear down connectivity. A no-op when not connected.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
