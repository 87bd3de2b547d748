//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net)
//!     → server.rs (state machine, accept loop, drain)
//!     → tracker.rs (admit request as in-flight work, or refuse while stopping)
//!     → worker.rs (perform the unit of work, build the response)
//!     → Send to client
//! ```

pub mod server;
pub mod tracker;
pub mod worker;

pub use server::{Server, ServerError, ServerState, ShutdownTimeoutError};
pub use tracker::{WorkGuard, WorkId, WorkTracker};
pub use worker::HandlerError;
