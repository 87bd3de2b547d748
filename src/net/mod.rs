//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → connection.rs (serve HTTP, drain or abandon on shutdown)
//!     → Hand off to the HTTP layer
//!
//! Connection States:
//!     Active → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection drains individually when the server stops

pub mod connection;
pub mod listener;

pub use listener::{Listener, ListenerError};
