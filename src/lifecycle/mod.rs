//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Controller (controller.rs):
//!     Open resource → Start server → Wait for termination
//!     → Stop server (drain, bounded) → Close resource → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT (configurable) → termination request
//!
//! Shutdown (shutdown.rs):
//!     One-shot notification fanned out to the accept loop and connections
//!
//! Timeline (timeline.rs):
//!     Every transition → timestamped event
//! ```
//!
//! # Design Decisions
//! - Ordered startup: resource first, then listener
//! - Ordered shutdown: stop accepting, drain, close resource
//! - Shutdown has a deadline; a timeout is logged, not escalated by default

pub mod controller;
pub mod shutdown;
pub mod signals;
pub mod timeline;

pub use controller::{Controller, DrainOutcome, LifecycleError, ShutdownReport};
pub use shutdown::{Shutdown, ShutdownListener};
pub use signals::{Signals, TerminationSignal};
pub use timeline::{LifecycleEvent, Phase, Timeline};
