//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, timestamped)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Every lifecycle transition is a log event; that trace alone is
//!   enough to reconstruct a shutdown after the fact
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
