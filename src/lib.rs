//! Graceful lifecycle service library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resource;

pub use config::ServiceConfig;
pub use http::Server;
pub use lifecycle::Controller;
pub use resource::{Database, Resource};
