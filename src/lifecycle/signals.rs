//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for the configured termination signals
//! - Translate whichever arrives first into a [`TerminationSignal`]
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered once, at startup, before any work begins
//! - Every configured signal is an equivalent termination trigger

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationSignal {
    /// SIGINT (Ctrl+C).
    Interrupt,
    /// SIGTERM (orchestrators, `kill`).
    Terminate,
    /// SIGQUIT.
    Quit,
    /// SIGHUP.
    Hangup,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationSignal::Interrupt => "SIGINT",
            TerminationSignal::Terminate => "SIGTERM",
            TerminationSignal::Quit => "SIGQUIT",
            TerminationSignal::Hangup => "SIGHUP",
        };
        f.write_str(name)
    }
}

#[cfg(unix)]
mod imp {
    use super::TerminationSignal;
    use futures_util::future::select_all;
    use tokio::signal::unix::{signal, Signal, SignalKind};

    pub struct Signals {
        streams: Vec<(TerminationSignal, Signal)>,
    }

    fn kind(signal: TerminationSignal) -> SignalKind {
        match signal {
            TerminationSignal::Interrupt => SignalKind::interrupt(),
            TerminationSignal::Terminate => SignalKind::terminate(),
            TerminationSignal::Quit => SignalKind::quit(),
            TerminationSignal::Hangup => SignalKind::hangup(),
        }
    }

    impl Signals {
        pub fn install(set: &[TerminationSignal]) -> std::io::Result<Self> {
            let mut streams = Vec::with_capacity(set.len());
            for &requested in set {
                if streams.iter().any(|(installed, _)| *installed == requested) {
                    continue;
                }
                streams.push((requested, signal(kind(requested))?));
            }
            Ok(Self { streams })
        }

        pub async fn recv(&mut self) -> TerminationSignal {
            if self.streams.is_empty() {
                return std::future::pending().await;
            }
            let waits = self.streams.iter_mut().map(|(name, stream)| {
                let name = *name;
                Box::pin(async move {
                    stream.recv().await;
                    name
                })
            });
            let (received, _, _) = select_all(waits).await;
            received
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::TerminationSignal;

    pub struct Signals;

    impl Signals {
        pub fn install(_set: &[TerminationSignal]) -> std::io::Result<Self> {
            Ok(Self)
        }

        pub async fn recv(&mut self) -> TerminationSignal {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return std::future::pending().await;
            }
            TerminationSignal::Interrupt
        }
    }
}

/// Subscription to the configured set of termination signals.
pub struct Signals {
    inner: imp::Signals,
}

impl Signals {
    /// Register handlers for every signal in `set`.
    pub fn install(set: &[TerminationSignal]) -> std::io::Result<Self> {
        let inner = imp::Signals::install(set)?;
        tracing::debug!(signals = ?set, "Termination signal handlers installed");
        Ok(Self { inner })
    }

    /// Wait for the next termination request.
    pub async fn recv(&mut self) -> TerminationSignal {
        self.inner.recv().await
    }
}
