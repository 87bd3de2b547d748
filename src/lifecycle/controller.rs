//! The lifecycle controller.
//!
//! Owns the resource and drives the fixed sequence
//! `open → start → wait for termination → stop(deadline) → close → exit`.
//! The only alternate branches are the error and timeout paths.

use axum::Router;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::http::server::{Server, ServerError, ShutdownTimeoutError};
use crate::lifecycle::signals::{Signals, TerminationSignal};
use crate::lifecycle::timeline::{Phase, Timeline};
use crate::net::listener::Listener;
use crate::resource::{ConnectionError, Resource};

/// Failures that end the lifecycle with a non-zero exit.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Termination signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    /// The resource could not be opened; the server was never started.
    #[error("resource failed to open: {0}")]
    Connection(#[from] ConnectionError),

    /// The server failed outside of a requested stop.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// How the drain went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight worker finished before the deadline.
    Drained,
    /// The deadline elapsed with work still in flight.
    TimedOut { in_flight: u64 },
}

/// Summary of a completed lifecycle.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub signal: TerminationSignal,
    pub drain: DrainOutcome,
    /// Time from signal receipt to resource closed.
    pub shutdown_duration: Duration,
    pub timeline: Timeline,
}

impl ShutdownReport {
    pub fn timed_out(&self) -> bool {
        matches!(self.drain, DrainOutcome::TimedOut { .. })
    }
}

/// Orchestrates one run of the service.
pub struct Controller<R: Resource> {
    config: ServiceConfig,
    resource: R,
    app: Router,
    /// Pre-bound listener; bound from `config.listener` when absent.
    listener: Option<Listener>,
    timeline: Timeline,
}

impl<R: Resource> Controller<R> {
    pub fn new(config: ServiceConfig, resource: R, app: Router) -> Self {
        Self {
            config,
            resource,
            app,
            listener: None,
            timeline: Timeline::new(),
        }
    }

    /// Serve on an already bound listener, e.g. one inherited from a supervisor.
    pub fn with_listener(mut self, listener: Listener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Handle to the event timeline, usable while `run` is in progress.
    pub fn timeline(&self) -> Timeline {
        self.timeline.clone()
    }

    /// Run until one of the configured OS termination signals arrives.
    pub async fn run(self) -> Result<ShutdownReport, LifecycleError> {
        let mut signals =
            Signals::install(&self.config.shutdown.signals).map_err(LifecycleError::Signals)?;
        self.run_until(async move { signals.recv().await }).await
    }

    /// Run until `termination` resolves.
    pub async fn run_until<F>(mut self, termination: F) -> Result<ShutdownReport, LifecycleError>
    where
        F: Future<Output = TerminationSignal>,
    {
        // 1. The dependency comes up before anything can use it.
        if let Err(e) = self.resource.open().await {
            self.timeline.record(Phase::ResourceOpenFailed);
            tracing::error!(resource = %self.resource.name(), error = %e, "Startup aborted: resource failed to open");
            return Err(LifecycleError::Connection(e));
        }
        self.timeline.record(Phase::ResourceOpened);
        tracing::info!(resource = %self.resource.name(), "Resource opened");

        // 2. Serve on an independent task.
        let server = Server::new(self.app.clone(), self.config.shutdown.on_timeout);
        let listener = match self.listener.take() {
            Some(listener) => Ok(listener),
            None => Listener::bind(&self.config.listener).await,
        };
        let address = match listener {
            Ok(listener) => server.start(listener),
            Err(e) => Err(ServerError::Fatal(e)),
        };
        let address = match address {
            Ok(address) => address,
            Err(e) => {
                self.timeline.record(Phase::ServerFailed);
                tracing::error!(error = %e, "Server failed to start");
                self.close_resource().await;
                self.timeline.record(Phase::Exited);
                return Err(LifecycleError::Server(e));
            }
        };
        self.timeline.record(Phase::ServerStarted { address });

        // 3. The single suspension point of the main path.
        tracing::info!("Waiting for termination signal");
        let outcome = tokio::select! {
            signal = termination => Ok(signal),
            err = server.fatal_error() => Err(err),
        };
        let shutdown_started = Instant::now();

        let signal = match outcome {
            Ok(signal) => signal,
            Err(e) => {
                self.timeline.record(Phase::ServerFailed);
                tracing::error!(error = %e, "Server failed, shutting down");
                self.shutdown(&server).await;
                self.timeline.record(Phase::Exited);
                return Err(LifecycleError::Server(e));
            }
        };
        self.timeline.record(Phase::SignalReceived(signal));
        tracing::info!(signal = %signal, "Termination signal received, initiating graceful shutdown");

        // 4-5. Stop, then close, whatever the stop outcome.
        let drain = self.shutdown(&server).await;

        let report = ShutdownReport {
            signal,
            drain,
            shutdown_duration: shutdown_started.elapsed(),
            timeline: self.timeline.clone(),
        };

        // 6.
        self.timeline.record(Phase::Exited);
        tracing::info!(
            shutdown_ms = report.shutdown_duration.as_millis() as u64,
            drain = ?report.drain,
            "Application exited gracefully"
        );
        Ok(report)
    }

    /// Stop the server within the configured deadline, then close the resource.
    async fn shutdown(&mut self, server: &Server) -> DrainOutcome {
        let deadline = self.config.shutdown.deadline();
        self.timeline.record(Phase::StopBegun { deadline });

        let drain = match server.stop(deadline).await {
            Ok(()) => {
                self.timeline.record(Phase::StopCompleted);
                tracing::info!("HTTP server shut down gracefully");
                DrainOutcome::Drained
            }
            Err(ShutdownTimeoutError { in_flight, .. }) => {
                self.timeline.record(Phase::StopTimedOut { in_flight });
                tracing::warn!(
                    phase = "stop",
                    deadline_ms = deadline.as_millis() as u64,
                    in_flight,
                    "Forced shutdown: drain deadline exceeded"
                );
                DrainOutcome::TimedOut { in_flight }
            }
        };

        self.close_resource().await;
        drain
    }

    async fn close_resource(&mut self) {
        tracing::debug!(
            resource = %self.resource.name(),
            connected = self.resource.is_connected(),
            "Closing resource"
        );
        self.resource.close().await;
        self.timeline.record(Phase::ResourceClosed);
        tracing::info!(resource = %self.resource.name(), "Resource closed");
    }
}
