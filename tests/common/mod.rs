//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::{routing::get, Router};
use graceful_service::config::{DatabaseConfig, ServiceConfig, WorkerConfig};
use graceful_service::http::Server;
use graceful_service::resource::{ConnectionError, Resource};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// One time-unit of the shutdown scenarios.
pub const UNIT: Duration = Duration::from_millis(100);

/// Config bound to an ephemeral local port with no simulated latency.
pub fn test_config(deadline: Duration) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.shutdown.deadline_ms = deadline.as_millis() as u64;
    config.database = DatabaseConfig {
        connect_latency_ms: 0,
        close_latency_ms: 0,
        ..DatabaseConfig::default()
    };
    config.worker = WorkerConfig {
        work_duration_ms: (2 * UNIT).as_millis() as u64,
        max_work_duration_ms: 5_000,
    };
    config
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// A router whose handler reports when it starts, then works for `duration`.
pub fn signalling_router(duration: Duration) -> (Router, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(16);
    let router = Router::new().route(
        "/",
        get(move || {
            let tx = tx.clone();
            async move {
                let _ = tx.send(()).await;
                tokio::time::sleep(duration).await;
                "done"
            }
        }),
    );
    (router, rx)
}

/// Poll until the server reports `count` workers in flight.
pub async fn wait_for_in_flight(server: &Server, count: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.in_flight() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workers never reached the expected in-flight count");
}

/// A resource that records every call it receives.
#[derive(Debug, Clone)]
pub struct RecordingResource {
    connected: bool,
    fail_open: bool,
    pub calls: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingResource {
    pub fn new() -> Self {
        Self {
            connected: false,
            fail_open: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl Resource for RecordingResource {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn open(&mut self) -> Result<(), ConnectionError> {
        self.calls.lock().unwrap().push("open");
        if self.fail_open {
            return Err(ConnectionError::Connect {
                address: "127.0.0.1:1".into(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) {
        self.calls.lock().unwrap().push("close");
        self.connected = false;
    }
}
