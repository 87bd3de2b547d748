//! Database connection handle.
//!
//! # Responsibilities
//! - Establish the connection on startup (optionally a real TCP connection)
//! - Hold it for the life of the service
//! - Tear it down exactly once, after the server has drained

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::DatabaseConfig;
use crate::resource::{ConnectionError, Resource};

/// The service's database dependency.
#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    connected: bool,
    /// Live socket when an address is configured.
    stream: Option<TcpStream>,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            connected: false,
            stream: None,
        }
    }

    async fn connect(&self, address: &str) -> Result<TcpStream, ConnectionError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e: std::net::AddrParseError| ConnectionError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(ConnectionError::Connect {
                address: address.to_string(),
                source,
            }),
            Err(_) => Err(ConnectionError::Timeout {
                address: address.to_string(),
                timeout: connect_timeout,
            }),
        }
    }
}

impl Resource for Database {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn open(&mut self) -> Result<(), ConnectionError> {
        tracing::info!(database = %self.config.name, "Database connecting");

        tokio::time::sleep(Duration::from_millis(self.config.connect_latency_ms)).await;

        if let Some(address) = self.config.address.clone() {
            let stream = self.connect(&address).await?;
            tracing::debug!(database = %self.config.name, address = %address, "Database socket established");
            self.stream = Some(stream);
        }

        self.connected = true;
        tracing::info!(database = %self.config.name, "Database connected");
        Ok(())
    }

    async fn close(&mut self) {
        if !self.connected {
            tracing::info!(database = %self.config.name, "Database not connected, nothing to close");
            return;
        }

        tracing::info!(database = %self.config.name, "Database closing connection");
        tokio::time::sleep(Duration::from_millis(self.config.close_latency_ms)).await;

        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::warn!(database = %self.config.name, error = %e, "Database socket shutdown failed");
            }
        }

        self.connected = false;
        tracing::info!(database = %self.config.name, "Database connection closed");
    }
}
