//! Graceful lifecycle service.
//!
//! A long-running HTTP service with one external dependency, shut down in a
//! fixed order on SIGINT/SIGTERM.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                      lifecycle controller                     │
//!   │                                                               │
//!   │  open ──▶ start ──▶ wait for signal ──▶ stop(deadline) ──▶ close │
//!   │   │         │                              │               │  │
//!   │   ▼         ▼                              ▼               ▼  │
//!   │ database   server ──▶ accept loop ──▶ connections ──▶ workers │
//!   └──────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use graceful_service::config::{load_config, validation::validate_config, ServiceConfig};
use graceful_service::http::worker;
use graceful_service::observability::{logging, metrics};
use graceful_service::{Controller, Database};

#[derive(Parser)]
#[command(name = "graceful-service")]
#[command(about = "HTTP service with an ordered, bounded graceful shutdown", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

fn load(cli: &Cli) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
        validate_config(&config).map_err(|errors| {
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        })?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("graceful-service: invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "graceful-service starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        deadline_ms = config.shutdown.deadline_ms,
        signals = ?config.shutdown.signals,
        on_timeout = ?config.shutdown.on_timeout,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let fail_on_timeout = config.shutdown.fail_on_timeout;
    let database = Database::new(config.database.clone());
    let app = worker::routes(config.worker.clone());

    match Controller::new(config, database, app).run().await {
        Ok(report) if report.timed_out() && fail_on_timeout => {
            tracing::error!(drain = ?report.drain, "Exiting with failure: shutdown timed out");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting with failure");
            ExitCode::FAILURE
        }
    }
}
