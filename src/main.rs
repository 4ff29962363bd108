//! astm-listener: a diagnostic ASTM E1381/E1394 receiver
//!
//! Emulates the receiving side of a clinical instrument link for testing
//! instrument drivers:
//! - ACKs every enquiry (ENQ) and every chunk carrying a frame (STX)
//! - Classifies frames by record type (Header, Patient, Order, Result,
//!   Comment, Terminator)
//! - Logs each chunk as hex and with control bytes spelled out
//! - Configuration via CLI arguments or TOML file

mod config;
mod protocols;
mod server;
mod shutdown;

use config::Config;
use server::Server;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        max_connections = config.max_connections,
        workers = ?config.workers,
        "Starting ASTM test server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers.filter(|&w| w > 0) {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let server = Arc::new(Server::new(config));

    let stopper = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            stopper.stop();
        }
    });

    server.start().await.map_err(|e| {
        error!(error = %e, "Cannot start listener");
        e
    })?;
    info!("Server stopped");
    Ok(())
}
