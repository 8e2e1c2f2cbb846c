//! pulsecheck - HTTP(S) uptime monitoring service
//!
//! Probes every registered node on a fixed interval, appends one probe log
//! per check and keeps the latest status of each node current.

mod check;
mod config;
mod db;
mod probe;
mod scheduler;
mod web;

#[cfg(test)]
mod testing;

use check::Checker;
use config::ServerConfig;
use db::Store;
use scheduler::{RetentionManager, Scheduler};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pulsecheck=info".parse()?),
        )
        .init();

    // Load configuration
    let cfg = ServerConfig::load()?;
    tracing::info!("Starting pulsecheck on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);
    tracing::info!(
        "Checking with {} workers, request timeout {:?}",
        cfg.max_workers,
        cfg.request_timeout
    );

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Start the check scheduler
    let checker = Arc::new(Checker::new(store.clone(), cfg.check_settings())?);
    let scheduler = Scheduler::new(checker.clone(), cfg.check_interval);
    scheduler.start().await;

    // Start log retention
    let retention = RetentionManager::new(store.clone(), cfg.log_retention, cfg.log_cleanup_interval);
    retention.start().await;

    // Serve the management API until interrupted
    let server = Server::new(cfg, store, checker);
    server.start(shutdown_signal()).await?;

    tracing::info!("Shutting down...");
    scheduler.stop().await;
    retention.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
