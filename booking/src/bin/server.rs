//! Courtbook Server
//!
//! Runs the booking engine's background workers against the in-memory stores.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Installs tracing and the Prometheus exporter
//! - Spawns the lifecycle sweeper and the reminder dispatcher
//! - Shuts both down gracefully on Ctrl+C or SIGTERM
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info,courtbook=debug cargo run --bin courtbook-server
//! ```

use courtbook::lifecycle::{Workers, shutdown_signal};
use courtbook::{BookingEnvironment, BookingService, Config, LogNotificationSink, metrics};
use courtbook_core::environment::SystemClock;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,courtbook=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Courtbook server...");

    let config = Config::from_env();
    tracing::info!(
        sweep_interval = ?config.sweep_interval(),
        reminder_interval = ?config.reminder_interval(),
        reminder_lead_minutes = config.engine.reminder_lead_minutes,
        "Configuration loaded"
    );

    metrics::install_exporter(config.metrics_addr())?;

    let service = BookingService::new(BookingEnvironment::in_memory(
        Arc::new(SystemClock),
        Arc::new(LogNotificationSink),
        config.rules(),
    ));
    let workers = Workers::start(&service, &config);

    tracing::info!("Courtbook server is running, press Ctrl+C to shut down");
    shutdown_signal().await;

    tracing::info!("Shutting down gracefully...");
    workers.shutdown(config.shutdown_timeout()).await;
    Ok(())
}
