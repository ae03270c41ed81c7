//! Background workers and graceful shutdown.
//!
//! The server runs two periodic workers next to the booking service:
//!
//! 1. **Lifecycle sweeper**: advances games whose start or end time passed
//! 2. **Reminder dispatcher**: hands due reminders to the notification sink
//!
//! # Graceful Shutdown
//!
//! On shutdown the signal is broadcast to every worker, then each worker gets
//! the configured timeout to finish the run it is in.

use crate::app::BookingService;
use crate::config::Config;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Smallest accepted worker interval; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Running background workers.
pub struct Workers {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Workers {
    /// Spawn the sweeper and the dispatcher for `service`.
    #[must_use]
    pub fn start(service: &BookingService, config: &Config) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);

        let sweeper = service
            .sweeper(config.workers.sweep_batch_size)
            .spawn(config.sweep_interval().max(MIN_INTERVAL), shutdown_tx.subscribe());
        let dispatcher = service
            .dispatcher()
            .spawn(config.reminder_interval().max(MIN_INTERVAL), shutdown_tx.subscribe());

        info!(workers = 2, "Background workers started");
        Self {
            shutdown_tx,
            handles: vec![("sweeper", sweeper), ("dispatcher", dispatcher)],
        }
    }

    /// Number of running workers
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no worker is running
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every worker to stop and wait up to `timeout` for each.
    pub async fn shutdown(self, timeout: Duration) {
        // Fails only when every worker already exited.
        let _ = self.shutdown_tx.send(());

        for (worker, handle) in self.handles {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => info!(worker, "Worker stopped gracefully"),
                Ok(Err(e)) => warn!(worker, error = %e, "Worker task failed"),
                Err(_) => warn!(worker, "Worker shutdown timed out"),
            }
        }
        info!("Graceful shutdown complete");
    }
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::BookingEnvironment;
    use crate::notify::InMemoryOutbox;
    use courtbook_testing::test_clock;
    use std::sync::Arc;

    #[tokio::test]
    async fn workers_stop_on_shutdown() {
        let config = Config::from_lookup(|key| match key {
            "SWEEP_INTERVAL_SECS" | "REMINDER_INTERVAL_SECS" => Some("0".to_string()),
            _ => None,
        });
        let service = BookingService::new(BookingEnvironment::in_memory(
            Arc::new(test_clock()),
            Arc::new(InMemoryOutbox::new()),
            config.rules(),
        ));

        let workers = Workers::start(&service, &config);
        assert_eq!(workers.len(), 2);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let stopped =
            tokio::time::timeout(Duration::from_secs(5), workers.shutdown(Duration::from_secs(1))).await;
        assert!(stopped.is_ok());
    }
}
