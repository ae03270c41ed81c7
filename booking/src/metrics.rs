//! Business metrics for the booking engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `courtbook_games_total{status}` - Games created, cancelled and rescheduled
//! - `courtbook_joins_total{result}` - Join and leave attempts by outcome
//! - `courtbook_slot_conflicts_total` - Reservations refused for overlapping a booked slot
//! - `courtbook_reminders_total{status}` - Reminders scheduled, skipped, delivered, failed
//! - `courtbook_sweep_transitions_total{transition}` - Lifecycle transitions applied by the sweep
//!
//! ## Histograms
//! - `courtbook_sweep_duration_seconds` - Time taken by one sweep run

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from installing the metrics exporter.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Register metric descriptions.
///
/// Call once at startup, before anything is recorded.
pub fn register_metrics() {
    describe_counter!(
        "courtbook_games_total",
        "Total number of games by status (created, cancelled, rescheduled)"
    );
    describe_counter!(
        "courtbook_joins_total",
        "Total number of roster changes by result (joined, left, full, rejected)"
    );
    describe_counter!(
        "courtbook_slot_conflicts_total",
        "Total number of reservations refused because the slot was taken"
    );
    describe_counter!(
        "courtbook_reminders_total",
        "Total number of reminders by status (scheduled, skipped, delivered, failed)"
    );
    describe_counter!(
        "courtbook_sweep_transitions_total",
        "Total number of lifecycle transitions applied by the sweep"
    );
    describe_histogram!(
        "courtbook_sweep_duration_seconds",
        "Time taken by one lifecycle sweep"
    );

    tracing::info!("Booking metrics registered");
}

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from inside a Tokio runtime.
///
/// # Errors
///
/// Returns [`MetricsError`] if the exporter cannot be built or a recorder is
/// already installed.
pub fn install_exporter(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    register_metrics();

    tracing::info!(%addr, "Metrics available at http://{}/metrics", addr);
    Ok(())
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a game lifecycle change made by a command.
///
/// * `status` - `created`, `cancelled` or `rescheduled`
pub fn record_game(status: &'static str) {
    metrics::counter!("courtbook_games_total", "status" => status).increment(1);
}

/// Record a roster change attempt.
///
/// * `result` - `joined`, `left`, `full` or `rejected`
pub fn record_join(result: &'static str) {
    metrics::counter!("courtbook_joins_total", "result" => result).increment(1);
}

/// Record a reservation refused for overlap.
pub fn record_slot_conflict() {
    metrics::counter!("courtbook_slot_conflicts_total").increment(1);
}

/// Record a reminder outcome.
pub fn record_reminder(status: &'static str) {
    metrics::counter!("courtbook_reminders_total", "status" => status).increment(1);
}

/// Record transitions applied by the sweep.
pub fn record_sweep_transitions(transition: &'static str, count: usize) {
    if count > 0 {
        metrics::counter!("courtbook_sweep_transitions_total", "transition" => transition)
            .increment(count as u64);
    }
}

/// Record how long a sweep took.
pub fn record_sweep_duration(duration_secs: f64) {
    metrics::histogram!("courtbook_sweep_duration_seconds").record(duration_secs);
    tracing::debug!(duration_secs, "Recorded sweep duration");
}
