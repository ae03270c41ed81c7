//! Configuration management for the booking engine.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Call `dotenvy::dotenv()` first to pick up a local `.env` file.

use courtbook_core::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Booking rules and persistence limits
    pub engine: EngineConfig,
    /// Background workers
    pub workers: WorkerConfig,
    /// Process-level settings
    pub server: ServerConfig,
}

/// Booking rules and persistence limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minutes before a game's start that reminders fire (default: 60)
    pub reminder_lead_minutes: u32,
    /// Deadline for a single store call in milliseconds (default: 2000)
    pub store_timeout_ms: u64,
    /// Retries after a concurrency conflict (default: 5)
    pub conflict_max_retries: usize,
    /// Percent of each retry pause that is randomized (default: 50)
    pub conflict_retry_jitter_percent: u8,
    /// Shortest allowed game (default: 30)
    pub min_game_duration_minutes: u32,
    /// Smallest allowed capacity (default: 2)
    pub min_game_capacity: u32,
    /// How far ahead games may be booked (default: 12)
    pub booking_horizon_months: u32,
}

/// Background worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between lifecycle sweeps (default: 30)
    pub sweep_interval_secs: u64,
    /// Seconds between reminder dispatch runs (default: 30)
    pub reminder_interval_secs: u64,
    /// Games advanced per sweep batch (default: 100)
    pub sweep_batch_size: usize,
}

/// Process-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source.
    ///
    /// Missing or unparseable values fall back to their defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default| parsed(&lookup, key).unwrap_or(default);

        Self {
            engine: EngineConfig {
                reminder_lead_minutes: get("REMINDER_LEAD_MINUTES", 60),
                store_timeout_ms: parsed(&lookup, "STORE_TIMEOUT_MS").unwrap_or(2000),
                conflict_max_retries: parsed(&lookup, "CONFLICT_MAX_RETRIES").unwrap_or(5),
                conflict_retry_jitter_percent: parsed(&lookup, "CONFLICT_RETRY_JITTER_PERCENT")
                    .unwrap_or(50)
                    .min(100),
                min_game_duration_minutes: get("MIN_GAME_DURATION_MINUTES", 30),
                min_game_capacity: get("MIN_GAME_CAPACITY", 2),
                booking_horizon_months: get("BOOKING_HORIZON_MONTHS", 12),
            },
            workers: WorkerConfig {
                sweep_interval_secs: parsed(&lookup, "SWEEP_INTERVAL_SECS").unwrap_or(30),
                reminder_interval_secs: parsed(&lookup, "REMINDER_INTERVAL_SECS").unwrap_or(30),
                sweep_batch_size: parsed(&lookup, "SWEEP_BATCH_SIZE").unwrap_or(100),
            },
            server: ServerConfig {
                metrics_host: lookup("METRICS_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                metrics_port: parsed(&lookup, "METRICS_PORT").unwrap_or(9090),
                shutdown_timeout: parsed(&lookup, "SHUTDOWN_TIMEOUT").unwrap_or(10),
            },
        }
    }

    /// Booking rules derived from the engine settings
    #[must_use]
    pub fn rules(&self) -> BookingRules {
        BookingRules {
            min_game_duration_minutes: self.engine.min_game_duration_minutes,
            min_game_capacity: self.engine.min_game_capacity,
            booking_horizon_months: self.engine.booking_horizon_months,
            reminder_lead_minutes: self.engine.reminder_lead_minutes,
            store_timeout: Duration::from_millis(self.engine.store_timeout_ms),
            retry: RetryPolicy::builder()
                .max_retries(self.engine.conflict_max_retries)
                .jitter(f64::from(self.engine.conflict_retry_jitter_percent) / 100.0)
                .build(),
        }
    }

    /// Address the Prometheus exporter binds to.
    ///
    /// An unparseable host falls back to all interfaces.
    #[must_use]
    pub fn metrics_addr(&self) -> SocketAddr {
        let host = IpAddr::from_str(&self.server.metrics_host)
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(host, self.server.metrics_port)
    }

    /// Interval between lifecycle sweeps
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.workers.sweep_interval_secs)
    }

    /// Interval between reminder dispatch runs
    #[must_use]
    pub const fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.workers.reminder_interval_secs)
    }

    /// How long shutdown waits for background tasks
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|raw| raw.trim().parse().ok())
}

/// Business rules every booking is validated against.
#[derive(Debug, Clone)]
pub struct BookingRules {
    /// Shortest allowed game in minutes
    pub min_game_duration_minutes: u32,
    /// Smallest allowed capacity
    pub min_game_capacity: u32,
    /// How many months ahead a game may start
    pub booking_horizon_months: u32,
    /// Reminder lead time in minutes
    pub reminder_lead_minutes: u32,
    /// Deadline for a single store call
    pub store_timeout: Duration,
    /// Backoff for optimistic write retries
    pub retry: RetryPolicy,
}

impl Default for BookingRules {
    fn default() -> Self {
        Config::default().rules()
    }
}
