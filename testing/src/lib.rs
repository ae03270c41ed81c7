//! # Courtbook Testing
//!
//! Testing utilities and helpers for the Courtbook booking engine.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - A Given-When-Then harness for reducers (`ReducerTest`)
//! - Assertion helpers for reducer outcomes
//!
//! ## Example
//!
//! ```ignore
//! use courtbook_testing::{ManualClock, test_clock};
//!
//! #[tokio::test]
//! async fn game_starts_after_its_start_time() {
//!     let clock = ManualClock::starting_at(test_clock().now());
//!     let service = BookingService::new(env_with(clock.clone()));
//!     // ... create a game two hours out
//!     clock.advance(chrono::Duration::hours(3));
//!     sweeper.sweep_once(clock.now()).await?;
//! }
//! ```

#![allow(clippy::module_name_repetitions)]

use chrono::{DateTime, Utc};
use courtbook_core::environment::Clock;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use courtbook_testing::mocks::FixedClock;
    /// use courtbook_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Shared clock that tests move by hand.
    ///
    /// Clones share the same instant, so a test can keep one handle and give
    /// another to the code under test, then advance time between steps.
    ///
    /// # Example
    ///
    /// ```
    /// use courtbook_testing::mocks::ManualClock;
    /// use courtbook_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let start = Utc::now();
    /// let clock = ManualClock::starting_at(start);
    /// let handle = clock.clone();
    /// handle.advance(Duration::minutes(90));
    /// assert_eq!(clock.now(), start + Duration::minutes(90));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`
        #[must_use]
        pub fn starting_at(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Jump to an absolute instant
        pub fn set(&self, time: DateTime<Utc>) {
            // A poisoned lock only means another test thread panicked mid-write;
            // the stored instant is still a valid value.
            let mut guard = self.time.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard = time;
        }

        /// Move the clock forward (or backward, with a negative duration)
        pub fn advance(&self, by: chrono::Duration) {
            let mut guard = self.time.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-06-01 06:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// The instant every default test clock starts at (2025-06-01 06:00:00 UTC).
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_748_757_600, 0).unwrap_or_default()
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock, test_epoch};
pub use reducer_test::{ReducerTest, assertions};
