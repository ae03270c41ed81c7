//! Retrying optimistic read-decide-write cycles that lost a race.
//!
//! A compare-and-swap write fails with a concurrency conflict when another writer
//! committed first. The right response is to re-read, re-decide against the fresh
//! state and try again; any other failure is final. This module provides the
//! policy and the loop for that.
//!
//! # Example
//!
//! ```rust
//! use courtbook_core::retry::{RetryPolicy, retry_on_conflict};
//! use courtbook_core::store::StoreError;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), StoreError> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(2))
//!     .max_delay(Duration::from_millis(50))
//!     .build();
//!
//! let version = retry_on_conflict(&policy, || async {
//!     // load, decide, compare-and-swap
//!     Ok::<_, StoreError>(1_u64)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::store::StoreError;
use std::time::Duration;
use tokio::time::sleep;

/// Errors that can tell a lost race apart from a real failure.
pub trait Conflict {
    /// Whether re-reading and re-running the operation could succeed.
    fn is_conflict(&self) -> bool;
}

impl Conflict for StoreError {
    fn is_conflict(&self) -> bool {
        StoreError::is_conflict(self)
    }
}

/// How long to back off between attempts that lost a race.
///
/// The ceiling for retry `n` is `initial_delay * multiplier^n`, capped at
/// `max_delay`. The pause actually taken is drawn uniformly from the top
/// `jitter` share of that ceiling, so writers that collided once do not wake
/// up together and collide again.
///
/// Defaults: 5 retries, ceilings from 2ms doubling up to 100ms, half of each
/// ceiling randomized.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: usize,
    /// Ceiling of the first pause
    pub initial_delay: Duration,
    /// Largest ceiling any pause may have
    pub max_delay: Duration,
    /// Growth of the ceiling from one retry to the next
    pub multiplier: f64,
    /// Randomized share of each ceiling, from 0.0 (fixed pauses) to 1.0
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Start from the defaults and override what differs.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Longest pause before retry `attempt` (0-indexed).
    #[must_use]
    pub fn backoff_ceiling(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.clamp(0.0, self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Pause before retry `attempt`: the ceiling, less a random part of its
    /// `jitter` share.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        use rand::Rng;

        let ceiling = self.backoff_ceiling(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter <= 0.0 {
            return ceiling;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=1.0);
        ceiling.mul_f64(factor)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Retries allowed after the first attempt.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    /// Ceiling of the first pause.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Largest ceiling any pause may have.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Growth of the ceiling per retry.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Randomized share of each ceiling. Values outside 0.0..=1.0 are clamped
    /// when pauses are computed.
    #[must_use]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.policy.jitter = jitter;
        self
    }

    /// Finish the policy.
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

/// Re-run `operation` while it fails with a concurrency conflict.
///
/// `operation` must perform the whole read-decide-write cycle on every call, so
/// that each attempt decides against freshly read state. Errors that are not
/// conflicts are returned immediately.
///
/// # Errors
///
/// Returns the first non-conflict error, or the last conflict once
/// `policy.max_retries` retries are exhausted.
pub async fn retry_on_conflict<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Conflict + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempt, "Write committed after conflict retry");
                }
                return Ok(result);
            }
            Err(err) if !err.is_conflict() => return Err(err),
            Err(err) => {
                if attempt >= policy.max_retries {
                    tracing::warn!(
                        attempt,
                        error = %err,
                        "Giving up after repeated concurrency conflicts"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Concurrency conflict, re-reading and retrying"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
