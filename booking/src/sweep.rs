//! Lifecycle sweep.
//!
//! Time-driven transitions (`scheduled → in_progress → completed`) are applied
//! here and nowhere else. Each due game is advanced through the same
//! load-reduce-compare-and-swap cycle the orchestrator uses, so a sweep racing
//! a cancel either loses the write and re-runs against the cancelled game, or
//! wins and the cancel then sees the new status. Re-running a sweep is a no-op.

use crate::game::{GameAction, GameEnvironment, GameEvent, GameReducer};
use crate::metrics;
use crate::store::GameStore;
use crate::types::GameId;
use chrono::{DateTime, Utc};
use courtbook_core::reducer::Reducer;
use courtbook_core::retry::retry_on_conflict;
use courtbook_core::store::{StoreError, with_timeout};
use courtbook_core::{SmallVec, smallvec};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of one sweep run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Due games looked at
    pub examined: usize,
    /// `scheduled → in_progress` transitions applied
    pub started: usize,
    /// `→ completed` transitions applied
    pub completed: usize,
    /// Write conflicts met (and retried)
    pub conflicts: usize,
    /// Games left for the next run after a store failure
    pub failed: usize,
}

/// Advances games whose start or end time has passed.
pub struct LifecycleSweeper {
    games: Arc<dyn GameStore>,
    reducer: GameReducer,
    env: GameEnvironment,
    batch_size: usize,
}

impl LifecycleSweeper {
    /// Create a sweeper that fetches due games `batch_size` at a time.
    #[must_use]
    pub fn new(games: Arc<dyn GameStore>, env: GameEnvironment, batch_size: usize) -> Self {
        Self {
            games,
            reducer: GameReducer::new(),
            env,
            batch_size: batch_size.max(1),
        }
    }

    /// Apply every transition due at `now`.
    ///
    /// A game that fails to commit is counted and left for the next run; it
    /// does not stop the sweep.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if due games cannot be listed.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let timer = Instant::now();
        let mut report = SweepReport::default();
        let mut seen: HashSet<GameId> = HashSet::new();

        loop {
            let due = with_timeout(
                self.env.rules.store_timeout,
                self.games.due_for_transition(now, self.batch_size),
            )
            .await?;
            let full_batch = due.len() >= self.batch_size;

            // Games that failed stay due; never look at them twice in one run.
            let fresh: Vec<GameId> = due.into_iter().filter(|id| seen.insert(*id)).collect();
            if fresh.is_empty() {
                break;
            }

            for id in fresh {
                report.examined += 1;
                let attempts = AtomicUsize::new(0);
                match self.advance(id, now, &attempts).await {
                    Ok(events) => {
                        for event in &events {
                            match event {
                                GameEvent::GameStarted { .. } => report.started += 1,
                                GameEvent::GameCompleted { .. } => report.completed += 1,
                                _ => {}
                            }
                        }
                    }
                    Err(store_error) => {
                        warn!(game = %id, error = %store_error, "Could not advance game");
                        report.failed += 1;
                    }
                }
                report.conflicts += attempts.load(Ordering::Relaxed).saturating_sub(1);
            }

            if !full_batch {
                break;
            }
        }

        metrics::record_sweep_transitions("started", report.started);
        metrics::record_sweep_transitions("completed", report.completed);
        metrics::record_sweep_duration(timer.elapsed().as_secs_f64());
        if report.started + report.completed > 0 {
            info!(
                started = report.started,
                completed = report.completed,
                conflicts = report.conflicts,
                "Lifecycle sweep applied transitions"
            );
        } else {
            debug!(examined = report.examined, "Lifecycle sweep found nothing to do");
        }
        Ok(report)
    }

    async fn advance(
        &self,
        id: GameId,
        now: DateTime<Utc>,
        attempts: &AtomicUsize,
    ) -> Result<SmallVec<[GameEvent; 4]>, StoreError> {
        let timeout = self.env.rules.store_timeout;
        retry_on_conflict(&self.env.rules.retry, || async move {
            attempts.fetch_add(1, Ordering::Relaxed);
            let Some(current) = with_timeout(timeout, self.games.get(id)).await? else {
                return Ok(smallvec![]);
            };
            let mut game = current.value;
            let events = match self.reducer.reduce(&mut game, GameAction::Advance { now }, &self.env) {
                Ok(events) => events,
                Err(rejection) => {
                    // Advance never rejects; a rejection here means the game is corrupt.
                    error!(game = %id, error = %rejection, "Advance rejected");
                    return Ok(smallvec![]);
                }
            };
            if !events.is_empty() {
                with_timeout(timeout, self.games.compare_and_swap(current.version, game)).await?;
            }
            Ok::<_, StoreError>(events)
        })
        .await
    }

    /// Run [`Self::sweep_once`] every `interval` until `shutdown` fires.
    pub fn spawn(
        self,
        interval: std::time::Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(?interval, "Lifecycle sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Lifecycle sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(store_error) = self.sweep_once(self.env.clock.now()).await {
                            error!(error = %store_error, "Lifecycle sweep failed");
                        }
                    }
                }
            }
        })
    }
}
