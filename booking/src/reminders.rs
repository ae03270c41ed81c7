//! Reminder scheduling.
//!
//! A reminder fires `minutes_before` a game's start and expires at the start.
//! Reminders are records, not timers: [`ReminderScheduler::due_reminders`] is a
//! query over them, and the [`ReminderDispatcher`] polls it on an interval and
//! hands the results to the delivery collaborator.

use crate::game::Game;
use crate::metrics;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::store::{GameStore, ReminderCursor, ReminderStore};
use crate::types::{GameId, GameStatus, PlayerId, ReminderId};
use async_stream::try_stream;
use chrono::{DateTime, Duration, Utc};
use courtbook_core::environment::Clock;
use courtbook_core::store::{StoreError, with_timeout};
use futures::{Stream, StreamExt, pin_mut};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A scheduled reminder for one player about one game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Reminder identity
    pub id: ReminderId,
    /// Player to remind
    pub recipient: PlayerId,
    /// Game the reminder is about
    pub game: GameId,
    /// When the reminder becomes due
    pub scheduled_for: DateTime<Utc>,
    /// When the reminder stops being useful (the game start)
    pub expires_at: DateTime<Utc>,
    /// Whether it was handed to the delivery collaborator
    pub delivered: bool,
    /// Whether it was invalidated (game cancelled or moved, player left)
    pub voided: bool,
    /// When it was created
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    /// Due, undelivered and not voided at `now`
    #[must_use]
    pub fn is_pending_at(&self, now: DateTime<Utc>) -> bool {
        !self.delivered && !self.voided && self.scheduled_for <= now && now < self.expires_at
    }

    /// Sort key used to page through due reminders
    #[must_use]
    pub const fn cursor(&self) -> ReminderCursor {
        ReminderCursor {
            scheduled_for: self.scheduled_for,
            id: self.id,
        }
    }
}

/// A reminder made for an earlier start, or for a player who has since left,
/// no longer describes the game.
fn still_applies(reminder: &Reminder, game: &Game) -> bool {
    reminder.expires_at == game.start_time && game.roster.contains(reminder.recipient)
}

/// Creates, queries and voids reminders.
pub struct ReminderScheduler {
    reminders: Arc<dyn ReminderStore>,
    games: Arc<dyn GameStore>,
    clock: Arc<dyn Clock>,
    timeout: std::time::Duration,
    page_size: usize,
}

impl ReminderScheduler {
    /// Default number of reminders fetched per page
    pub const DEFAULT_PAGE_SIZE: usize = 100;

    /// Create a scheduler.
    #[must_use]
    pub fn new(
        reminders: Arc<dyn ReminderStore>,
        games: Arc<dyn GameStore>,
        clock: Arc<dyn Clock>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            reminders,
            games,
            clock,
            timeout,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Use a different page size for [`Self::due_reminders`]
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Schedule a reminder for `player` `minutes_before` the game starts.
    ///
    /// Returns `None` without error when the fire time has already passed.
    /// Asking again for the same game, player and fire time returns the
    /// existing reminder.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the reminder store fails.
    pub async fn schedule_reminder(
        &self,
        game: &Game,
        player: PlayerId,
        minutes_before: u32,
    ) -> Result<Option<Reminder>, StoreError> {
        let now = self.clock.now();
        let scheduled_for = game.start_time - Duration::minutes(i64::from(minutes_before));

        if scheduled_for <= now || scheduled_for >= game.start_time {
            debug!(game = %game.id, %player, %scheduled_for, "Reminder window already passed");
            metrics::record_reminder("skipped");
            return Ok(None);
        }

        if let Some(existing) =
            with_timeout(self.timeout, self.reminders.find(game.id, player, scheduled_for)).await?
        {
            return Ok(Some(existing));
        }

        let reminder = Reminder {
            id: ReminderId::new(),
            recipient: player,
            game: game.id,
            scheduled_for,
            expires_at: game.start_time,
            delivered: false,
            voided: false,
            created_at: now,
        };
        with_timeout(self.timeout, self.reminders.insert(reminder.clone())).await?;
        debug!(game = %game.id, %player, %scheduled_for, "Reminder scheduled");
        metrics::record_reminder("scheduled");
        Ok(Some(reminder))
    }

    /// Reminders due at `now`, fetched lazily page by page.
    ///
    /// Each call starts a fresh query. A reminder is skipped, even if it has
    /// not been voided yet, when its game is cancelled or gone, when the game
    /// has moved off the start the reminder was made for, or when the
    /// recipient is no longer on the roster.
    pub fn due_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> impl Stream<Item = Result<Reminder, StoreError>> + Send + '_ {
        try_stream! {
            let mut after: Option<ReminderCursor> = None;
            let mut games: HashMap<GameId, Option<Game>> = HashMap::new();

            loop {
                let page = with_timeout(
                    self.timeout,
                    self.reminders.due_page(now, after, self.page_size),
                )
                .await?;
                let last_page = page.len() < self.page_size;

                for reminder in page {
                    after = Some(reminder.cursor());
                    if !games.contains_key(&reminder.game) {
                        let game = self.live_game(reminder.game).await?;
                        games.insert(reminder.game, game);
                    }
                    let current = games
                        .get(&reminder.game)
                        .and_then(Option::as_ref)
                        .is_some_and(|game| still_applies(&reminder, game));
                    if current {
                        yield reminder;
                    } else {
                        debug!(reminder = %reminder.id, game = %reminder.game, "Skipping stale reminder");
                    }
                }

                if last_page {
                    break;
                }
            }
        }
    }

    /// The stored game, unless it is missing or cancelled
    async fn live_game(&self, game: GameId) -> Result<Option<Game>, StoreError> {
        let found = with_timeout(self.timeout, self.games.get(game)).await?;
        Ok(found
            .map(|doc| doc.value)
            .filter(|game| game.status != GameStatus::Cancelled))
    }

    /// Void every undelivered reminder of a game.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the reminder store fails.
    pub async fn void_for_game(&self, game: GameId) -> Result<usize, StoreError> {
        let voided = with_timeout(self.timeout, self.reminders.void(game, None)).await?;
        debug!(%game, voided, "Voided game reminders");
        Ok(voided)
    }

    /// Void one player's undelivered reminders for a game.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the reminder store fails.
    pub async fn void_for_player(&self, game: GameId, player: PlayerId) -> Result<usize, StoreError> {
        with_timeout(self.timeout, self.reminders.void(game, Some(player))).await
    }

    /// Flag a reminder delivered. Returns `false` if it already was, or was voided.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the reminder store fails.
    pub async fn mark_delivered(&self, id: ReminderId) -> Result<bool, StoreError> {
        with_timeout(self.timeout, self.reminders.mark_delivered(id)).await
    }

    /// All reminders recorded for a game
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the reminder store fails.
    pub async fn reminders_for(&self, game: GameId) -> Result<Vec<Reminder>, StoreError> {
        with_timeout(self.timeout, self.reminders.for_game(game)).await
    }
}

/// Outcome of one dispatch run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Reminders handed to the sink and marked delivered
    pub delivered: usize,
    /// Reminders the sink refused; retried on the next run
    pub failed: usize,
}

/// Moves due reminders to the notification sink.
pub struct ReminderDispatcher {
    scheduler: Arc<ReminderScheduler>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl ReminderDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        scheduler: Arc<ReminderScheduler>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scheduler,
            sink,
            clock,
        }
    }

    /// Deliver everything due at `now`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if reminders cannot be read or updated. Sink
    /// failures are not errors; they are counted and logged.
    pub async fn dispatch_once(&self, now: DateTime<Utc>) -> Result<DispatchReport, StoreError> {
        let mut report = DispatchReport::default();
        let due = self.scheduler.due_reminders(now);
        pin_mut!(due);

        while let Some(reminder) = due.next().await {
            let reminder = reminder?;
            let notification = Notification::new(
                reminder.recipient,
                reminder.game,
                NotificationKind::GameReminder,
                format!("Your game starts at {}", reminder.expires_at.format("%Y-%m-%d %H:%M UTC")),
                now,
            );

            match self.sink.deliver(notification).await {
                Ok(()) => {
                    self.scheduler.mark_delivered(reminder.id).await?;
                    metrics::record_reminder("delivered");
                    report.delivered += 1;
                }
                Err(error) => {
                    warn!(reminder = %reminder.id, %error, "Reminder delivery failed");
                    metrics::record_reminder("failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run [`Self::dispatch_once`] every `interval` until `shutdown` fires.
    pub fn spawn(
        self,
        interval: std::time::Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(?interval, "Reminder dispatcher started");

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Reminder dispatcher stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.dispatch_once(self.clock.now()).await {
                            Ok(report) if report.delivered + report.failed > 0 => {
                                info!(delivered = report.delivered, failed = report.failed, "Reminders dispatched");
                            }
                            Ok(_) => {}
                            Err(error) => tracing::error!(%error, "Reminder dispatch failed"),
                        }
                    }
                }
            }
        })
    }
}
