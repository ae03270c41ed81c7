//! Command side of the booking service.

use super::{BookingEnvironment, NewCourt, NewGame};
use crate::availability::Availability;
use crate::config::BookingRules;
use crate::error::{AvailabilityError, BookingError, BookingResult};
use crate::game::{
    Game, GameAction, GameDraft, GameEnvironment, GameEvent, GameReducer, validate_timing,
};
use crate::metrics;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::reminders::{ReminderDispatcher, ReminderScheduler};
use crate::store::{CourtStore, GameStore, StoreError};
use crate::sweep::LifecycleSweeper;
use crate::types::{
    Actor, Court, CourtId, CourtStatus, GameId, GameStatus, PlayerId, SlotRange,
};
use chrono::{DateTime, NaiveDate, Utc};
use courtbook_core::SmallVec;
use courtbook_core::environment::Clock;
use courtbook_core::reducer::Reducer;
use courtbook_core::retry::retry_on_conflict;
use courtbook_core::store::with_timeout;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// The booking orchestrator.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct BookingService {
    pub(super) clock: Arc<dyn Clock>,
    pub(super) courts: Arc<dyn CourtStore>,
    pub(super) games: Arc<dyn GameStore>,
    notifications: Arc<dyn NotificationSink>,
    pub(super) rules: BookingRules,
    pub(super) availability: Availability,
    reminders: Arc<ReminderScheduler>,
    reducer: GameReducer,
    game_env: GameEnvironment,
}

impl BookingService {
    /// Build the service from its collaborators.
    #[must_use]
    pub fn new(env: BookingEnvironment) -> Self {
        let availability = Availability::new(
            env.schedules,
            env.rules.retry.clone(),
            env.rules.store_timeout,
        );
        let reminders = Arc::new(ReminderScheduler::new(
            env.reminders,
            env.games.clone(),
            env.clock.clone(),
            env.rules.store_timeout,
        ));
        let game_env = GameEnvironment::new(env.clock.clone(), env.rules.clone());

        Self {
            clock: env.clock,
            courts: env.courts,
            games: env.games,
            notifications: env.notifications,
            rules: env.rules,
            availability,
            reminders,
            reducer: GameReducer::new(),
            game_env,
        }
    }

    /// The availability model the service books through
    #[must_use]
    pub const fn availability(&self) -> &Availability {
        &self.availability
    }

    /// The reminder scheduler the service books reminders with
    #[must_use]
    pub fn reminder_scheduler(&self) -> Arc<ReminderScheduler> {
        Arc::clone(&self.reminders)
    }

    /// A dispatcher delivering this service's reminders to its notification sink
    #[must_use]
    pub fn dispatcher(&self) -> ReminderDispatcher {
        ReminderDispatcher::new(
            self.reminder_scheduler(),
            Arc::clone(&self.notifications),
            Arc::clone(&self.clock),
        )
    }

    /// A lifecycle sweeper over this service's games
    #[must_use]
    pub fn sweeper(&self, batch_size: usize) -> LifecycleSweeper {
        LifecycleSweeper::new(Arc::clone(&self.games), self.game_env.clone(), batch_size)
    }

    pub(super) const fn timeout(&self) -> Duration {
        self.rules.store_timeout
    }

    // ========================================================================
    // Courts
    // ========================================================================

    /// Register a court. Administrators only.
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`] for non-administrators,
    /// [`BookingError::Validation`] for a blank name or no sports, and
    /// [`BookingError::System`] if the court store fails.
    #[instrument(skip_all, fields(actor = %actor.player))]
    pub async fn register_court(&self, actor: Actor, new: NewCourt) -> BookingResult<Court> {
        observe("register_court", self.try_register_court(actor, new).await)
    }

    async fn try_register_court(&self, actor: Actor, new: NewCourt) -> BookingResult<Court> {
        if !actor.is_admin() {
            return Err(BookingError::Forbidden(
                "only administrators can register courts".to_string(),
            ));
        }
        let name = new.name.trim();
        if name.is_empty() {
            return Err(BookingError::Validation("Court name is required".to_string()));
        }
        if new.sport_types.is_empty() {
            return Err(BookingError::Validation(
                "A court must support at least one sport".to_string(),
            ));
        }

        let court = Court {
            id: CourtId::new(),
            name: name.to_string(),
            location: new.location,
            sport_types: new.sport_types.into_iter().collect(),
            timezone: new.timezone,
            working_hours: new.working_hours,
            status: CourtStatus::Active,
            created_by: actor.player,
            created_at: self.clock.now(),
        };
        with_timeout(self.timeout(), self.courts.insert(court.clone())).await?;
        info!(court = %court.id, name = %court.name, "Court registered");
        Ok(court)
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Book a slot and create a game on it, with the actor as creator.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for bad capacity or timing, an inactive
    ///   court, an unsupported sport, or a time outside working hours
    /// - [`BookingError::NotFound`] for an unknown court
    /// - [`BookingError::NotAvailable`] if the slot overlaps another game
    /// - [`BookingError::System`] if a store fails; any reservation made for
    ///   the game is released first
    #[instrument(skip_all, fields(actor = %actor.player, court = %new.court, start = %new.start_time))]
    pub async fn create_game(&self, actor: Actor, new: NewGame) -> BookingResult<Game> {
        observe("create_game", self.try_create_game(actor, new).await)
    }

    async fn try_create_game(&self, actor: Actor, new: NewGame) -> BookingResult<Game> {
        let now = self.clock.now();

        if new.capacity < self.rules.min_game_capacity {
            return Err(BookingError::Validation(format!(
                "Game capacity must be at least {}",
                self.rules.min_game_capacity
            )));
        }
        validate_timing(&self.rules, now, new.start_time, new.duration_minutes)?;

        let court = self.load_court(new.court).await?;
        require_active(&court)?;
        if !court.supports(&new.sport) {
            return Err(BookingError::Validation(format!(
                "Court {} does not support {}",
                court.name, new.sport
            )));
        }
        let (date, slot) = court.local_slot(new.start_time, new.duration_minutes)?;

        let id = GameId::new();
        self.reserve_slot(court.id, date, slot, id, None).await?;

        let game = Game::open(
            GameDraft {
                id,
                court: court.id,
                creator: actor.player,
                sport: new.sport,
                format: new.format,
                skill_level: new.skill_level,
                description: new.description.filter(|d| !d.trim().is_empty()),
                start_time: new.start_time,
                duration_minutes: new.duration_minutes,
                date,
                slot,
                capacity: new.capacity,
            },
            now,
        );

        if let Err(store_error) = with_timeout(self.timeout(), self.games.insert(game.clone())).await {
            warn!(game = %id, error = %store_error, "Game insert failed, releasing its slot");
            self.release_slot(court.id, date, slot, id).await;
            return Err(store_error.into());
        }

        info!(game = %id, %date, %slot, "Game created");
        metrics::record_game("created");
        self.schedule_reminder(&game, game.creator).await;
        Ok(game)
    }

    // ========================================================================
    // Roster
    // ========================================================================

    /// Take a confirmed place in a game.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::InvalidStatus`],
    /// [`BookingError::GameFull`], [`BookingError::AlreadyJoined`], in that
    /// order of precedence, or [`BookingError::System`].
    #[instrument(skip_all, fields(actor = %actor.player, %game_id))]
    pub async fn join_game(&self, actor: Actor, game_id: GameId) -> BookingResult<Game> {
        observe("join_game", self.try_join_game(actor, game_id).await)
    }

    async fn try_join_game(&self, actor: Actor, game_id: GameId) -> BookingResult<Game> {
        let player = actor.player;
        let (game, _) = match self.update_game(game_id, GameAction::Join { player }).await {
            Ok(updated) => updated,
            Err(error) => {
                if matches!(error, BookingError::GameFull { .. }) {
                    metrics::record_join("full");
                } else if error.is_business() {
                    metrics::record_join("rejected");
                }
                return Err(error);
            }
        };

        info!(confirmed = game.roster.confirmed_count(), capacity = game.capacity, "Player joined");
        metrics::record_join("joined");
        self.schedule_reminder(&game, player).await;
        if game.creator != player {
            self.notify(
                [game.creator],
                &game,
                NotificationKind::PlayerJoined,
                &format!("Player {player} joined your game on {}", game.date),
            )
            .await;
        }
        Ok(game)
    }

    /// Give up a place in a game.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::InvalidStatus`],
    /// [`BookingError::CreatorCannotLeave`], [`BookingError::NotAParticipant`],
    /// or [`BookingError::System`].
    #[instrument(skip_all, fields(actor = %actor.player, %game_id))]
    pub async fn leave_game(&self, actor: Actor, game_id: GameId) -> BookingResult<Game> {
        observe("leave_game", self.try_leave_game(actor, game_id).await)
    }

    async fn try_leave_game(&self, actor: Actor, game_id: GameId) -> BookingResult<Game> {
        let player = actor.player;
        let (game, _) = self.update_game(game_id, GameAction::Leave { player }).await?;

        info!(confirmed = game.roster.confirmed_count(), "Player left");
        metrics::record_join("left");
        if let Err(store_error) = self.reminders.void_for_player(game_id, player).await {
            error!(%player, error = %store_error, "Failed to void reminders");
        }
        self.notify(
            [game.creator],
            &game,
            NotificationKind::PlayerLeft,
            &format!("Player {player} left your game on {}", game.date),
        )
        .await;
        Ok(game)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Cancel a game and free its slot. Creator or administrator only.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::Forbidden`],
    /// [`BookingError::InvalidStatus`] or [`BookingError::System`].
    #[instrument(skip_all, fields(actor = %actor.player, %game_id))]
    pub async fn cancel_game(
        &self,
        actor: Actor,
        game_id: GameId,
        reason: Option<String>,
    ) -> BookingResult<Game> {
        observe("cancel_game", self.try_cancel_game(actor, game_id, reason).await)
    }

    async fn try_cancel_game(
        &self,
        actor: Actor,
        game_id: GameId,
        reason: Option<String>,
    ) -> BookingResult<Game> {
        let (game, _) = self.update_game(game_id, GameAction::Cancel { actor, reason }).await?;
        let reason = game.cancellation_reason.clone().unwrap_or_default();

        info!(%reason, "Game cancelled");
        metrics::record_game("cancelled");
        self.release_slot(game.court, game.date, game.slot, game.id).await;
        if let Err(store_error) = self.reminders.void_for_game(game_id).await {
            error!(error = %store_error, "Failed to void reminders");
        }

        let recipients: Vec<PlayerId> =
            game.roster.members().filter(|p| *p != actor.player).collect();
        self.notify(
            recipients,
            &game,
            NotificationKind::GameCancelled,
            &format!("Your game on {} was cancelled: {reason}", game.date),
        )
        .await;
        Ok(game)
    }

    /// Move a game to a new start time and duration on the same court.
    ///
    /// The new range is reserved before the game is changed; the old range is
    /// released afterwards. Every confirmed player gets a fresh reminder.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::Forbidden`],
    /// [`BookingError::InvalidStatus`], [`BookingError::Validation`],
    /// [`BookingError::NotAvailable`] or [`BookingError::System`].
    #[instrument(skip_all, fields(actor = %actor.player, %game_id, start = %start_time))]
    pub async fn reschedule_game(
        &self,
        actor: Actor,
        game_id: GameId,
        start_time: DateTime<Utc>,
        duration_minutes: u32,
    ) -> BookingResult<Game> {
        observe(
            "reschedule_game",
            self.try_reschedule_game(actor, game_id, start_time, duration_minutes).await,
        )
    }

    async fn try_reschedule_game(
        &self,
        actor: Actor,
        game_id: GameId,
        start_time: DateTime<Utc>,
        duration_minutes: u32,
    ) -> BookingResult<Game> {
        let now = self.clock.now();
        let current = self.load_game(game_id).await?;

        // Cheap rejections before touching the schedule; the reducer re-checks
        // all of them against fresh state.
        if !current.is_managed_by(&actor) {
            return Err(BookingError::Forbidden(
                "only the creator or an administrator can reschedule a game".to_string(),
            ));
        }
        let status = current.effective_status(now);
        if status != GameStatus::Scheduled {
            return Err(BookingError::InvalidStatus {
                current: status,
                expected: GameStatus::Scheduled,
            });
        }
        validate_timing(&self.rules, now, start_time, duration_minutes)?;

        let court = self.load_court(current.court).await?;
        require_active(&court)?;
        let (date, slot) = court.local_slot(start_time, duration_minutes)?;
        let held = (current.date, current.slot);

        self.reserve_slot(court.id, date, slot, game_id, Some(held)).await?;

        let action = GameAction::Reschedule {
            actor,
            start_time,
            duration_minutes,
            date,
            slot,
        };
        let (game, events) = match self.update_game(game_id, action).await {
            Ok(updated) => updated,
            Err(error) => {
                if (date, slot) != held {
                    self.release_slot(court.id, date, slot, game_id).await;
                }
                return Err(error);
            }
        };

        let Some(GameEvent::GameRescheduled {
            previous_date,
            previous_slot,
            ..
        }) = events.first()
        else {
            debug!("Game already at the requested time");
            return Ok(game);
        };
        if (*previous_date, *previous_slot) != (date, slot) {
            self.release_slot(game.court, *previous_date, *previous_slot, game_id).await;
        }

        info!(%date, %slot, "Game rescheduled");
        metrics::record_game("rescheduled");

        if let Err(store_error) = self.reminders.void_for_game(game_id).await {
            error!(error = %store_error, "Failed to void reminders");
        }
        for player in game.roster.confirmed() {
            self.schedule_reminder(&game, player).await;
        }

        let recipients: Vec<PlayerId> =
            game.roster.members().filter(|p| *p != actor.player).collect();
        self.notify(
            recipients,
            &game,
            NotificationKind::GameUpdated,
            &format!("Your game moved to {} {}", game.date, game.slot),
        )
        .await;
        Ok(game)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Load, reduce and commit a game under optimistic concurrency.
    ///
    /// The whole cycle is re-run on a version conflict, so every reducer check
    /// is evaluated against the state that is actually written over.
    async fn update_game(
        &self,
        game_id: GameId,
        action: GameAction,
    ) -> BookingResult<(Game, SmallVec<[GameEvent; 4]>)> {
        retry_on_conflict(&self.rules.retry, || {
            let action = action.clone();
            async move {
                let current = with_timeout(self.timeout(), self.games.get(game_id))
                    .await?
                    .ok_or_else(|| BookingError::not_found("game", game_id))?;
                let mut game = current.value;
                let events = self.reducer.reduce(&mut game, action, &self.game_env)?;
                if !events.is_empty() {
                    with_timeout(
                        self.timeout(),
                        self.games.compare_and_swap(current.version, game.clone()),
                    )
                    .await?;
                }
                Ok::<_, BookingError>((game, events))
            }
        })
        .await
    }

    pub(super) async fn load_game(&self, id: GameId) -> BookingResult<Game> {
        with_timeout(self.timeout(), self.games.get(id))
            .await?
            .map(|doc| doc.value)
            .ok_or_else(|| BookingError::not_found("game", id))
    }

    pub(super) async fn load_court(&self, id: CourtId) -> BookingResult<Court> {
        with_timeout(self.timeout(), self.courts.get(id))
            .await?
            .ok_or_else(|| BookingError::not_found("court", id))
    }

    /// Reserve `slot` for `game`.
    ///
    /// A timed-out reservation has an unknown outcome, so the schedule is read
    /// back and anything the attempt may have committed is released before the
    /// timeout is reported. `held` is the range the game already owns, which is
    /// never released.
    async fn reserve_slot(
        &self,
        court: CourtId,
        date: NaiveDate,
        slot: SlotRange,
        game: GameId,
        held: Option<(NaiveDate, SlotRange)>,
    ) -> BookingResult<()> {
        match self.availability.reserve(court, date, slot, game).await {
            Ok(_) => Ok(()),
            Err(AvailabilityError::Store(StoreError::Timeout(after))) => {
                warn!(%game, ?after, "Reservation outcome unknown, reconciling");
                match held {
                    None => match self.availability.reservation_for(court, date, game).await {
                        Ok(Some(found)) => self.release_slot(court, date, found.range, game).await,
                        Ok(None) => debug!(%game, "Timed-out reservation was not committed"),
                        Err(read_error) => {
                            error!(%game, error = %read_error, "Reconciliation read failed");
                        }
                    },
                    Some(held) if held == (date, slot) => {}
                    Some(_) => self.release_slot(court, date, slot, game).await,
                }
                Err(StoreError::Timeout(after).into())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn release_slot(&self, court: CourtId, date: NaiveDate, slot: SlotRange, game: GameId) {
        if let Err(release_error) = self.availability.release(court, date, slot, game).await {
            error!(%court, %date, %slot, %game, error = %release_error, "Failed to release slot");
        }
    }

    async fn schedule_reminder(&self, game: &Game, player: PlayerId) {
        if let Err(store_error) = self
            .reminders
            .schedule_reminder(game, player, self.rules.reminder_lead_minutes)
            .await
        {
            error!(game = %game.id, %player, error = %store_error, "Failed to schedule reminder");
        }
    }

    async fn notify<I>(&self, recipients: I, game: &Game, kind: NotificationKind, message: &str)
    where
        I: IntoIterator<Item = PlayerId>,
    {
        let now = self.clock.now();
        for recipient in recipients {
            let notification = Notification::new(recipient, game.id, kind, message, now);
            if let Err(delivery_error) = self.notifications.deliver(notification).await {
                warn!(
                    %recipient,
                    game = %game.id,
                    kind = kind.as_str(),
                    error = %delivery_error,
                    "Notification not delivered"
                );
            }
        }
    }
}

fn require_active(court: &Court) -> BookingResult<()> {
    if court.status == CourtStatus::Active {
        Ok(())
    } else {
        Err(BookingError::Validation(format!(
            "Court {} is not accepting bookings",
            court.name
        )))
    }
}

/// Log a failed operation at the severity its error class calls for.
pub(super) fn observe<T>(operation: &'static str, result: BookingResult<T>) -> BookingResult<T> {
    if let Err(failure) = &result {
        if failure.is_business() {
            warn!(operation, kind = failure.kind(), error = %failure, "Request rejected");
        } else {
            error!(operation, error = %failure, "Request failed");
        }
    }
    result
}
