//! Game aggregate and lifecycle state machine.
//!
//! A [`Game`] is changed only through [`GameReducer`]: callers load the game
//! with its version, run an action against a copy, and commit the result with
//! a compare-and-swap on that version. A lost race re-runs the whole cycle
//! against fresh state, so every check below is re-evaluated inside the same
//! conditional write that applies it.
//!
//! # Lifecycle
//!
//! ```text
//! scheduled ──(now ≥ start)──▶ in_progress ──(now ≥ end)──▶ completed
//!     │
//!     └──(cancel by creator or admin)──▶ cancelled
//! ```
//!
//! Time-driven transitions are applied by the lifecycle sweep with
//! [`GameAction::Advance`]. Commands validate against
//! [`Game::effective_status`], so a game whose start has passed behaves as
//! `in_progress` even before the sweep has caught up.

use crate::config::BookingRules;
use crate::error::GameError;
use crate::roster::Roster;
use crate::types::{
    Actor, CourtId, GameFormat, GameId, GameStatus, PlayerId, SkillLevel, SlotRange, SportType,
};
use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use courtbook_core::environment::Clock;
use courtbook_core::reducer::Reducer;
use courtbook_core::{SmallVec, smallvec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reason recorded when a cancel request does not give one.
pub const DEFAULT_CANCEL_REASON: &str = "Game cancelled by creator";

// ============================================================================
// State
// ============================================================================

/// A game booked on a court.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Game identity
    pub id: GameId,
    /// Court the game is booked on
    pub court: CourtId,
    /// Player who created the game
    pub creator: PlayerId,
    /// Sport played
    pub sport: SportType,
    /// Format played
    pub format: GameFormat,
    /// Expected skill level
    pub skill_level: SkillLevel,
    /// Free-text description
    pub description: Option<String>,
    /// Start instant
    pub start_time: DateTime<Utc>,
    /// Length in minutes
    pub duration_minutes: u32,
    /// Court-local calendar date of the booked slot
    pub date: NaiveDate,
    /// Court-local minute range of the booked slot
    pub slot: SlotRange,
    /// Maximum confirmed players
    pub capacity: u32,
    /// Players
    pub roster: Roster,
    /// Stored lifecycle status
    pub status: GameStatus,
    /// Why the game was cancelled
    pub cancellation_reason: Option<String>,
    /// When the game was created
    pub created_at: DateTime<Utc>,
    /// When the game was last changed
    pub updated_at: DateTime<Utc>,
    /// When the game was cancelled
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Everything needed to open a new game, after the booking has been validated.
#[derive(Clone, Debug)]
pub struct GameDraft {
    /// Identity the slot was reserved under
    pub id: GameId,
    /// Court
    pub court: CourtId,
    /// Creator, seeded as the first roster entry
    pub creator: PlayerId,
    /// Sport
    pub sport: SportType,
    /// Format
    pub format: GameFormat,
    /// Skill level
    pub skill_level: SkillLevel,
    /// Description
    pub description: Option<String>,
    /// Start instant
    pub start_time: DateTime<Utc>,
    /// Length in minutes
    pub duration_minutes: u32,
    /// Court-local date
    pub date: NaiveDate,
    /// Court-local range
    pub slot: SlotRange,
    /// Capacity
    pub capacity: u32,
}

impl Game {
    /// Open a scheduled game with the creator pre-seeded into the roster.
    #[must_use]
    pub fn open(draft: GameDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: draft.id,
            court: draft.court,
            creator: draft.creator,
            sport: draft.sport,
            format: draft.format,
            skill_level: draft.skill_level,
            description: draft.description,
            start_time: draft.start_time,
            duration_minutes: draft.duration_minutes,
            date: draft.date,
            slot: draft.slot,
            capacity: draft.capacity,
            roster: Roster::seeded(draft.creator, now),
            status: GameStatus::Scheduled,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        }
    }

    /// Instant the game ends
    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// The status the game has once every due transition is applied.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> GameStatus {
        match self.status {
            GameStatus::Scheduled | GameStatus::InProgress if now >= self.end_time() => {
                GameStatus::Completed
            }
            GameStatus::Scheduled if now >= self.start_time => GameStatus::InProgress,
            status => status,
        }
    }

    /// When the next time-driven transition is due, if any.
    #[must_use]
    pub fn next_transition_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            GameStatus::Scheduled => Some(self.start_time),
            GameStatus::InProgress => Some(self.end_time()),
            GameStatus::Completed | GameStatus::Cancelled => None,
        }
    }

    /// Whether `actor` may cancel or reschedule this game
    #[must_use]
    pub fn is_managed_by(&self, actor: &Actor) -> bool {
        actor.is_admin() || actor.player == self.creator
    }

    fn require_scheduled(&self, now: DateTime<Utc>) -> Result<(), GameError> {
        match self.effective_status(now) {
            GameStatus::Scheduled => Ok(()),
            current => Err(GameError::InvalidStatus {
                current,
                expected: GameStatus::Scheduled,
            }),
        }
    }

    /// Apply an event to the game. Events are facts; no validation happens here.
    pub fn apply(&mut self, event: &GameEvent) {
        match event {
            GameEvent::PlayerJoined { player, at, .. } => {
                self.roster.admit(*player, *at);
                self.updated_at = *at;
            }
            GameEvent::PlayerLeft { player, at, .. } => {
                self.roster.withdraw(*player);
                self.updated_at = *at;
            }
            GameEvent::GameCancelled { reason, at, .. } => {
                self.status = GameStatus::Cancelled;
                self.cancellation_reason = Some(reason.clone());
                self.cancelled_at = Some(*at);
                self.updated_at = *at;
            }
            GameEvent::GameRescheduled {
                start_time,
                duration_minutes,
                date,
                slot,
                at,
                ..
            } => {
                self.start_time = *start_time;
                self.duration_minutes = *duration_minutes;
                self.date = *date;
                self.slot = *slot;
                self.updated_at = *at;
            }
            GameEvent::GameStarted { at, .. } => {
                self.status = GameStatus::InProgress;
                self.updated_at = *at;
            }
            GameEvent::GameCompleted { at, .. } => {
                self.status = GameStatus::Completed;
                self.updated_at = *at;
            }
        }
    }
}

// ============================================================================
// Actions and events
// ============================================================================

/// Commands accepted by the game reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameAction {
    /// A player takes a confirmed place
    Join {
        /// The joining player
        player: PlayerId,
    },
    /// A player gives up their place
    Leave {
        /// The leaving player
        player: PlayerId,
    },
    /// The creator or an administrator cancels the game
    Cancel {
        /// Who is cancelling
        actor: Actor,
        /// Optional reason; defaults to [`DEFAULT_CANCEL_REASON`]
        reason: Option<String>,
    },
    /// Move the game to a new time whose slot is already reserved
    Reschedule {
        /// Who is rescheduling
        actor: Actor,
        /// New start instant
        start_time: DateTime<Utc>,
        /// New length in minutes
        duration_minutes: u32,
        /// Court-local date of the new slot
        date: NaiveDate,
        /// Court-local range of the new slot
        slot: SlotRange,
    },
    /// Apply every time-driven transition due at `now`
    Advance {
        /// Sweep time
        now: DateTime<Utc>,
    },
}

/// Facts recorded by the game reducer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A player joined
    PlayerJoined {
        /// Game
        game: GameId,
        /// Player
        player: PlayerId,
        /// When
        at: DateTime<Utc>,
    },
    /// A player left
    PlayerLeft {
        /// Game
        game: GameId,
        /// Player
        player: PlayerId,
        /// When
        at: DateTime<Utc>,
    },
    /// The game was cancelled
    GameCancelled {
        /// Game
        game: GameId,
        /// Who cancelled
        by: PlayerId,
        /// Why
        reason: String,
        /// When
        at: DateTime<Utc>,
    },
    /// The game moved to a new time
    GameRescheduled {
        /// Game
        game: GameId,
        /// Start before the move
        previous_start: DateTime<Utc>,
        /// Slot date before the move
        previous_date: NaiveDate,
        /// Slot range before the move
        previous_slot: SlotRange,
        /// New start
        start_time: DateTime<Utc>,
        /// New length in minutes
        duration_minutes: u32,
        /// New slot date
        date: NaiveDate,
        /// New slot range
        slot: SlotRange,
        /// When
        at: DateTime<Utc>,
    },
    /// The start time passed
    GameStarted {
        /// Game
        game: GameId,
        /// When the sweep observed it
        at: DateTime<Utc>,
    },
    /// The end time passed
    GameCompleted {
        /// Game
        game: GameId,
        /// When the sweep observed it
        at: DateTime<Utc>,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the game reducer.
#[derive(Clone)]
pub struct GameEnvironment {
    /// Clock for timestamps and "is it in the future" checks
    pub clock: Arc<dyn Clock>,
    /// Booking rules
    pub rules: BookingRules,
}

impl GameEnvironment {
    /// Creates a new `GameEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, rules: BookingRules) -> Self {
        Self { clock, rules }
    }
}

/// Check a proposed start and duration against the booking rules.
///
/// # Errors
///
/// [`GameError::Validation`] if the duration is too short, the start is not in
/// the future, or the start is beyond the booking horizon.
pub fn validate_timing(
    rules: &BookingRules,
    now: DateTime<Utc>,
    start_time: DateTime<Utc>,
    duration_minutes: u32,
) -> Result<(), GameError> {
    if duration_minutes < rules.min_game_duration_minutes {
        return Err(GameError::Validation(format!(
            "Game must last at least {} minutes",
            rules.min_game_duration_minutes
        )));
    }
    if start_time <= now {
        return Err(GameError::Validation(
            "Game start time must be in the future".to_string(),
        ));
    }
    let horizon = now
        .checked_add_months(Months::new(rules.booking_horizon_months))
        .ok_or_else(|| GameError::Validation("Booking horizon is out of range".to_string()))?;
    if start_time > horizon {
        return Err(GameError::Validation(format!(
            "Games can be booked at most {} months ahead",
            rules.booking_horizon_months
        )));
    }
    Ok(())
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the game aggregate.
#[derive(Clone, Copy, Debug, Default)]
pub struct GameReducer;

impl GameReducer {
    /// Creates a new `GameReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn decide(
        state: &Game,
        action: GameAction,
        env: &GameEnvironment,
    ) -> Result<SmallVec<[GameEvent; 4]>, GameError> {
        let now = env.clock.now();

        match action {
            GameAction::Join { player } => {
                state.require_scheduled(now)?;
                state.roster.check_join(player, state.capacity)?;
                Ok(smallvec![GameEvent::PlayerJoined {
                    game: state.id,
                    player,
                    at: now,
                }])
            }

            GameAction::Leave { player } => {
                state.require_scheduled(now)?;
                state.roster.check_leave(player)?;
                Ok(smallvec![GameEvent::PlayerLeft {
                    game: state.id,
                    player,
                    at: now,
                }])
            }

            GameAction::Cancel { actor, reason } => {
                if !state.is_managed_by(&actor) {
                    return Err(GameError::NotPermitted(
                        "only the creator or an administrator can cancel a game".to_string(),
                    ));
                }
                state.require_scheduled(now)?;
                let reason = reason
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
                Ok(smallvec![GameEvent::GameCancelled {
                    game: state.id,
                    by: actor.player,
                    reason,
                    at: now,
                }])
            }

            GameAction::Reschedule {
                actor,
                start_time,
                duration_minutes,
                date,
                slot,
            } => {
                if !state.is_managed_by(&actor) {
                    return Err(GameError::NotPermitted(
                        "only the creator or an administrator can reschedule a game".to_string(),
                    ));
                }
                state.require_scheduled(now)?;
                validate_timing(&env.rules, now, start_time, duration_minutes)?;
                if start_time == state.start_time && duration_minutes == state.duration_minutes {
                    return Ok(SmallVec::new());
                }
                Ok(smallvec![GameEvent::GameRescheduled {
                    game: state.id,
                    previous_start: state.start_time,
                    previous_date: state.date,
                    previous_slot: state.slot,
                    start_time,
                    duration_minutes,
                    date,
                    slot,
                    at: now,
                }])
            }

            GameAction::Advance { now: sweep_time } => {
                let mut events = SmallVec::new();
                if state.status == GameStatus::Scheduled && sweep_time >= state.start_time {
                    events.push(GameEvent::GameStarted {
                        game: state.id,
                        at: sweep_time,
                    });
                }
                if matches!(state.status, GameStatus::Scheduled | GameStatus::InProgress)
                    && sweep_time >= state.end_time()
                {
                    events.push(GameEvent::GameCompleted {
                        game: state.id,
                        at: sweep_time,
                    });
                }
                Ok(events)
            }
        }
    }
}

impl Reducer for GameReducer {
    type State = Game;
    type Action = GameAction;
    type Event = GameEvent;
    type Error = GameError;
    type Environment = GameEnvironment;

    fn reduce(
        &self,
        state: &mut Game,
        action: GameAction,
        env: &GameEnvironment,
    ) -> Result<SmallVec<[GameEvent; 4]>, GameError> {
        let events = Self::decide(state, action, env)?;
        for event in &events {
            state.apply(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::roster::MembershipState;
    use courtbook_testing::{ReducerTest, assertions, test_clock, test_epoch};

    fn env() -> GameEnvironment {
        GameEnvironment::new(Arc::new(test_clock()), BookingRules::default())
    }

    /// A 60-minute game starting two hours after the test epoch
    fn scheduled_game(capacity: u32) -> Game {
        let start = test_epoch() + Duration::hours(2);
        Game::open(
            GameDraft {
                id: GameId::new(),
                court: CourtId::new(),
                creator: PlayerId::new(),
                sport: SportType::new("basketball").unwrap(),
                format: GameFormat::ThreeOnThree,
                skill_level: SkillLevel::Any,
                description: None,
                start_time: start,
                duration_minutes: 60,
                date: start.date_naive(),
                slot: SlotRange::new(480, 540).unwrap(),
                capacity,
            },
            test_epoch() - Duration::days(1),
        )
    }

    #[test]
    fn join_adds_a_confirmed_entry() {
        let game = scheduled_game(4);
        let player = PlayerId::new();

        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(game)
            .when_action(GameAction::Join { player })
            .then_state(move |game| {
                assert_eq!(game.roster.confirmed_count(), 2);
                let last = game.roster.entries().last().unwrap();
                assert_eq!(last.player, player);
                assert_eq!(last.state, MembershipState::Confirmed);
                assert_eq!(last.joined_at, test_epoch());
            })
            .then_events(|events| {
                assertions::assert_events_count(events, 1);
                assert!(matches!(events[0], GameEvent::PlayerJoined { .. }));
            })
            .run();
    }

    #[test]
    fn join_on_full_game_is_rejected() {
        let mut game = scheduled_game(2);
        game.roster.admit(PlayerId::new(), test_epoch());

        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(game)
            .when_action(GameAction::Join {
                player: PlayerId::new(),
            })
            .then_state(|game| assert_eq!(game.roster.confirmed_count(), 2))
            .then_error(|error| assert_eq!(error, &GameError::GameFull { capacity: 2 }))
            .run();
    }

    #[test]
    fn join_after_start_reports_in_progress() {
        let mut game = scheduled_game(4);
        game.start_time = test_epoch() - Duration::minutes(5);

        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(game)
            .when_action(GameAction::Join {
                player: PlayerId::new(),
            })
            .then_state(|game| assert_eq!(game.roster.confirmed_count(), 1))
            .then_error(|error| {
                assert_eq!(
                    error,
                    &GameError::InvalidStatus {
                        current: GameStatus::InProgress,
                        expected: GameStatus::Scheduled,
                    }
                );
            })
            .run();
    }

    #[test]
    fn join_on_cancelled_game_is_invalid_status() {
        let mut game = scheduled_game(4);
        game.status = GameStatus::Cancelled;

        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(game)
            .when_action(GameAction::Join {
                player: PlayerId::new(),
            })
            .then_error(|error| {
                assert!(matches!(
                    error,
                    GameError::InvalidStatus {
                        current: GameStatus::Cancelled,
                        ..
                    }
                ));
            })
            .run();
    }

    #[test]
    fn creator_cannot_leave() {
        let game = scheduled_game(4);
        let creator = game.creator;

        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(game)
            .when_action(GameAction::Leave { player: creator })
            .then_state(move |game| assert!(game.roster.contains(creator)))
            .then_error(|error| assert_eq!(error, &GameError::CreatorCannotLeave))
            .run();
    }

    #[test]
    fn leave_withdraws_the_player() {
        let mut game = scheduled_game(4);
        let player = PlayerId::new();
        game.roster.admit(player, test_epoch());

        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(game)
            .when_action(GameAction::Leave { player })
            .then_state(move |game| {
                assert!(!game.roster.contains(player));
                assert_eq!(game.roster.confirmed_count(), 1);
            })
            .then_events(|events| assertions::assert_events_count(events, 1))
            .run();
    }

    #[test]
    fn strangers_cannot_cancel() {
        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(scheduled_game(4))
            .when_action(GameAction::Cancel {
                actor: Actor::user(PlayerId::new()),
                reason: None,
            })
            .then_state(|game| assert_eq!(game.status, GameStatus::Scheduled))
            .then_error(|error| assert!(matches!(error, GameError::NotPermitted(_))))
            .run();
    }

    #[test]
    fn cancel_records_default_reason() {
        let game = scheduled_game(4);
        let creator = game.creator;

        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(game)
            .when_action(GameAction::Cancel {
                actor: Actor::user(creator),
                reason: Some("   ".to_string()),
            })
            .then_state(|game| {
                assert_eq!(game.status, GameStatus::Cancelled);
                assert_eq!(
                    game.cancellation_reason.as_deref(),
                    Some(DEFAULT_CANCEL_REASON)
                );
                assert_eq!(game.cancelled_at, Some(test_epoch()));
            })
            .then_events(|events| assertions::assert_events_count(events, 1))
            .run();
    }

    #[test]
    fn admins_can_cancel_any_game() {
        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(scheduled_game(4))
            .when_action(GameAction::Cancel {
                actor: Actor::admin(PlayerId::new()),
                reason: Some("Court flooded".to_string()),
            })
            .then_state(|game| {
                assert_eq!(game.cancellation_reason.as_deref(), Some("Court flooded"));
            })
            .then_events(|_| {})
            .run();
    }

    #[test]
    fn advance_is_a_no_op_before_start() {
        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(scheduled_game(4))
            .when_action(GameAction::Advance { now: test_epoch() })
            .then_state(|game| assert_eq!(game.status, GameStatus::Scheduled))
            .then_events(assertions::assert_no_events)
            .run();
    }

    #[test]
    fn advance_after_end_applies_both_transitions_in_order() {
        let late = test_epoch() + Duration::hours(5);

        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(scheduled_game(4))
            .when_action(GameAction::Advance { now: late })
            .then_state(|game| assert_eq!(game.status, GameStatus::Completed))
            .then_events(|events| {
                assertions::assert_events_count(events, 2);
                assert!(matches!(events[0], GameEvent::GameStarted { .. }));
                assert!(matches!(events[1], GameEvent::GameCompleted { .. }));
            })
            .run();
    }

    #[test]
    fn advance_never_leaves_terminal_states() {
        let mut game = scheduled_game(4);
        game.status = GameStatus::Cancelled;

        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(game)
            .when_action(GameAction::Advance {
                now: test_epoch() + Duration::days(3),
            })
            .then_state(|game| assert_eq!(game.status, GameStatus::Cancelled))
            .then_events(assertions::assert_no_events)
            .run();
    }

    #[test]
    fn reschedule_moves_the_game() {
        let game = scheduled_game(4);
        let creator = game.creator;
        let new_start = test_epoch() + Duration::days(1);

        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(game)
            .when_action(GameAction::Reschedule {
                actor: Actor::user(creator),
                start_time: new_start,
                duration_minutes: 90,
                date: new_start.date_naive(),
                slot: SlotRange::new(360, 450).unwrap(),
            })
            .then_state(move |game| {
                assert_eq!(game.start_time, new_start);
                assert_eq!(game.duration_minutes, 90);
                assert_eq!(game.slot, SlotRange::new(360, 450).unwrap());
            })
            .then_events(|events| assertions::assert_events_count(events, 1))
            .run();
    }

    #[test]
    fn reschedule_into_the_past_is_rejected() {
        let game = scheduled_game(4);
        let creator = game.creator;
        let past = test_epoch() - Duration::hours(1);

        ReducerTest::new(GameReducer::new())
            .with_env(env())
            .given_state(game)
            .when_action(GameAction::Reschedule {
                actor: Actor::user(creator),
                start_time: past,
                duration_minutes: 60,
                date: past.date_naive(),
                slot: SlotRange::new(300, 360).unwrap(),
            })
            .then_error(|error| assert!(matches!(error, GameError::Validation(_))))
            .run();
    }

    #[test]
    fn effective_status_follows_the_clock() {
        let game = scheduled_game(4);
        assert_eq!(game.effective_status(test_epoch()), GameStatus::Scheduled);
        assert_eq!(game.effective_status(game.start_time), GameStatus::InProgress);
        assert_eq!(game.effective_status(game.end_time()), GameStatus::Completed);
        assert_eq!(game.next_transition_at(), Some(game.start_time));
    }

    #[test]
    fn timing_rules() {
        let rules = BookingRules::default();
        let now = test_epoch();
        assert!(validate_timing(&rules, now, now + Duration::hours(1), 30).is_ok());
        assert!(validate_timing(&rules, now, now + Duration::hours(1), 29).is_err());
        assert!(validate_timing(&rules, now, now, 60).is_err());
        assert!(validate_timing(&rules, now, now + Duration::days(366), 60).is_err());
    }
}
