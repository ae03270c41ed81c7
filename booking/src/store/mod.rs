//! Persistence collaborator interfaces.
//!
//! The engine only depends on these traits. Mutating calls on schedules and
//! games are compare-and-swap writes: they name the [`Version`] the caller read
//! and fail with [`StoreError::ConcurrencyConflict`] if another writer got there
//! first. [`memory`] provides the in-process implementation used by the
//! binaries and tests; a database-backed implementation slots in behind the
//! same traits.
//!
//! All traits return [`StoreFuture`] so they can be shared as `Arc<dyn _>`.

use crate::availability::DaySchedule;
use crate::game::Game;
use crate::reminders::Reminder;
use crate::types::{
    Court, CourtId, GameId, GeoPoint, NearbyCourt, Page, PageRequest, PlayerId, ReminderId,
    SkillLevel, SportType,
};
use chrono::{DateTime, NaiveDate, Utc};
use courtbook_core::store::StoreFuture;
use courtbook_core::version::{Version, Versioned};

pub mod memory;

pub use courtbook_core::store::StoreError;
pub use memory::{InMemoryCourtStore, InMemoryGameStore, InMemoryReminderStore, InMemoryScheduleStore};

/// Registered courts.
pub trait CourtStore: Send + Sync {
    /// Store a new court.
    ///
    /// Fails with [`StoreError::ConcurrencyConflict`] if the id is taken.
    fn insert(&self, court: Court) -> StoreFuture<'_, ()>;

    /// Look up a court.
    fn get(&self, id: CourtId) -> StoreFuture<'_, Option<Court>>;

    /// Courts of any status within `radius_meters` of `center`, nearest first
    /// (ties by id).
    fn within(&self, center: GeoPoint, radius_meters: f64) -> StoreFuture<'_, Vec<NearbyCourt>>;
}

/// Per-(court, date) booked-slot documents.
pub trait ScheduleStore: Send + Sync {
    /// Read the schedule for one court and date.
    ///
    /// A date with no document reads as an empty schedule at [`Version::ABSENT`].
    fn load(&self, court: CourtId, date: NaiveDate) -> StoreFuture<'_, Versioned<DaySchedule>>;

    /// Replace the schedule if it is still at `expected`, returning the new version.
    fn compare_and_swap(&self, expected: Version, schedule: DaySchedule) -> StoreFuture<'_, Version>;
}

/// Which games a listing returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameQuery {
    /// Games the player created or holds a non-withdrawn roster entry in
    ForPlayer(PlayerId),
    /// Scheduled games starting in `[from, to)`, optionally narrowed
    Upcoming {
        /// Inclusive lower bound on start time
        from: DateTime<Utc>,
        /// Exclusive upper bound on start time
        to: DateTime<Utc>,
        /// Only this court
        court: Option<CourtId>,
        /// Only this sport
        sport: Option<SportType>,
    },
    /// Scheduled games at any of `courts` starting in `[from, to)`
    AtCourts {
        /// Candidate courts
        courts: Vec<CourtId>,
        /// Inclusive lower bound on start time
        from: DateTime<Utc>,
        /// Exclusive upper bound on start time
        to: DateTime<Utc>,
        /// Only this sport
        sport: Option<SportType>,
        /// Only this skill level
        skill_level: Option<SkillLevel>,
    },
    /// Games of any status starting in `[from, to)`
    StartingBetween {
        /// Inclusive lower bound on start time
        from: DateTime<Utc>,
        /// Exclusive upper bound on start time
        to: DateTime<Utc>,
    },
}

impl GameQuery {
    /// Whether `game` belongs in the result set
    #[must_use]
    pub fn matches(&self, game: &Game) -> bool {
        match self {
            Self::ForPlayer(player) => game.creator == *player || game.roster.contains(*player),
            Self::Upcoming {
                from,
                to,
                court,
                sport,
            } => {
                game.status == crate::types::GameStatus::Scheduled
                    && *from <= game.start_time
                    && game.start_time < *to
                    && court.is_none_or(|c| c == game.court)
                    && sport.as_ref().is_none_or(|s| *s == game.sport)
            }
            Self::AtCourts {
                courts,
                from,
                to,
                sport,
                skill_level,
            } => {
                game.status == crate::types::GameStatus::Scheduled
                    && *from <= game.start_time
                    && game.start_time < *to
                    && courts.contains(&game.court)
                    && sport.as_ref().is_none_or(|s| *s == game.sport)
                    && skill_level.is_none_or(|l| l == game.skill_level)
            }
            Self::StartingBetween { from, to } => *from <= game.start_time && game.start_time < *to,
        }
    }
}

/// Game documents.
pub trait GameStore: Send + Sync {
    /// Store a new game at version 1.
    ///
    /// Fails with [`StoreError::ConcurrencyConflict`] if the id is taken.
    fn insert(&self, game: Game) -> StoreFuture<'_, Version>;

    /// Read a game with its version.
    fn get(&self, id: GameId) -> StoreFuture<'_, Option<Versioned<Game>>>;

    /// Replace the game if it is still at `expected`, returning the new version.
    fn compare_and_swap(&self, expected: Version, game: Game) -> StoreFuture<'_, Version>;

    /// Matching games sorted by `(start_time, id)` ascending, one page at a time.
    fn list(&self, query: GameQuery, page: PageRequest) -> StoreFuture<'_, Page<Game>>;

    /// Up to `limit` games whose next lifecycle transition is due at `now`,
    /// earliest first.
    fn due_for_transition(&self, now: DateTime<Utc>, limit: usize) -> StoreFuture<'_, Vec<GameId>>;
}

/// Position after which the next page of due reminders starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReminderCursor {
    /// Fire time of the last reminder seen
    pub scheduled_for: DateTime<Utc>,
    /// Id of the last reminder seen
    pub id: ReminderId,
}

/// Reminder scheduling records.
pub trait ReminderStore: Send + Sync {
    /// Store a new reminder.
    fn insert(&self, reminder: Reminder) -> StoreFuture<'_, ()>;

    /// The live (not voided) reminder for a recipient, game and fire time, if any.
    fn find(
        &self,
        game: GameId,
        recipient: PlayerId,
        scheduled_for: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Reminder>>;

    /// Up to `limit` reminders with `scheduled_for <= now < expires_at` that are
    /// neither delivered nor voided, ordered by `(scheduled_for, id)` and
    /// strictly after `after`.
    fn due_page(
        &self,
        now: DateTime<Utc>,
        after: Option<ReminderCursor>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<Reminder>>;

    /// All reminders of a game
    fn for_game(&self, game: GameId) -> StoreFuture<'_, Vec<Reminder>>;

    /// Void undelivered reminders of a game, or of one recipient in it.
    /// Returns how many were voided.
    fn void(&self, game: GameId, recipient: Option<PlayerId>) -> StoreFuture<'_, usize>;

    /// Flag a reminder delivered. Returns `false` if it was already delivered or voided.
    fn mark_delivered(&self, id: ReminderId) -> StoreFuture<'_, bool>;
}
