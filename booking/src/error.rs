//! Error types for the booking engine.
//!
//! Each component rejects with its own error type; all of them convert into
//! [`BookingError`], the type every orchestrator operation returns.
//!
//! Business failures (bad input, slot taken, wrong lifecycle state, roster
//! rules) are expected outcomes and never logged above `warn`. Only
//! [`BookingError::System`] represents something going wrong.

use crate::types::{CourtId, GameStatus, PlayerId, SlotRange};
use chrono::NaiveDate;
use courtbook_core::retry::Conflict;
use courtbook_core::store::StoreError;
use thiserror::Error;

/// Rejections produced by the game reducer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// The game is not in the lifecycle state the action requires
    #[error("Game is {current}, but the operation requires {expected}")]
    InvalidStatus {
        /// Effective status of the game
        current: GameStatus,
        /// Status the operation requires
        expected: GameStatus,
    },

    /// No confirmed place left
    #[error("Game is full ({capacity} players)")]
    GameFull {
        /// The game's capacity
        capacity: u32,
    },

    /// The player is already on the roster
    #[error("Player {player} already joined this game")]
    AlreadyJoined {
        /// The joining player
        player: PlayerId,
    },

    /// The player is not on the roster
    #[error("Player {player} is not a participant of this game")]
    NotAParticipant {
        /// The leaving player
        player: PlayerId,
    },

    /// The creator tried to leave their own game
    #[error("The creator cannot leave the game; cancel it instead")]
    CreatorCannotLeave,

    /// The actor may not perform this action on this game
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// The requested change is malformed or out of range
    #[error("{0}")]
    Validation(String),
}

/// Failures of the availability model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityError {
    /// The requested range overlaps a slot booked by another game
    #[error("Court {court} is already booked {existing} on {date} (requested {requested})")]
    SlotConflict {
        /// The court
        court: CourtId,
        /// Local calendar date
        date: NaiveDate,
        /// The range that was asked for
        requested: SlotRange,
        /// The booked range it collides with
        existing: SlotRange,
    },

    /// The schedule store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Conflict for AvailabilityError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}

/// Unexpected failures. Fatal to the request, never to shared state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    /// A persistence collaborator failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Internal state contradicts an invariant
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

/// Errors returned by the booking orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Malformed or out-of-range input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The requested slot is taken
    #[error("Court {court} is not available {requested} on {date}")]
    NotAvailable {
        /// The court
        court: CourtId,
        /// Local calendar date
        date: NaiveDate,
        /// The range that was asked for
        requested: SlotRange,
    },

    /// The game is not in the required lifecycle state
    #[error("Invalid game status: {current} (expected {expected})")]
    InvalidStatus {
        /// Effective status of the game
        current: GameStatus,
        /// Required status
        expected: GameStatus,
    },

    /// The roster is at capacity
    #[error("Game is full ({capacity} players)")]
    GameFull {
        /// The game's capacity
        capacity: u32,
    },

    /// The player is already on the roster
    #[error("Player already joined this game")]
    AlreadyJoined,

    /// The player is not on the roster
    #[error("Player is not a participant of this game")]
    NotAParticipant,

    /// The creator tried to leave their own game
    #[error("The creator cannot leave the game; cancel it instead")]
    CreatorCannotLeave,

    /// Unknown court or game
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity ("court", "game")
        entity: &'static str,
        /// The id that was looked up
        id: String,
    },

    /// The actor lacks the rights for this operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unexpected failure
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

impl BookingError {
    /// Shorthand for [`BookingError::NotFound`]
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether this is an expected business outcome rather than a failure.
    #[must_use]
    pub const fn is_business(&self) -> bool {
        !matches!(self, Self::System(_))
    }

    /// Short label for metrics and logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotAvailable { .. } => "not_available",
            Self::InvalidStatus { .. } => "invalid_status",
            Self::GameFull { .. } => "game_full",
            Self::AlreadyJoined => "already_joined",
            Self::NotAParticipant => "not_a_participant",
            Self::CreatorCannotLeave => "creator_cannot_leave",
            Self::NotFound { .. } => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::System(_) => "system",
        }
    }
}

impl Conflict for BookingError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::System(SystemError::Store(e)) if e.is_conflict())
    }
}

impl From<StoreError> for BookingError {
    fn from(error: StoreError) -> Self {
        Self::System(SystemError::Store(error))
    }
}

impl From<GameError> for BookingError {
    fn from(error: GameError) -> Self {
        match error {
            GameError::InvalidStatus { current, expected } => {
                Self::InvalidStatus { current, expected }
            }
            GameError::GameFull { capacity } => Self::GameFull { capacity },
            GameError::AlreadyJoined { .. } => Self::AlreadyJoined,
            GameError::NotAParticipant { .. } => Self::NotAParticipant,
            GameError::CreatorCannotLeave => Self::CreatorCannotLeave,
            GameError::NotPermitted(reason) => Self::Forbidden(reason),
            GameError::Validation(reason) => Self::Validation(reason),
        }
    }
}

impl From<AvailabilityError> for BookingError {
    fn from(error: AvailabilityError) -> Self {
        match error {
            AvailabilityError::SlotConflict {
                court,
                date,
                requested,
                ..
            } => Self::NotAvailable {
                court,
                date,
                requested,
            },
            AvailabilityError::Store(e) => e.into(),
        }
    }
}

/// Result alias for orchestrator operations
pub type BookingResult<T> = Result<T, BookingError>;
