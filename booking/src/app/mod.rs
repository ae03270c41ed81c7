//! Booking orchestrator.
//!
//! [`BookingService`] is the entry point for every use case. It composes the
//! availability model, the game reducer and the reminder scheduler over the
//! collaborators in a [`BookingEnvironment`]:
//!
//! ```text
//! create:  validate ─▶ reserve slot ─▶ insert game ─▶ creator reminder
//!                          ▲                 │
//!                          └── release ◀─────┘ (insert failed)
//!
//! join/leave/cancel/reschedule:
//!          load game ─▶ reducer ─▶ compare-and-swap ─▶ follow-up effects
//!              ▲                          │
//!              └────── conflict ──────────┘
//! ```
//!
//! Follow-up effects (slot release after cancel, reminders, notifications)
//! run after the game commit and never fail the operation.

mod queries;
mod service;

pub use queries::{GameStats, NearbyFilter, UpcomingFilter};
pub use service::BookingService;

use crate::config::BookingRules;
use crate::notify::NotificationSink;
use crate::store::{
    CourtStore, GameStore, InMemoryCourtStore, InMemoryGameStore, InMemoryReminderStore,
    InMemoryScheduleStore, ReminderStore, ScheduleStore,
};
use crate::types::{CourtId, GameFormat, Location, SkillLevel, SportType, WorkingHours};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use courtbook_core::environment::Clock;
use std::sync::Arc;

/// Collaborators the booking service is built from.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Source of "now"
    pub clock: Arc<dyn Clock>,
    /// Registered courts
    pub courts: Arc<dyn CourtStore>,
    /// Booked slots per court and date
    pub schedules: Arc<dyn ScheduleStore>,
    /// Games
    pub games: Arc<dyn GameStore>,
    /// Reminder records
    pub reminders: Arc<dyn ReminderStore>,
    /// Delivery collaborator
    pub notifications: Arc<dyn NotificationSink>,
    /// Booking rules
    pub rules: BookingRules,
}

impl BookingEnvironment {
    /// An environment backed by the in-memory stores.
    #[must_use]
    pub fn in_memory(
        clock: Arc<dyn Clock>,
        notifications: Arc<dyn NotificationSink>,
        rules: BookingRules,
    ) -> Self {
        Self {
            clock,
            courts: Arc::new(InMemoryCourtStore::new()),
            schedules: Arc::new(InMemoryScheduleStore::new()),
            games: Arc::new(InMemoryGameStore::new()),
            reminders: Arc::new(InMemoryReminderStore::new()),
            notifications,
            rules,
        }
    }
}

/// Input for registering a court.
#[derive(Clone, Debug)]
pub struct NewCourt {
    /// Display name
    pub name: String,
    /// Where the court is
    pub location: Location,
    /// Sports played there; at least one
    pub sport_types: Vec<SportType>,
    /// IANA timezone of the court
    pub timezone: Tz,
    /// Opening hours
    pub working_hours: WorkingHours,
}

/// Input for creating a game.
#[derive(Clone, Debug)]
pub struct NewGame {
    /// Court to book
    pub court: CourtId,
    /// Sport, must be supported by the court
    pub sport: SportType,
    /// Format
    pub format: GameFormat,
    /// Expected skill level
    pub skill_level: SkillLevel,
    /// Free-text description
    pub description: Option<String>,
    /// Start instant
    pub start_time: DateTime<Utc>,
    /// Length in minutes
    pub duration_minutes: u32,
    /// Maximum confirmed players, creator included
    pub capacity: u32,
}
