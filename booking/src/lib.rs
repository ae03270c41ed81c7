//! Courtbook - court booking and game lifecycle engine
//!
//! Players book shared sports courts for time-boxed group games. The engine
//! guarantees that no two games overlap on the same court and that no roster
//! exceeds its capacity, even under concurrent requests.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────────┐
//!   Actor ───────▶ │      BookingService      │ ◀─── queries
//!                  └──────────────────────────┘
//!                     │          │          │
//!          reserve /  │          │ reduce   │ schedule / void
//!          release    ▼          ▼          ▼
//!           ┌──────────────┐ ┌────────┐ ┌───────────────────┐
//!           │ Availability │ │  Game  │ │ ReminderScheduler │
//!           └──────────────┘ └────────┘ └───────────────────┘
//!                  │             │  ▲              │
//!                  ▼             ▼  │              ▼
//!           ScheduleStore   GameStore ◀── LifecycleSweeper
//!                                          ReminderDispatcher ──▶ NotificationSink
//! ```
//!
//! # Key Features
//!
//! ## 1. Conflict-free slot reservation
//!
//! Each court's day is one versioned document. A reservation reads it, checks
//! the half-open overlap rule (`s1 < e2 && s2 < e1`), and commits with a
//! compare-and-swap. Losers re-read and either find the slot taken
//! (`NotAvailable`) or commit on the fresh version.
//!
//! ## 2. Roster changes under optimistic concurrency
//!
//! Join, leave, cancel and reschedule run the [`game::GameReducer`] against a
//! freshly loaded game and commit conditionally on its version, so a join
//! racing a cancel can never land on a cancelled game.
//!
//! ## 3. Explicit lifecycle sweep
//!
//! `scheduled → in_progress → completed` happens only in
//! [`sweep::LifecycleSweeper`], an idempotent periodic job. Reads never change
//! state.
//!
//! ## 4. Reminders as queries
//!
//! Reminders are records with a fire time and an expiry. Due reminders are a
//! lazy stream over the store, re-queried on every dispatcher tick.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod availability;
pub mod config;
pub mod error;
pub mod game;
pub mod lifecycle;
pub mod metrics;
pub mod notify;
pub mod reminders;
pub mod roster;
pub mod store;
pub mod sweep;
pub mod types;

pub use app::{
    BookingEnvironment, BookingService, GameStats, NearbyFilter, NewCourt, NewGame, UpcomingFilter,
};
pub use availability::{Availability, DaySchedule, Reservation, TimeSlot};
pub use config::{BookingRules, Config};
pub use error::{AvailabilityError, BookingError, BookingResult, GameError, SystemError};
pub use game::{Game, GameAction, GameEvent, GameReducer};
pub use lifecycle::Workers;
pub use notify::{InMemoryOutbox, LogNotificationSink, Notification, NotificationKind, NotificationSink};
pub use reminders::{DispatchReport, Reminder, ReminderDispatcher, ReminderScheduler};
pub use roster::{MembershipState, Roster, RosterEntry};
pub use sweep::{LifecycleSweeper, SweepReport};
pub use types::*;
