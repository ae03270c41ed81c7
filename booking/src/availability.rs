//! Court-slot availability.
//!
//! Booked slots are kept in one document per (court, local date). Reserving a
//! slot is a single read-check-write on that document committed with a
//! compare-and-swap on its version: two callers racing for overlapping ranges
//! cannot both commit, and the loser re-reads and re-checks under the retry
//! policy. A date without a document is entirely free.

use crate::error::AvailabilityError;
use crate::metrics;
use crate::store::ScheduleStore;
use crate::types::{CourtId, GameId, SlotRange};
use chrono::NaiveDate;
use courtbook_core::retry::{RetryPolicy, retry_on_conflict};
use courtbook_core::store::with_timeout;
use courtbook_core::version::Version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// One range on a court's day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Minutes of the day covered
    pub range: SlotRange,
    /// Game holding the slot
    pub game: Option<GameId>,
    /// Whether the slot blocks other bookings
    pub booked: bool,
}

impl TimeSlot {
    /// A slot booked by `game`
    #[must_use]
    pub const fn booked_by(range: SlotRange, game: GameId) -> Self {
        Self {
            range,
            game: Some(game),
            booked: true,
        }
    }

    fn is_held_by(&self, game: GameId) -> bool {
        self.game == Some(game)
    }
}

/// All slots of one court on one local date, ordered by start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    /// Court
    pub court: CourtId,
    /// Court-local date
    pub date: NaiveDate,
    /// Slots, sorted by range
    pub slots: Vec<TimeSlot>,
}

impl DaySchedule {
    /// An empty day: the court is free throughout.
    #[must_use]
    pub const fn new(court: CourtId, date: NaiveDate) -> Self {
        Self {
            court,
            date,
            slots: Vec::new(),
        }
    }

    /// The booked slot `range` would collide with, ignoring slots held by `game`.
    #[must_use]
    pub fn conflict_with(&self, range: SlotRange, game: Option<GameId>) -> Option<&TimeSlot> {
        self.slots.iter().find(|slot| {
            slot.booked
                && slot.range.overlaps(&range)
                && !game.is_some_and(|g| slot.is_held_by(g))
        })
    }

    /// Booked slots only
    pub fn booked(&self) -> impl Iterator<Item = &TimeSlot> + '_ {
        self.slots.iter().filter(|slot| slot.booked)
    }

    fn insert(&mut self, slot: TimeSlot) {
        let at = self.slots.partition_point(|s| s.range < slot.range);
        self.slots.insert(at, slot);
    }
}

/// A committed slot reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Court
    pub court: CourtId,
    /// Court-local date
    pub date: NaiveDate,
    /// Reserved range
    pub range: SlotRange,
    /// Game holding the reservation
    pub game: GameId,
    /// Schedule version the reservation is visible at
    pub version: Version,
}

/// The availability model.
#[derive(Clone)]
pub struct Availability {
    schedules: Arc<dyn ScheduleStore>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Availability {
    /// Create the model over a schedule store.
    #[must_use]
    pub fn new(schedules: Arc<dyn ScheduleStore>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            schedules,
            retry,
            timeout,
        }
    }

    /// Whether `range` on `date` is free on `court`.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::Store`] if the schedule cannot be read.
    pub async fn check_available(
        &self,
        court: CourtId,
        date: NaiveDate,
        range: SlotRange,
    ) -> Result<bool, AvailabilityError> {
        let schedule = with_timeout(self.timeout, self.schedules.load(court, date)).await?;
        Ok(schedule.value.conflict_with(range, None).is_none())
    }

    /// Atomically reserve `range` on `date` for `game`.
    ///
    /// Slots already held by `game` do not count as conflicts, and reserving a
    /// range `game` already holds returns the existing reservation.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::SlotConflict`] if another game holds an
    /// overlapping slot, or [`AvailabilityError::Store`] if the store fails or
    /// the conflict retries run out. A [`StoreError::Timeout`] leaves the
    /// outcome unknown; use [`Availability::reservation_for`] to find out.
    ///
    /// [`StoreError::Timeout`]: courtbook_core::store::StoreError::Timeout
    #[instrument(skip_all, fields(%court, %date, %range, %game))]
    pub async fn reserve(
        &self,
        court: CourtId,
        date: NaiveDate,
        range: SlotRange,
        game: GameId,
    ) -> Result<Reservation, AvailabilityError> {
        retry_on_conflict(&self.retry, || async move {
            let current = with_timeout(self.timeout, self.schedules.load(court, date)).await?;
            let mut schedule = current.value;

            if schedule
                .slots
                .iter()
                .any(|slot| slot.is_held_by(game) && slot.range == range)
            {
                debug!("Slot already held by this game");
                return Ok(Reservation {
                    court,
                    date,
                    range,
                    game,
                    version: current.version,
                });
            }

            if let Some(existing) = schedule.conflict_with(range, Some(game)) {
                warn!(existing = %existing.range, "Slot conflict");
                metrics::record_slot_conflict();
                return Err(AvailabilityError::SlotConflict {
                    court,
                    date,
                    requested: range,
                    existing: existing.range,
                });
            }

            schedule.insert(TimeSlot::booked_by(range, game));
            let version = with_timeout(
                self.timeout,
                self.schedules.compare_and_swap(current.version, schedule),
            )
            .await?;

            info!(%version, "Slot reserved");
            Ok::<_, AvailabilityError>(Reservation {
                court,
                date,
                range,
                game,
                version,
            })
        })
        .await
    }

    /// Release the slot `game` holds at exactly `range`.
    ///
    /// Returns whether a slot was removed; releasing nothing is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::Store`] if the store fails or the conflict
    /// retries run out.
    #[instrument(skip_all, fields(%court, %date, %range, %game))]
    pub async fn release(
        &self,
        court: CourtId,
        date: NaiveDate,
        range: SlotRange,
        game: GameId,
    ) -> Result<bool, AvailabilityError> {
        retry_on_conflict(&self.retry, || async move {
            let current = with_timeout(self.timeout, self.schedules.load(court, date)).await?;
            let mut schedule = current.value;

            let before = schedule.slots.len();
            schedule
                .slots
                .retain(|slot| !(slot.is_held_by(game) && slot.range == range));
            if schedule.slots.len() == before {
                debug!("Nothing to release");
                return Ok(false);
            }

            with_timeout(
                self.timeout,
                self.schedules.compare_and_swap(current.version, schedule),
            )
            .await?;
            info!("Slot released");
            Ok::<_, AvailabilityError>(true)
        })
        .await
    }

    /// The reservation `game` holds on `court` and `date`, if any.
    ///
    /// This is the reconciliation read after a reservation attempt with an
    /// unknown outcome.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::Store`] if the schedule cannot be read.
    pub async fn reservation_for(
        &self,
        court: CourtId,
        date: NaiveDate,
        game: GameId,
    ) -> Result<Option<Reservation>, AvailabilityError> {
        let current = with_timeout(self.timeout, self.schedules.load(court, date)).await?;
        Ok(current
            .value
            .slots
            .iter()
            .find(|slot| slot.is_held_by(game))
            .map(|slot| Reservation {
                court,
                date,
                range: slot.range,
                game,
                version: current.version,
            }))
    }

    /// Booked slots of a court on a date, in start order.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::Store`] if the schedule cannot be read.
    pub async fn booked_slots(
        &self,
        court: CourtId,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, AvailabilityError> {
        let current = with_timeout(self.timeout, self.schedules.load(court, date)).await?;
        Ok(current.value.booked().copied().collect())
    }
}
