//! In-memory store implementations.
//!
//! Every document lives behind a `tokio::sync::RwLock`; a compare-and-swap
//! holds the write lock across its version check and its write, which is what
//! makes it atomic.

use super::{CourtStore, GameQuery, GameStore, ReminderCursor, ReminderStore, ScheduleStore};
use crate::availability::DaySchedule;
use crate::game::Game;
use crate::reminders::Reminder;
use crate::types::{
    Court, CourtId, GameId, GeoPoint, NearbyCourt, Page, PageRequest, PlayerId, ReminderId,
};
use chrono::{DateTime, NaiveDate, Utc};
use courtbook_core::store::{StoreError, StoreFuture};
use courtbook_core::version::{Version, Versioned};
use std::collections::HashMap;
use tokio::sync::RwLock;

// ============================================================================
// Courts
// ============================================================================

/// In-memory [`CourtStore`].
#[derive(Debug, Default)]
pub struct InMemoryCourtStore {
    courts: RwLock<HashMap<CourtId, Court>>,
}

impl InMemoryCourtStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CourtStore for InMemoryCourtStore {
    fn insert(&self, court: Court) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut courts = self.courts.write().await;
            if courts.contains_key(&court.id) {
                return Err(StoreError::ConcurrencyConflict {
                    key: format!("court/{}", court.id),
                    expected: Version::ABSENT,
                    actual: Version::new(1),
                });
            }
            courts.insert(court.id, court);
            Ok(())
        })
    }

    fn get(&self, id: CourtId) -> StoreFuture<'_, Option<Court>> {
        Box::pin(async move { Ok(self.courts.read().await.get(&id).cloned()) })
    }

    fn within(&self, center: GeoPoint, radius_meters: f64) -> StoreFuture<'_, Vec<NearbyCourt>> {
        Box::pin(async move {
            let courts = self.courts.read().await;
            let mut found: Vec<NearbyCourt> = courts
                .values()
                .filter_map(|court| {
                    let distance_meters = center.distance_meters(&court.location.point);
                    (distance_meters <= radius_meters).then(|| NearbyCourt {
                        court: court.clone(),
                        distance_meters,
                    })
                })
                .collect();
            found.sort_by(|a, b| {
                a.distance_meters
                    .total_cmp(&b.distance_meters)
                    .then(a.court.id.cmp(&b.court.id))
            });
            Ok(found)
        })
    }
}

// ============================================================================
// Schedules
// ============================================================================

/// In-memory [`ScheduleStore`] keyed by (court, date).
#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    days: RwLock<HashMap<(CourtId, NaiveDate), Versioned<DaySchedule>>>,
}

impl InMemoryScheduleStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduleStore for InMemoryScheduleStore {
    fn load(&self, court: CourtId, date: NaiveDate) -> StoreFuture<'_, Versioned<DaySchedule>> {
        Box::pin(async move {
            let days = self.days.read().await;
            Ok(days
                .get(&(court, date))
                .cloned()
                .unwrap_or_else(|| Versioned::absent(DaySchedule::new(court, date))))
        })
    }

    fn compare_and_swap(&self, expected: Version, schedule: DaySchedule) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let key = (schedule.court, schedule.date);
            let mut days = self.days.write().await;
            let actual = days.get(&key).map_or(Version::ABSENT, |doc| doc.version);
            if actual != expected {
                return Err(StoreError::ConcurrencyConflict {
                    key: format!("schedule/{}/{}", schedule.court, schedule.date),
                    expected,
                    actual,
                });
            }
            let version = actual.next();
            days.insert(key, Versioned::new(schedule, version));
            Ok(version)
        })
    }
}

// ============================================================================
// Games
// ============================================================================

/// In-memory [`GameStore`].
#[derive(Debug, Default)]
pub struct InMemoryGameStore {
    games: RwLock<HashMap<GameId, Versioned<Game>>>,
}

impl InMemoryGameStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GameStore for InMemoryGameStore {
    fn insert(&self, game: Game) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let mut games = self.games.write().await;
            if let Some(existing) = games.get(&game.id) {
                return Err(StoreError::ConcurrencyConflict {
                    key: format!("game/{}", game.id),
                    expected: Version::ABSENT,
                    actual: existing.version,
                });
            }
            let version = Version::ABSENT.next();
            games.insert(game.id, Versioned::new(game, version));
            Ok(version)
        })
    }

    fn get(&self, id: GameId) -> StoreFuture<'_, Option<Versioned<Game>>> {
        Box::pin(async move { Ok(self.games.read().await.get(&id).cloned()) })
    }

    fn compare_and_swap(&self, expected: Version, game: Game) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let mut games = self.games.write().await;
            let Some(current) = games.get_mut(&game.id) else {
                return Err(StoreError::NotFound(format!("game/{}", game.id)));
            };
            if current.version != expected {
                return Err(StoreError::ConcurrencyConflict {
                    key: format!("game/{}", game.id),
                    expected,
                    actual: current.version,
                });
            }
            let version = expected.next();
            *current = Versioned::new(game, version);
            Ok(version)
        })
    }

    fn list(&self, query: GameQuery, page: PageRequest) -> StoreFuture<'_, Page<Game>> {
        Box::pin(async move {
            let games = self.games.read().await;
            let mut matching: Vec<Game> = games
                .values()
                .filter(|doc| query.matches(&doc.value))
                .map(|doc| doc.value.clone())
                .collect();
            matching.sort_by(|a, b| (a.start_time, a.id).cmp(&(b.start_time, b.id)));
            Ok(Page::from_sorted(matching, page))
        })
    }

    fn due_for_transition(&self, now: DateTime<Utc>, limit: usize) -> StoreFuture<'_, Vec<GameId>> {
        Box::pin(async move {
            let games = self.games.read().await;
            let mut due: Vec<(DateTime<Utc>, GameId)> = games
                .values()
                .filter_map(|doc| {
                    doc.value
                        .next_transition_at()
                        .filter(|at| *at <= now)
                        .map(|at| (at, doc.value.id))
                })
                .collect();
            due.sort_unstable();
            Ok(due.into_iter().take(limit).map(|(_, id)| id).collect())
        })
    }
}

// ============================================================================
// Reminders
// ============================================================================

/// In-memory [`ReminderStore`].
#[derive(Debug, Default)]
pub struct InMemoryReminderStore {
    reminders: RwLock<HashMap<ReminderId, Reminder>>,
}

impl InMemoryReminderStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReminderStore for InMemoryReminderStore {
    fn insert(&self, reminder: Reminder) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.reminders.write().await.insert(reminder.id, reminder);
            Ok(())
        })
    }

    fn find(
        &self,
        game: GameId,
        recipient: PlayerId,
        scheduled_for: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Reminder>> {
        Box::pin(async move {
            let reminders = self.reminders.read().await;
            Ok(reminders
                .values()
                .find(|r| {
                    r.game == game
                        && r.recipient == recipient
                        && r.scheduled_for == scheduled_for
                        && !r.voided
                })
                .cloned())
        })
    }

    fn due_page(
        &self,
        now: DateTime<Utc>,
        after: Option<ReminderCursor>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<Reminder>> {
        Box::pin(async move {
            let reminders = self.reminders.read().await;
            let mut due: Vec<Reminder> = reminders
                .values()
                .filter(|r| r.is_pending_at(now))
                .filter(|r| after.is_none_or(|cursor| r.cursor() > cursor))
                .cloned()
                .collect();
            due.sort_by_key(Reminder::cursor);
            due.truncate(limit);
            Ok(due)
        })
    }

    fn for_game(&self, game: GameId) -> StoreFuture<'_, Vec<Reminder>> {
        Box::pin(async move {
            let reminders = self.reminders.read().await;
            let mut found: Vec<Reminder> = reminders.values().filter(|r| r.game == game).cloned().collect();
            found.sort_by_key(Reminder::cursor);
            Ok(found)
        })
    }

    fn void(&self, game: GameId, recipient: Option<PlayerId>) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let mut reminders = self.reminders.write().await;
            let mut voided = 0;
            for reminder in reminders.values_mut() {
                if reminder.game == game
                    && recipient.is_none_or(|p| p == reminder.recipient)
                    && !reminder.delivered
                    && !reminder.voided
                {
                    reminder.voided = true;
                    voided += 1;
                }
            }
            Ok(voided)
        })
    }

    fn mark_delivered(&self, id: ReminderId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut reminders = self.reminders.write().await;
            match reminders.get_mut(&id) {
                Some(reminder) if !reminder.delivered && !reminder.voided => {
                    reminder.delivered = true;
                    Ok(true)
                }
                Some(_) => Ok(false),
                None => Err(StoreError::NotFound(format!("reminder/{id}"))),
            }
        })
    }
}
