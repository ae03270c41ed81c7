//! Shared fixtures for the integration tests.
//!
//! Every harness starts at `test_epoch()` (2025-06-01 06:00 UTC) with one
//! active basketball court in UTC, open 08:00-22:00.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, TimeZone, Utc};
use courtbook::{
    Actor, BookingEnvironment, BookingRules, BookingService, Court, CourtId, GameFormat, GeoPoint,
    InMemoryOutbox, Location, NewCourt, NewGame, PlayerId, SkillLevel, SportType, WorkingHours,
};
use courtbook_core::retry::RetryPolicy;
use courtbook_testing::{ManualClock, test_epoch};
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub clock: ManualClock,
    pub outbox: Arc<InMemoryOutbox>,
    pub service: Arc<BookingService>,
    pub court: Court,
    pub admin: Actor,
}

impl Harness {
    /// A game on the harness court
    pub fn game(&self, start: DateTime<Utc>, minutes: u32, capacity: u32) -> NewGame {
        new_game(self.court.id, start, minutes, capacity)
    }
}

/// Default rules with a retry budget large enough for heavy contention.
pub fn contention_rules() -> BookingRules {
    BookingRules {
        retry: RetryPolicy::builder()
            .max_retries(500)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .build(),
        ..BookingRules::default()
    }
}

pub async fn harness() -> Harness {
    harness_with(contention_rules(), |env| env).await
}

pub async fn harness_with<F>(rules: BookingRules, customize: F) -> Harness
where
    F: FnOnce(BookingEnvironment) -> BookingEnvironment,
{
    courtbook_testing::init_test_tracing();
    let clock = ManualClock::starting_at(test_epoch());
    let outbox = Arc::new(InMemoryOutbox::new());
    let env = customize(BookingEnvironment::in_memory(
        Arc::new(clock.clone()),
        outbox.clone(),
        rules,
    ));
    let service = Arc::new(BookingService::new(env));
    let admin = Actor::admin(PlayerId::new());
    let court = service
        .register_court(
            admin,
            NewCourt {
                name: "Central Court".to_string(),
                location: Location {
                    point: GeoPoint::new(-0.1276, 51.5072).unwrap(),
                    address: "1 Park Lane".to_string(),
                },
                sport_types: vec![basketball()],
                timezone: chrono_tz::UTC,
                working_hours: WorkingHours::default(),
            },
        )
        .await
        .expect("court registers");

    Harness {
        clock,
        outbox,
        service,
        court,
        admin,
    }
}

pub fn basketball() -> SportType {
    SportType::new("basketball").unwrap()
}

/// An instant on 2025-06-01 (UTC)
pub fn game_day(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
}

pub fn new_game(court: CourtId, start: DateTime<Utc>, minutes: u32, capacity: u32) -> NewGame {
    NewGame {
        court,
        sport: basketball(),
        format: GameFormat::FiveOnFive,
        skill_level: SkillLevel::Any,
        description: Some("Pickup game".to_string()),
        start_time: start,
        duration_minutes: minutes,
        capacity,
    }
}

pub fn player() -> Actor {
    Actor::user(PlayerId::new())
}
