//! Courtbook Demo
//!
//! Scripted walk-through of the booking engine on a hand-driven clock:
//! - Slot conflicts and touching boundaries
//! - Capacity and duplicate-join rejections
//! - Reminder windows
//! - Cancellation freeing a slot
//! - The lifecycle sweep and reminder delivery
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin demo
//! ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use courtbook::{
    Actor, BookingEnvironment, BookingResult, BookingRules, BookingService, GameFormat, GeoPoint,
    InMemoryOutbox, Location, NewCourt, NewGame, PlayerId, SkillLevel, SportType, WorkingHours,
};
use courtbook_core::environment::Clock;
use std::sync::{Arc, PoisonError, RwLock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Clock the demo moves by hand.
#[derive(Debug)]
struct DemoClock(RwLock<DateTime<Utc>>);

impl DemoClock {
    fn advance_to(&self, time: DateTime<Utc>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = time;
    }
}

impl Clock for DemoClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }
}

fn outcome<T>(label: &str, result: &BookingResult<T>) {
    match result {
        Ok(_) => println!("   ✓ {label}: ok"),
        Err(e) => println!("   ✗ {label}: {e}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,courtbook=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("\n============================================");
    println!("   Courtbook - Booking Engine Demo");
    println!("============================================\n");

    let day_before = Utc.with_ymd_and_hms(2025, 5, 31, 9, 0, 0).single().ok_or("bad date")?;
    let game_day = |hour: u32, minute: u32| {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0)
            .single()
            .ok_or("bad date")
    };

    let clock = Arc::new(DemoClock(RwLock::new(day_before)));
    let outbox = Arc::new(InMemoryOutbox::new());
    let service = BookingService::new(BookingEnvironment::in_memory(
        clock.clone(),
        outbox.clone(),
        BookingRules::default(),
    ));

    let admin = Actor::admin(PlayerId::new());
    let alice = Actor::user(PlayerId::new());
    let bob = Actor::user(PlayerId::new());
    let carol = Actor::user(PlayerId::new());
    let basketball = SportType::new("Basketball")?;

    let court = service
        .register_court(
            admin,
            NewCourt {
                name: "Riverside Court".to_string(),
                location: Location {
                    point: GeoPoint::new(23.7275, 37.9838)?,
                    address: "1 Riverside Walk".to_string(),
                },
                sport_types: vec![basketball.clone()],
                timezone: chrono_tz::UTC,
                working_hours: WorkingHours::default(),
            },
        )
        .await?;
    println!("Registered {} ({})\n", court.name, court.id);

    let new_game = |start: DateTime<Utc>, minutes: u32, capacity: u32| NewGame {
        court: court.id,
        sport: basketball.clone(),
        format: GameFormat::ThreeOnThree,
        skill_level: SkillLevel::Any,
        description: None,
        start_time: start,
        duration_minutes: minutes,
        capacity,
    };

    // ========== Slot conflicts ==========
    println!("1. Slot conflicts on 2025-06-01");
    let first = service.create_game(alice, new_game(game_day(10, 0)?, 60, 6)).await;
    outcome("10:00-11:00", &first);
    let first = first?;
    outcome(
        "10:30-11:30",
        &service.create_game(bob, new_game(game_day(10, 30)?, 60, 6)).await,
    );
    let touching = service.create_game(bob, new_game(game_day(11, 0)?, 60, 2)).await;
    outcome("11:00-12:00 (touching)", &touching);
    let touching = touching?;
    for slot in service.court_schedule(court.id, first.date).await? {
        println!("   booked {}", slot.range);
    }

    // ========== Roster rules ==========
    println!("\n2. Roster rules (capacity 2)");
    outcome("carol joins", &service.join_game(carol, touching.id).await);
    outcome("alice joins", &service.join_game(alice, touching.id).await);
    outcome("carol joins again", &service.join_game(carol, touching.id).await);
    outcome("bob (creator) leaves", &service.leave_game(bob, touching.id).await);

    // ========== Reminders ==========
    println!("\n3. Reminder windows (lead time 60 minutes)");
    clock.advance_to(game_day(9, 30)?);
    let scheduler = service.reminder_scheduler();
    println!(
        "   game at 10:00, now 09:30: {} reminder(s) for alice",
        scheduler
            .reminders_for(first.id)
            .await?
            .iter()
            .filter(|r| r.recipient == alice.player)
            .count()
    );
    let later = service.create_game(carol, new_game(game_day(17, 0)?, 90, 4)).await?;
    if let Some(reminder) = scheduler.reminders_for(later.id).await?.first() {
        println!(
            "   game at 17:00 created at 09:30: reminder fires {}, expires {}",
            reminder.scheduled_for, reminder.expires_at
        );
    }

    // ========== Cancellation ==========
    println!("\n4. Cancellation frees the slot");
    service.join_game(bob, first.id).await?;
    let cancelled = service
        .cancel_game(alice, first.id, Some("Rain forecast".to_string()))
        .await?;
    println!(
        "   game {} is {} ({})",
        cancelled.id,
        cancelled.status,
        cancelled.cancellation_reason.as_deref().unwrap_or_default()
    );
    outcome(
        "rebook 10:00-11:00",
        &service.create_game(carol, new_game(game_day(10, 0)?, 60, 4)).await,
    );

    // ========== Sweep and delivery ==========
    println!("\n5. Lifecycle sweep and reminder delivery");
    clock.advance_to(game_day(16, 15)?);
    let dispatched = service.dispatcher().dispatch_once(clock.now()).await?;
    println!("   16:15 dispatch: {} delivered", dispatched.delivered);

    clock.advance_to(game_day(18, 45)?);
    let report = service.sweeper(100).sweep_once(clock.now()).await?;
    println!(
        "   18:45 sweep: {} started, {} completed",
        report.started, report.completed
    );
    println!("   17:00 game is now {}", service.get_game(later.id).await?.status);

    println!("\nNotifications sent:");
    for notification in outbox.sent().await {
        println!(
            "   [{}] to {}: {}",
            notification.kind.as_str(),
            notification.recipient,
            notification.message
        );
    }

    println!("\n============================================\n");
    Ok(())
}
