//! Property tests for the booking invariants.
//!
//! Run with: cargo test --test properties_test

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, Duration, NaiveDate, Utc};
use courtbook::game::{GameDraft, GameEnvironment};
use courtbook::store::InMemoryScheduleStore;
use courtbook::{
    Actor, Availability, AvailabilityError, BookingRules, CourtId, Game, GameAction, GameFormat,
    GameId, GameReducer, GameStatus, PlayerId, SkillLevel, SlotRange, SportType,
};
use courtbook_core::environment::Clock;
use courtbook_core::reducer::Reducer;
use courtbook_core::retry::RetryPolicy;
use courtbook_testing::{ManualClock, test_epoch};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum SlotOp {
    Reserve { start: u16, minutes: u16 },
    Release { pick: usize },
}

fn slot_op() -> impl Strategy<Value = SlotOp> {
    prop_oneof![
        3 => (0_u16..1380, 15_u16..180).prop_map(|(start, minutes)| SlotOp::Reserve { start, minutes }),
        1 => any::<usize>().prop_map(|pick| SlotOp::Release { pick }),
    ]
}

proptest! {
    #[test]
    fn booked_slots_never_overlap(ops in prop::collection::vec(slot_op(), 1..80)) {
        let availability = Availability::new(
            Arc::new(InMemoryScheduleStore::new()),
            RetryPolicy::default(),
            std::time::Duration::from_secs(1),
        );
        let court = CourtId::new();
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let mut held: Vec<(SlotRange, GameId)> = Vec::new();

        tokio_test::block_on(async {
            for op in ops {
                match op {
                    SlotOp::Reserve { start, minutes } => {
                        let end = (start + minutes).min(1440);
                        let range = SlotRange::new(start, end).unwrap();
                        let expected_free = held.iter().all(|(r, _)| !r.overlaps(&range));
                        let game = GameId::new();
                        match availability.reserve(court, date, range, game).await {
                            Ok(_) => {
                                prop_assert!(expected_free, "{range} accepted over a booked slot");
                                held.push((range, game));
                            }
                            Err(AvailabilityError::SlotConflict { .. }) => {
                                prop_assert!(!expected_free, "{range} rejected on a free court");
                            }
                            Err(other) => prop_assert!(false, "unexpected {other}"),
                        }
                    }
                    SlotOp::Release { pick } => {
                        if held.is_empty() {
                            continue;
                        }
                        let (range, game) = held.remove(pick % held.len());
                        prop_assert!(availability.release(court, date, range, game).await.unwrap());
                    }
                }

                let booked = availability.booked_slots(court, date).await.unwrap();
                prop_assert_eq!(booked.len(), held.len());
                for (i, a) in booked.iter().enumerate() {
                    for b in &booked[i + 1..] {
                        prop_assert!(!a.range.overlaps(&b.range));
                    }
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}

#[derive(Clone, Debug)]
enum LifecycleOp {
    Join(usize),
    Leave(usize),
    Cancel,
    Advance,
    Wait(i64),
}

fn lifecycle_op() -> impl Strategy<Value = LifecycleOp> {
    prop_oneof![
        4 => (0_usize..6).prop_map(LifecycleOp::Join),
        2 => (0_usize..6).prop_map(LifecycleOp::Leave),
        1 => Just(LifecycleOp::Cancel),
        2 => Just(LifecycleOp::Advance),
        2 => (1_i64..90).prop_map(LifecycleOp::Wait),
    ]
}

fn fresh_game(creator: PlayerId, start: DateTime<Utc>, capacity: u32) -> Game {
    Game::open(
        GameDraft {
            id: GameId::new(),
            court: CourtId::new(),
            creator,
            sport: SportType::new("basketball").unwrap(),
            format: GameFormat::ThreeOnThree,
            skill_level: SkillLevel::Any,
            description: None,
            start_time: start,
            duration_minutes: 60,
            date: start.date_naive(),
            slot: SlotRange::new(600, 660).unwrap(),
            capacity,
        },
        test_epoch(),
    )
}

fn legal(from: GameStatus, to: GameStatus) -> bool {
    use GameStatus::{Cancelled, Completed, InProgress, Scheduled};
    from == to
        || matches!(
            (from, to),
            (Scheduled, InProgress | Completed | Cancelled) | (InProgress, Completed)
        )
}

proptest! {
    #[test]
    fn lifecycle_only_moves_forward(
        capacity in 2_u32..5,
        ops in prop::collection::vec(lifecycle_op(), 1..60),
    ) {
        let clock = ManualClock::starting_at(test_epoch());
        let env = GameEnvironment::new(Arc::new(clock.clone()), BookingRules::default());
        let reducer = GameReducer::new();
        let players: Vec<PlayerId> = (0..6).map(|_| PlayerId::new()).collect();
        let mut game = fresh_game(players[0], test_epoch() + Duration::hours(2), capacity);

        for op in ops {
            let before = game.clone();
            let action = match op {
                LifecycleOp::Join(i) => GameAction::Join { player: players[i] },
                LifecycleOp::Leave(i) => GameAction::Leave { player: players[i] },
                LifecycleOp::Cancel => GameAction::Cancel { actor: Actor::user(players[0]), reason: None },
                LifecycleOp::Advance => GameAction::Advance { now: clock.now() },
                LifecycleOp::Wait(minutes) => {
                    clock.advance(Duration::minutes(minutes));
                    continue;
                }
            };

            if reducer.reduce(&mut game, action, &env).is_err() {
                prop_assert_eq!(&game, &before, "a rejected action must not mutate the game");
            }
            prop_assert!(legal(before.status, game.status), "{} -> {}", before.status, game.status);
            prop_assert!(game.roster.confirmed_count() <= capacity as usize);
            if game.status != GameStatus::Cancelled {
                prop_assert!(game.roster.contains(players[0]));
            }
        }
    }
}
