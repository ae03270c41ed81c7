//! Lifecycle sweep, reminder delivery and rescheduling.
//!
//! Run with: cargo test --test lifecycle_test

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::Duration;
use common::{game_day, harness, harness_with, player};
use courtbook::lifecycle::Workers;
use courtbook::{BookingError, Config, GameStatus, NotificationKind, SlotRange};
use courtbook_core::environment::Clock;

#[tokio::test]
async fn sweep_moves_games_through_their_lifecycle() {
    let h = harness().await;
    let creator = player();
    let morning = h
        .service
        .create_game(creator, h.game(game_day(10, 0), 60, 4))
        .await
        .unwrap();
    let noon = h
        .service
        .create_game(creator, h.game(game_day(12, 0), 60, 4))
        .await
        .unwrap();
    let cancelled = h
        .service
        .create_game(creator, h.game(game_day(9, 0), 60, 4))
        .await
        .unwrap();
    h.service.cancel_game(creator, cancelled.id, None).await.unwrap();

    let sweeper = h.service.sweeper(1);

    h.clock.set(game_day(10, 30));
    let report = sweeper.sweep_once(h.clock.now()).await.unwrap();
    assert_eq!((report.started, report.completed), (1, 0));
    assert_eq!(
        h.service.get_game(morning.id).await.unwrap().status,
        GameStatus::InProgress
    );

    // A sweep that lagged past the end applies both transitions at once.
    h.clock.set(game_day(13, 30));
    let report = sweeper.sweep_once(h.clock.now()).await.unwrap();
    assert_eq!((report.started, report.completed), (1, 2));
    assert_eq!(report.failed, 0);

    let again = sweeper.sweep_once(h.clock.now()).await.unwrap();
    assert_eq!((again.examined, again.started, again.completed), (0, 0, 0));

    for id in [morning.id, noon.id] {
        assert_eq!(
            h.service.get_game(id).await.unwrap().status,
            GameStatus::Completed
        );
    }
    assert_eq!(
        h.service.get_game(cancelled.id).await.unwrap().status,
        GameStatus::Cancelled
    );
}

#[tokio::test]
async fn reads_never_advance_a_game() {
    let h = harness().await;
    let game = h
        .service
        .create_game(player(), h.game(game_day(10, 0), 60, 4))
        .await
        .unwrap();

    h.clock.set(game_day(12, 0));
    let read = h.service.get_game(game.id).await.unwrap();
    assert_eq!(read.status, GameStatus::Scheduled);
    assert_eq!(read.effective_status(h.clock.now()), GameStatus::Completed);
}

#[tokio::test]
async fn due_reminders_are_delivered_once() {
    let h = harness().await;
    let creator = player();
    let bob = player();
    let game = h
        .service
        .create_game(creator, h.game(game_day(10, 0), 60, 4))
        .await
        .unwrap();
    h.service.join_game(bob, game.id).await.unwrap();

    let dropped = h
        .service
        .create_game(creator, h.game(game_day(10, 0) + Duration::hours(1), 60, 4))
        .await
        .unwrap();

    let dispatcher = h.service.dispatcher();

    let early = dispatcher.dispatch_once(game_day(8, 30)).await.unwrap();
    assert_eq!(early.delivered, 0);

    h.clock.set(game_day(9, 15));
    let report = dispatcher.dispatch_once(h.clock.now()).await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 0);

    let repeat = dispatcher.dispatch_once(h.clock.now()).await.unwrap();
    assert_eq!(repeat.delivered, 0);

    // Cancelled before its window opens: never delivered.
    h.service.cancel_game(creator, dropped.id, None).await.unwrap();
    h.clock.set(game_day(10, 15));
    let later = dispatcher.dispatch_once(h.clock.now()).await.unwrap();
    assert_eq!(later.delivered, 0);

    let reminders: Vec<_> = h
        .outbox
        .sent()
        .await
        .into_iter()
        .filter(|n| n.kind == NotificationKind::GameReminder)
        .collect();
    assert_eq!(reminders.len(), 2);
    assert!(reminders.iter().all(|n| n.game == game.id));
}

#[tokio::test]
async fn leaving_voids_only_the_leavers_reminder() {
    let h = harness().await;
    let creator = player();
    let bob = player();
    let game = h
        .service
        .create_game(creator, h.game(game_day(10, 0), 60, 4))
        .await
        .unwrap();
    h.service.join_game(bob, game.id).await.unwrap();
    h.service.leave_game(bob, game.id).await.unwrap();

    let reminders = h
        .service
        .reminder_scheduler()
        .reminders_for(game.id)
        .await
        .unwrap();
    let live: Vec<_> = reminders.iter().filter(|r| !r.voided).collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].recipient, creator.player);
}

#[tokio::test]
async fn rescheduling_moves_the_slot_and_the_reminders() {
    let h = harness().await;
    let creator = player();
    let bob = player();
    let game = h
        .service
        .create_game(creator, h.game(game_day(10, 0), 60, 4))
        .await
        .unwrap();
    h.service.join_game(bob, game.id).await.unwrap();

    let moved = h
        .service
        .reschedule_game(creator, game.id, game_day(13, 0), 90)
        .await
        .unwrap();
    assert_eq!(moved.start_time, game_day(13, 0));
    assert_eq!(moved.slot, SlotRange::new(780, 870).unwrap());

    let booked = h
        .service
        .court_schedule(h.court.id, moved.date)
        .await
        .unwrap();
    assert_eq!(booked.len(), 1);
    assert_eq!(booked[0].range, moved.slot);

    let reminders = h
        .service
        .reminder_scheduler()
        .reminders_for(game.id)
        .await
        .unwrap();
    let live: Vec<_> = reminders.iter().filter(|r| !r.voided).collect();
    assert_eq!(live.len(), 2);
    assert!(live.iter().all(|r| r.scheduled_for == game_day(12, 0)));

    let to_bob = h.outbox.sent_to(bob.player).await;
    assert!(to_bob.iter().any(|n| n.kind == NotificationKind::GameUpdated));

    // The old range is bookable again.
    h.service
        .create_game(player(), h.game(game_day(10, 0), 60, 4))
        .await
        .unwrap();
}

#[tokio::test]
async fn rescheduling_may_overlap_the_games_own_slot() {
    let h = harness().await;
    let creator = player();
    let game = h
        .service
        .create_game(creator, h.game(game_day(10, 0), 60, 4))
        .await
        .unwrap();

    let shifted = h
        .service
        .reschedule_game(creator, game.id, game_day(10, 30), 60)
        .await
        .unwrap();

    let booked = h
        .service
        .court_schedule(h.court.id, shifted.date)
        .await
        .unwrap();
    let ranges: Vec<_> = booked.iter().map(|s| s.range).collect();
    assert_eq!(ranges, vec![SlotRange::new(630, 690).unwrap()]);
}

#[tokio::test]
async fn rescheduling_onto_a_taken_slot_keeps_the_original() {
    let h = harness().await;
    let creator = player();
    let game = h
        .service
        .create_game(creator, h.game(game_day(10, 0), 60, 4))
        .await
        .unwrap();
    h.service
        .create_game(player(), h.game(game_day(14, 0), 60, 4))
        .await
        .unwrap();

    let result = h
        .service
        .reschedule_game(creator, game.id, game_day(14, 30), 60)
        .await;
    assert!(matches!(result, Err(BookingError::NotAvailable { .. })));

    let unchanged = h.service.get_game(game.id).await.unwrap();
    assert_eq!(unchanged.start_time, game_day(10, 0));
    let booked = h
        .service
        .court_schedule(h.court.id, game.date)
        .await
        .unwrap();
    assert_eq!(booked.len(), 2);

    let outsider = h
        .service
        .reschedule_game(player(), game.id, game_day(16, 0), 60)
        .await;
    assert!(matches!(outsider, Err(BookingError::Forbidden(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_workers_sweep_and_dispatch() {
    let config = Config::from_lookup(|key| match key {
        "SWEEP_INTERVAL_SECS" | "REMINDER_INTERVAL_SECS" => Some("0".to_string()),
        _ => None,
    });
    let h = harness_with(config.rules(), |env| env).await;
    let creator = player();
    let early = h
        .service
        .create_game(creator, h.game(game_day(8, 0), 60, 4))
        .await
        .unwrap();
    let next = h
        .service
        .create_game(creator, h.game(game_day(10, 0), 60, 4))
        .await
        .unwrap();

    h.clock.set(game_day(9, 30));
    let workers = Workers::start(&h.service, &config);
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    workers.shutdown(std::time::Duration::from_secs(1)).await;

    assert_eq!(
        h.service.get_game(early.id).await.unwrap().status,
        GameStatus::Completed
    );
    let delivered = h.outbox.sent_to(creator.player).await;
    assert!(delivered
        .iter()
        .any(|n| n.kind == NotificationKind::GameReminder && n.game == next.id));
}
