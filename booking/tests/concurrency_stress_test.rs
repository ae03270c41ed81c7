//! Concurrency stress tests for last-slot and last-place races.
//!
//! These tests verify that under heavy concurrent load the engine never
//! double-books a court and never overfills a roster.
//!
//! Run with: `cargo test --test concurrency_stress_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

mod common;

use common::{game_day, harness, player};
use courtbook::{AvailabilityError, BookingError, GameId, GameStatus, SlotRange};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn hundred_reservations_for_one_slot_yield_one_winner() {
    let h = harness().await;
    let date = game_day(10, 0).date_naive();
    let range = SlotRange::new(600, 660).unwrap();
    let service = Arc::clone(&h.service);

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let service = Arc::clone(&service);
            let court = h.court.id;
            tokio::spawn(async move {
                service
                    .availability()
                    .reserve(court, date, range, GameId::new())
                    .await
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(AvailabilityError::SlotConflict { .. })))
        .count();
    println!("✓ {winners} winner, {conflicts} slot conflicts");

    assert_eq!(winners, 1, "exactly one reservation must win");
    assert_eq!(conflicts, 99, "every loser must see a slot conflict");

    let booked = h.service.court_schedule(h.court.id, date).await.unwrap();
    assert_eq!(booked.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn staggered_overlapping_reservations_never_overlap() {
    let h = harness().await;
    let date = game_day(10, 0).date_naive();
    let service = Arc::clone(&h.service);

    // Ranges start every 15 minutes between 08:00 and 20:00 and last 45 to 90 minutes.
    let handles: Vec<_> = (0u16..48)
        .map(|i| {
            let service = Arc::clone(&service);
            let court = h.court.id;
            let start = 480 + i * 15;
            let range = SlotRange::new(start, start + 45 + (i % 4) * 15).unwrap();
            tokio::spawn(async move {
                service
                    .availability()
                    .reserve(court, date, range, GameId::new())
                    .await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let winners = results
        .iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    let booked = h.service.court_schedule(h.court.id, date).await.unwrap();
    assert_eq!(booked.len(), winners);
    for (i, a) in booked.iter().enumerate() {
        for b in &booked[i + 1..] {
            assert!(
                !a.range.overlaps(&b.range),
                "{} overlaps {}",
                a.range,
                b.range
            );
        }
    }
    println!("✓ {winners} non-overlapping reservations out of 48 attempts");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_create_game_books_a_slot_once() {
    let h = harness().await;

    let handles: Vec<_> = (0..30)
        .map(|_| {
            let service = Arc::clone(&h.service);
            let new_game = h.game(game_day(18, 0), 90, 10);
            tokio::spawn(async move { service.create_game(player(), new_game).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, BookingError::NotAvailable { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_joins_fill_exactly_to_capacity() {
    let h = harness().await;
    let capacity = 10;
    let game = h
        .service
        .create_game(player(), h.game(game_day(12, 0), 60, capacity))
        .await
        .unwrap();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.join_game(player(), game.id).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let joined = results.iter().filter(|r| r.is_ok()).count();
    let full = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::GameFull { .. })))
        .count();
    println!("✓ {joined} joined, {full} turned away");

    // The creator holds one place.
    assert_eq!(joined, capacity as usize - 1);
    assert_eq!(full, 50 - joined);

    let stored = h.service.get_game(game.id).await.unwrap();
    assert_eq!(stored.roster.confirmed_count(), capacity as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn join_racing_cancel_never_lands_on_a_cancelled_game() {
    for round in 0..20 {
        let h = harness().await;
        let creator = player();
        let game = h
            .service
            .create_game(creator, h.game(game_day(12, 0), 60, 30))
            .await
            .unwrap();

        let joins: Vec<_> = (0..20)
            .map(|_| {
                let service = Arc::clone(&h.service);
                tokio::spawn(async move { service.join_game(player(), game.id).await })
            })
            .collect();
        let cancel = {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.cancel_game(creator, game.id, None).await })
        };

        let cancelled = cancel.await.unwrap().unwrap();
        let results: Vec<_> = futures::future::join_all(joins)
            .await
            .into_iter()
            .map(|joined| joined.expect("task panicked"))
            .collect();

        let stored = h.service.get_game(game.id).await.unwrap();
        assert_eq!(stored.status, GameStatus::Cancelled);

        let joined = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(stored.roster.confirmed_count(), 1 + joined, "round {round}");
        assert_eq!(cancelled.roster.confirmed_count(), 1 + joined, "round {round}");
        for result in &results {
            match result {
                Ok(game) => assert_eq!(game.status, GameStatus::Scheduled),
                Err(error) => assert!(
                    matches!(error, BookingError::InvalidStatus { .. }),
                    "unexpected {error}"
                ),
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sweeps_advance_each_game_once() {
    let h = harness().await;
    let mut ids = Vec::new();
    for hour in 8..20 {
        let game = h
            .service
            .create_game(player(), h.game(game_day(hour, 0), 60, 4))
            .await
            .unwrap();
        ids.push(game.id);
    }

    let now = game_day(23, 0);
    let sweeps: Vec<_> = (0..4)
        .map(|_| {
            let sweeper = h.service.sweeper(3);
            tokio::spawn(async move { sweeper.sweep_once(now).await })
        })
        .collect();
    let reports: Vec<_> = futures::future::join_all(sweeps)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").unwrap())
        .collect();

    let started: usize = reports.iter().map(|r| r.started).sum();
    let completed: usize = reports.iter().map(|r| r.completed).sum();
    assert_eq!(started, ids.len());
    assert_eq!(completed, ids.len());

    for id in ids {
        let game = h.service.get_game(id).await.unwrap();
        assert_eq!(game.status, GameStatus::Completed);
    }
}
