//! End-to-end event feed: a subscriber on a court sees every mutation the
//! engine commits, in commit order.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use ulid::Ulid;

use courtbook::limits::DEFAULT_LOCK_TTL_MS;
use courtbook::model::*;
use courtbook::{Engine, ManualClock, NotifyHub};

fn wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("courtbook_test_notify");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

#[tokio::test]
async fn subscriber_sees_lock_and_booking_flow() {
    let date = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();
    let clock = ManualClock::at(minute_of(date, TimeOfDay::MIDNIGHT) * 60_000);
    let hub = Arc::new(NotifyHub::new());
    let engine = Engine::new(
        wal_path("lock_booking_flow.wal"),
        hub.clone(),
        clock,
        DEFAULT_LOCK_TTL_MS,
    )
    .unwrap();

    let court = engine
        .register_court(Ulid::new(), "Padel 1".into(), Decimal::new(1000, 0), None)
        .await
        .unwrap();
    engine
        .update_court(
            court.id,
            court.name,
            court.base_price,
            None,
            CourtStatus::Approved,
            true,
        )
        .await
        .unwrap();

    let mut rx = hub.subscribe(court.id);

    let user = Ulid::new();
    let range = SlotRange::new(date, TimeOfDay::from_hour(14).unwrap(), 2);
    let lock = engine.acquire_lock(court.id, user, range).await.unwrap();
    let booking = engine
        .commit_booking(court.id, user, range, PaymentMethod::Instant)
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        Event::LockAcquired { id, user_id, .. } => {
            assert_eq!(id, lock.id);
            assert_eq!(user_id, user);
        }
        other => panic!("expected LockAcquired, got {other:?}"),
    }
    match rx.recv().await.unwrap() {
        Event::BookingCreated { id, total, .. } => {
            assert_eq!(id, booking.id);
            assert_eq!(total, Decimal::new(2000, 0));
        }
        other => panic!("expected BookingCreated, got {other:?}"),
    }
    // The commit consumed the lock
    match rx.recv().await.unwrap() {
        Event::LockReleased { id, .. } => assert_eq!(id, lock.id),
        other => panic!("expected LockReleased, got {other:?}"),
    }

    // Cancellation shows up as a status change
    engine.cancel_booking(booking.id).await.unwrap();
    match rx.recv().await.unwrap() {
        Event::BookingStatusChanged { id, status, payment, .. } => {
            assert_eq!(id, booking.id);
            assert_eq!(status, BookingStatus::Cancelled);
            assert_eq!(payment, PaymentStatus::Refunded);
        }
        other => panic!("expected BookingStatusChanged, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribers_are_scoped_to_their_court() {
    let date = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();
    let clock = ManualClock::at(minute_of(date, TimeOfDay::MIDNIGHT) * 60_000);
    let hub = Arc::new(NotifyHub::new());
    let engine = Engine::new(
        wal_path("scoped_courts.wal"),
        hub.clone(),
        clock,
        DEFAULT_LOCK_TTL_MS,
    )
    .unwrap();

    let mut courts = Vec::new();
    for name in ["A", "B"] {
        let c = engine
            .register_court(Ulid::new(), name.into(), Decimal::new(1000, 0), None)
            .await
            .unwrap();
        engine
            .update_court(c.id, c.name.clone(), c.base_price, None, CourtStatus::Approved, true)
            .await
            .unwrap();
        courts.push(c.id);
    }

    let mut rx_a = hub.subscribe(courts[0]);
    let mut rx_b = hub.subscribe(courts[1]);

    let range = SlotRange::new(date, TimeOfDay::from_hour(10).unwrap(), 1);
    engine
        .commit_booking(courts[1], Ulid::new(), range, PaymentMethod::Instant)
        .await
        .unwrap();

    assert!(matches!(
        rx_b.recv().await.unwrap(),
        Event::BookingCreated { .. }
    ));
    assert!(matches!(
        rx_a.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}
