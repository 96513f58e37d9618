mod common;

use common::{app, request};
use uuid::Uuid;
use venuebook::error::BookingError;

#[tokio::test]
async fn test_racing_requests_for_one_window_yield_one_booking() {
    let app = app().await;

    let first = app.engine.create(
        Uuid::new_v4(),
        request(app.resource_id, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")),
    );
    let second = app.engine.create(
        Uuid::new_v4(),
        request(app.resource_id, ("2030-06-11", "2030-06-13"), ("09:00:00", "17:00:00")),
    );

    let (first, second) = tokio::join!(first, second);
    let outcomes = [first, second];

    // reserve() re-checks the window under the store lock, so exactly one of
    // the two can win no matter how the gateway calls interleave.
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = outcomes.into_iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(loser.unwrap_err(), BookingError::Conflict(_)));

    assert_eq!(app.engine.all_bookings().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_racing_requests_for_disjoint_windows_both_land() {
    let app = app().await;

    let morning = app.engine.create(
        Uuid::new_v4(),
        request(app.resource_id, ("2030-06-10", "2030-06-10"), ("09:00:00", "12:00:00")),
    );
    let afternoon = app.engine.create(
        Uuid::new_v4(),
        request(app.resource_id, ("2030-06-10", "2030-06-10"), ("13:00:00", "17:00:00")),
    );

    let (morning, afternoon) = tokio::join!(morning, afternoon);
    morning.unwrap();
    afternoon.unwrap();

    assert_eq!(app.engine.all_bookings().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_admin_refunds_record_exactly_one() {
    let app = app().await;
    let booking_id =
        common::paid_booking(&app, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")).await;

    let first = app.engine.process_refund(booking_id, "cancelled".to_string());
    let second = app.engine.process_refund(booking_id, "cancelled".to_string());
    let (first, second) = tokio::join!(first, second);

    // The uniqueness constraint on payment_id closes the race even when both
    // callers pass the existence check.
    assert_eq!([&first, &second].iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        app.engine
            .refund_for_booking(booking_id)
            .await
            .unwrap()
            .is_some()
    );
}
