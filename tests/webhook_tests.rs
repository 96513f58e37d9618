mod common;

use common::{TestApp, app, invoice_payload, paid_booking, sign};
use rust_decimal::Decimal;
use uuid::Uuid;
use venuebook::domain::booking::BookingStatus;
use venuebook::domain::payment::{Payment, PaymentStatus, RefundInitiator, RefundOrigin};
use venuebook::error::BookingError;

async fn payment(app: &TestApp, booking_id: Uuid) -> Payment {
    app.engine
        .payment_for_booking(booking_id)
        .await
        .unwrap()
        .unwrap()
}

fn refund_payload(payment: &Payment, refund_id: &str, status: &str, amount: Decimal) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": refund_id,
        "status": status,
        "reference_id": payment.invoice_number,
        "amount": amount,
        "payment_id": payment.gateway_transaction_id,
    }))
    .unwrap()
}

#[tokio::test]
async fn test_bad_signature_is_rejected() {
    let app = app().await;
    let booking_id = paid_booking(&app, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")).await;

    let raw = invoice_payload(&app, booking_id, "EXPIRED").await;
    let err = app
        .engine
        .handle_invoice_webhook(&raw, "deadbeef")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Authentication(_)));

    // The forged payload changed nothing.
    assert_eq!(payment(&app, booking_id).await.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_tampered_payload_fails_verification() {
    let app = app().await;
    let booking_id = paid_booking(&app, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")).await;

    let raw = invoice_payload(&app, booking_id, "EXPIRED").await;
    let signature = sign(&raw);
    let mut tampered = raw.clone();
    tampered[0] ^= 0x01;

    let err = app
        .engine
        .handle_invoice_webhook(&tampered, &signature)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Authentication(_)));
}

#[tokio::test]
async fn test_unknown_invoice_reference_is_acknowledged() {
    let app = app().await;

    let raw = serde_json::to_vec(&serde_json::json!({
        "external_id": "INV-nobody",
        "status": "PAID",
    }))
    .unwrap();
    app.engine
        .handle_invoice_webhook(&raw, &sign(&raw))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_status_is_acknowledged() {
    let app = app().await;
    let booking_id = paid_booking(&app, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")).await;

    let raw = invoice_payload(&app, booking_id, "SOMETHING_NEW").await;
    app.engine
        .handle_invoice_webhook(&raw, &sign(&raw))
        .await
        .unwrap();
    assert_eq!(payment(&app, booking_id).await.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_redelivered_paid_webhook_is_a_noop() {
    let app = app().await;
    let booking_id = paid_booking(&app, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")).await;
    let first = payment(&app, booking_id).await;

    let raw = invoice_payload(&app, booking_id, "PAID").await;
    app.engine
        .handle_invoice_webhook(&raw, &sign(&raw))
        .await
        .unwrap();

    let second = payment(&app, booking_id).await;
    assert_eq!(second.status, PaymentStatus::Paid);
    assert_eq!(second.paid_at, first.paid_at);
}

#[tokio::test]
async fn test_stale_expired_after_paid_is_ignored() {
    let app = app().await;
    let booking_id = paid_booking(&app, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")).await;

    let raw = invoice_payload(&app, booking_id, "EXPIRED").await;
    app.engine
        .handle_invoice_webhook(&raw, &sign(&raw))
        .await
        .unwrap();

    assert_eq!(payment(&app, booking_id).await.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_failed_invoice_marks_payment_failed() {
    let app = app().await;
    let confirmation = app
        .engine
        .create(
            Uuid::new_v4(),
            common::request(app.resource_id, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")),
        )
        .await
        .unwrap();

    let raw = invoice_payload(&app, confirmation.booking_id, "FAILED").await;
    app.engine
        .handle_invoice_webhook(&raw, &sign(&raw))
        .await
        .unwrap();

    assert_eq!(
        payment(&app, confirmation.booking_id).await.status,
        PaymentStatus::Failed
    );
}

#[tokio::test]
async fn test_refund_webhook_records_once_and_cancels() {
    let app = app().await;
    let booking_id = paid_booking(&app, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")).await;
    let payment = payment(&app, booking_id).await;

    let raw = refund_payload(&payment, "rf-hook-1", "SUCCEEDED", payment.amount.value());
    app.engine
        .handle_refund_webhook(&raw, &sign(&raw))
        .await
        .unwrap();

    let refund = app.engine.refund_for_booking(booking_id).await.unwrap().unwrap();
    assert_eq!(refund.gateway_refund_id, "rf-hook-1");
    assert_eq!(refund.initiated_by, RefundInitiator::Webhook);
    assert_eq!(refund.origin, RefundOrigin::GatewayConfirmed);

    let booking = app.engine.booking(booking_id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);

    // Redelivery under a fresh gateway refund id still records exactly one.
    let replay = refund_payload(&payment, "rf-hook-2", "SUCCEEDED", payment.amount.value());
    app.engine
        .handle_refund_webhook(&replay, &sign(&replay))
        .await
        .unwrap();
    let refund = app.engine.refund_for_booking(booking_id).await.unwrap().unwrap();
    assert_eq!(refund.gateway_refund_id, "rf-hook-1");
}

#[tokio::test]
async fn test_pending_refund_webhook_records_nothing() {
    let app = app().await;
    let booking_id = paid_booking(&app, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")).await;
    let payment = payment(&app, booking_id).await;

    let raw = refund_payload(&payment, "rf-hook-1", "PENDING", payment.amount.value());
    app.engine
        .handle_refund_webhook(&raw, &sign(&raw))
        .await
        .unwrap();

    assert!(app.engine.refund_for_booking(booking_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_partial_refund_amount_is_ignored() {
    let app = app().await;
    let booking_id = paid_booking(&app, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")).await;
    let payment = payment(&app, booking_id).await;

    let half = payment.amount.value() / Decimal::from(2);
    let raw = refund_payload(&payment, "rf-hook-1", "SUCCEEDED", half);
    app.engine
        .handle_refund_webhook(&raw, &sign(&raw))
        .await
        .unwrap();

    assert!(app.engine.refund_for_booking(booking_id).await.unwrap().is_none());
    let booking = app.engine.booking(booking_id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Processing);
}

#[tokio::test]
async fn test_refund_webhook_for_unpaid_payment_records_nothing() {
    let app = app().await;
    let confirmation = app
        .engine
        .create(
            Uuid::new_v4(),
            common::request(app.resource_id, ("2030-06-10", "2030-06-12"), ("09:00:00", "17:00:00")),
        )
        .await
        .unwrap();
    let payment = payment(&app, confirmation.booking_id).await;
    assert_eq!(payment.status, PaymentStatus::Unpaid);

    // Refunds only reverse collected money; this one never settled.
    let raw = refund_payload(&payment, "rf-hook-1", "SUCCEEDED", payment.amount.value());
    app.engine
        .handle_refund_webhook(&raw, &sign(&raw))
        .await
        .unwrap();

    assert!(
        app.engine
            .refund_for_booking(confirmation.booking_id)
            .await
            .unwrap()
            .is_none()
    );
    let booking = app.engine.booking(confirmation.booking_id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Processing);
}

#[tokio::test]
async fn test_refund_webhook_for_unknown_payment_is_acknowledged() {
    let app = app().await;

    let raw = serde_json::to_vec(&serde_json::json!({
        "id": "rf-hook-1",
        "status": "SUCCEEDED",
        "amount": 100,
        "payment_id": "gw-nobody",
    }))
    .unwrap();
    app.engine
        .handle_refund_webhook(&raw, &sign(&raw))
        .await
        .unwrap();
}
