#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;
use venuebook::application::engine::BookingEngine;
use venuebook::application::notifications::{NotificationEvent, Notifier};
use venuebook::config::{Environment, GatewayConfig, WebhookCredentials};
use venuebook::domain::booking::BookingRequest;
use venuebook::domain::payment::{Amount, PaymentStatus, RefundStatus};
use venuebook::domain::ports::{
    FixedClock, GatewayRefund, InvoiceHandle, InvoiceRequest, PaymentGateway,
};
use venuebook::domain::resource::Resource;
use venuebook::error::{BookingError, Result};
use venuebook::infrastructure::gateway::sign_payload;
use venuebook::infrastructure::in_memory::{InMemoryReservationStore, InMemoryResourceStore};

pub const SECRET: &str = "whsec_integration";

/// Gateway fake with switchable failure modes.
pub struct TestGateway {
    secret: Option<String>,
    pub fail_invoices: AtomicBool,
    pub fail_refunds: AtomicBool,
    counter: AtomicU64,
}

impl TestGateway {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret,
            fail_invoices: AtomicBool::new(false),
            fail_refunds: AtomicBool::new(false),
            counter: AtomicU64::new(0),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl PaymentGateway for TestGateway {
    async fn create_invoice(&self, _request: InvoiceRequest) -> Result<InvoiceHandle> {
        if self.fail_invoices.load(Ordering::SeqCst) {
            return Err(BookingError::Gateway("provider unavailable".to_string()));
        }
        let gateway_id = self.next_id("gw");
        Ok(InvoiceHandle {
            hosted_payment_url: format!("https://pay.test/checkout/{gateway_id}"),
            gateway_id,
        })
    }

    async fn get_invoice(&self, _gateway_id: &str) -> Result<PaymentStatus> {
        Ok(PaymentStatus::Unpaid)
    }

    async fn create_refund(
        &self,
        _gateway_transaction_id: &str,
        _amount: Amount,
        _reason: &str,
    ) -> Result<GatewayRefund> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(BookingError::Gateway("provider unavailable".to_string()));
        }
        Ok(GatewayRefund {
            gateway_refund_id: self.next_id("rf"),
            status: RefundStatus::Succeeded,
        })
    }

    fn verify_signature(&self, raw_payload: &[u8], signature: &str) -> bool {
        match &self.secret {
            Some(secret) => sign_payload(secret, raw_payload) == signature,
            None => true,
        }
    }
}

pub struct TestApp {
    pub engine: Arc<BookingEngine>,
    pub gateway: Arc<TestGateway>,
    pub clock: Arc<FixedClock>,
    pub resource_id: Uuid,
    pub events: UnboundedReceiver<NotificationEvent>,
}

pub fn june_first() -> DateTime<Utc> {
    "2030-06-01T08:00:00Z".parse().unwrap()
}

/// Engine wired to in-memory stores, the fake gateway and a pinned clock,
/// with one resource at 100,000 per day.
pub async fn app() -> TestApp {
    let credentials =
        WebhookCredentials::new(Environment::Development, Some(SECRET.to_string())).unwrap();
    let gateway = Arc::new(TestGateway::new(Some(SECRET.to_string())));
    let clock = Arc::new(FixedClock::at(june_first()));
    let (notifier, events) = Notifier::channel();

    let engine = Arc::new(BookingEngine::new(
        Arc::new(InMemoryReservationStore::new()),
        Arc::new(InMemoryResourceStore::new()),
        gateway.clone(),
        clock.clone(),
        GatewayConfig::new(credentials),
        notifier,
    ));

    let resource = Resource::new(
        "Main hall".to_string(),
        Amount::new(dec!(100000)).unwrap(),
    );
    let resource_id = resource.id;
    engine.add_resource(resource).await.unwrap();

    TestApp {
        engine,
        gateway,
        clock,
        resource_id,
        events,
    }
}

pub fn request(resource_id: Uuid, dates: (&str, &str), times: (&str, &str)) -> BookingRequest {
    BookingRequest {
        resource_id,
        activity_name: "Workshop".to_string(),
        start_date: dates.0.parse().unwrap(),
        end_date: dates.1.parse().unwrap(),
        start_time: times.0.parse().unwrap(),
        end_time: times.1.parse().unwrap(),
        payer_name: "Dana".to_string(),
        payer_email: "dana@example.com".to_string(),
        proposal_document_ref: None,
    }
}

pub fn sign(raw: &[u8]) -> String {
    sign_payload(SECRET, raw)
}

/// Raw invoice-webhook payload for the booking's payment.
pub async fn invoice_payload(app: &TestApp, booking_id: Uuid, status: &str) -> Vec<u8> {
    let payment = app
        .engine
        .payment_for_booking(booking_id)
        .await
        .unwrap()
        .unwrap();
    serde_json::to_vec(&serde_json::json!({
        "external_id": payment.invoice_number,
        "status": status,
        "payment_method": "BANK_TRANSFER",
        "paid_amount": payment.amount.value(),
    }))
    .unwrap()
}

/// Creates a booking for the given window and drives its payment to PAID
/// through the invoice webhook.
pub async fn paid_booking(app: &TestApp, dates: (&str, &str), times: (&str, &str)) -> Uuid {
    let confirmation = app
        .engine
        .create(Uuid::new_v4(), request(app.resource_id, dates, times))
        .await
        .unwrap();
    let raw = invoice_payload(app, confirmation.booking_id, "PAID").await;
    app.engine
        .handle_invoice_webhook(&raw, &sign(&raw))
        .await
        .unwrap();
    confirmation.booking_id
}
