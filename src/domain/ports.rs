use crate::domain::booking::{Booking, BookingStatus, DateRange, TimeRange};
use crate::domain::payment::{Amount, Payment, PaymentStatus, Refund, RefundStatus};
use crate::domain::resource::Resource;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub type ReservationStoreRef = Arc<dyn ReservationStore>;
pub type ResourceStoreRef = Arc<dyn ResourceStore>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type ClockRef = Arc<dyn Clock>;

/// Storage port for bookings, payments and refunds.
///
/// The mutating methods carry the concurrency contract: `reserve` re-checks
/// availability and inserts atomically, the `transition_*` methods are
/// compare-and-swap (they fail with `InvalidState` when the stored status no
/// longer matches `expected`), and `insert_refund` enforces at most one
/// refund per payment.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Atomically re-checks the window and persists booking + payment as one
    /// unit. Fails with `Conflict` when a Processing/Approved booking on the
    /// same resource overlaps, leaving nothing behind.
    async fn reserve(&self, booking: Booking, payment: Payment) -> Result<()>;

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>>;

    async fn payment_for_booking(&self, booking_id: Uuid) -> Result<Option<Payment>>;

    async fn payment_by_invoice(&self, invoice_number: &str) -> Result<Option<Payment>>;

    async fn payment_by_gateway_id(&self, gateway_transaction_id: &str)
    -> Result<Option<Payment>>;

    /// Bookings that currently block the given window on a resource.
    async fn conflicting_bookings(
        &self,
        resource_id: Uuid,
        dates: &DateRange,
        times: &TimeRange,
    ) -> Result<Vec<Booking>>;

    /// CAS status change; `reason` is stored for Rejected/Cancelled.
    async fn transition_booking(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Booking>;

    /// CAS status change; method/paid_at are recorded when provided.
    async fn transition_payment(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        payment_method: Option<String>,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Payment>;

    /// Fails with `InvalidState` when a refund already exists for the payment.
    async fn insert_refund(&self, refund: Refund) -> Result<()>;

    async fn refund_for_payment(&self, payment_id: Uuid) -> Result<Option<Refund>>;

    /// Processing/Approved bookings whose end date is strictly before `today`.
    async fn expiring_bookings(&self, today: NaiveDate) -> Result<Vec<Booking>>;

    /// Locally-recorded refunds awaiting out-of-band gateway confirmation.
    async fn unreconciled_refunds(&self) -> Result<Vec<Refund>>;

    /// Everything, for reporting.
    async fn all_bookings(&self) -> Result<Vec<Booking>>;
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn store(&self, resource: Resource) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Resource>>;
}

/// Invoice handle returned by the gateway when an invoice is created.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceHandle {
    pub gateway_id: String,
    pub hosted_payment_url: String,
}

/// What the gateway needs to host a checkout page.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub invoice_number: String,
    pub amount: Amount,
    pub payer_name: String,
    pub payer_email: String,
    pub description: String,
    pub success_url: String,
    pub failure_url: String,
}

/// Gateway's answer to a refund request.
#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub gateway_refund_id: String,
    pub status: RefundStatus,
}

/// Capability interface over the external payment provider. Constructed once
/// and injected, so tests substitute a fake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<InvoiceHandle>;

    async fn get_invoice(&self, gateway_id: &str) -> Result<PaymentStatus>;

    async fn create_refund(
        &self,
        gateway_transaction_id: &str,
        amount: Amount,
        reason: &str,
    ) -> Result<GatewayRefund>;

    /// Verifies the webhook signature over the raw payload bytes.
    fn verify_signature(&self, raw_payload: &[u8], signature: &str) -> bool;
}

/// Time source, injectable so tests can pin "today".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant, for tests and replays.
pub struct FixedClock(std::sync::RwLock<DateTime<Utc>>);

impl FixedClock {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(std::sync::RwLock::new(instant))
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        match self.0.write() {
            Ok(mut guard) => *guard = instant,
            Err(mut poisoned) => **poisoned.get_mut() = instant,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.0.read() {
            Ok(guard) => *guard,
            Err(poisoned) => **poisoned.get_ref(),
        }
    }
}
