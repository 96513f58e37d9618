use crate::application::availability::window_is_free;
use crate::domain::booking::{Booking, BookingStatus, DateRange, TimeRange};
use crate::domain::payment::{Payment, PaymentStatus, Refund, RefundOrigin};
use crate::domain::ports::{ReservationStore, ResourceStore};
use crate::domain::resource::Resource;
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    bookings: HashMap<Uuid, Booking>,
    payments: HashMap<Uuid, Payment>,
    payment_by_booking: HashMap<Uuid, Uuid>,
    payment_by_invoice: HashMap<String, Uuid>,
    payment_by_gateway: HashMap<String, Uuid>,
    /// Keyed by payment id: the map key IS the one-refund-per-payment
    /// uniqueness constraint.
    refund_by_payment: HashMap<Uuid, Refund>,
}

/// Thread-safe in-memory reservation store.
///
/// A single `RwLock` over all tables gives `reserve` and the CAS transitions
/// their atomicity: the availability re-check and the insert happen under one
/// write guard, so the second of two racing writers always sees the first.
#[derive(Default, Clone)]
pub struct InMemoryReservationStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn reserve(&self, booking: Booking, payment: Payment) -> Result<()> {
        let mut tables = self.tables.write().await;

        let existing: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.resource_id == booking.resource_id)
            .cloned()
            .collect();
        if !window_is_free(&existing, &booking.dates, &booking.times) {
            return Err(BookingError::Conflict(format!(
                "window {} .. {} already taken",
                booking.dates.start, booking.dates.end
            )));
        }

        tables
            .payment_by_booking
            .insert(payment.booking_id, payment.id);
        tables
            .payment_by_invoice
            .insert(payment.invoice_number.clone(), payment.id);
        tables
            .payment_by_gateway
            .insert(payment.gateway_transaction_id.clone(), payment.id);
        tables.payments.insert(payment.id, payment);
        tables.bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables.bookings.get(&id).cloned())
    }

    async fn payment_for_booking(&self, booking_id: Uuid) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payment_by_booking
            .get(&booking_id)
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn payment_by_invoice(&self, invoice_number: &str) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payment_by_invoice
            .get(invoice_number)
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn payment_by_gateway_id(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payment_by_gateway
            .get(gateway_transaction_id)
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn conflicting_bookings(
        &self,
        resource_id: Uuid,
        dates: &DateRange,
        times: &TimeRange,
    ) -> Result<Vec<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.resource_id == resource_id && b.conflicts_with(dates, times))
            .cloned()
            .collect())
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Booking> {
        let mut tables = self.tables.write().await;
        let booking = tables
            .bookings
            .get_mut(&id)
            .ok_or_else(|| BookingError::NotFound(format!("booking {id}")))?;

        if booking.status != expected {
            return Err(BookingError::invalid_state(
                "booking",
                expected,
                booking.status,
            ));
        }
        if !expected.can_transition_to(next) {
            return Err(BookingError::invalid_state(
                "booking",
                format!("a state reachable from {expected}"),
                next,
            ));
        }

        booking.status = next;
        booking.updated_at = at;
        if matches!(next, BookingStatus::Rejected | BookingStatus::Cancelled) {
            booking.rejection_reason = reason;
        }
        Ok(booking.clone())
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        payment_method: Option<String>,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Payment> {
        let mut tables = self.tables.write().await;
        let payment = tables
            .payments
            .get_mut(&id)
            .ok_or_else(|| BookingError::NotFound(format!("payment {id}")))?;

        if payment.status != expected {
            return Err(BookingError::invalid_state(
                "payment",
                expected,
                payment.status,
            ));
        }
        if !expected.can_transition_to(next) {
            return Err(BookingError::invalid_state(
                "payment",
                format!("a state reachable from {expected}"),
                next,
            ));
        }

        payment.status = next;
        if payment_method.is_some() {
            payment.payment_method = payment_method;
        }
        if paid_at.is_some() {
            payment.paid_at = paid_at;
        }
        Ok(payment.clone())
    }

    async fn insert_refund(&self, refund: Refund) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.refund_by_payment.contains_key(&refund.payment_id) {
            return Err(BookingError::invalid_state(
                "refund",
                "no existing refund",
                "already refunded",
            ));
        }
        tables.refund_by_payment.insert(refund.payment_id, refund);
        Ok(())
    }

    async fn refund_for_payment(&self, payment_id: Uuid) -> Result<Option<Refund>> {
        let tables = self.tables.read().await;
        Ok(tables.refund_by_payment.get(&payment_id).cloned())
    }

    async fn expiring_bookings(&self, today: NaiveDate) -> Result<Vec<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.status.blocks_availability() && b.dates.end < today)
            .cloned()
            .collect())
    }

    async fn unreconciled_refunds(&self) -> Result<Vec<Refund>> {
        let tables = self.tables.read().await;
        Ok(tables
            .refund_by_payment
            .values()
            .filter(|r| r.origin == RefundOrigin::LocalFallback)
            .cloned()
            .collect())
    }

    async fn all_bookings(&self) -> Result<Vec<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables.bookings.values().cloned().collect())
    }
}

/// Thread-safe in-memory resource store.
#[derive(Default, Clone)]
pub struct InMemoryResourceStore {
    resources: Arc<RwLock<HashMap<Uuid, Resource>>>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn store(&self, resource: Resource) -> Result<()> {
        let mut resources = self.resources.write().await;
        resources.insert(resource.id, resource);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Resource>> {
        let resources = self.resources.read().await;
        Ok(resources.get(&id).cloned())
    }
}
