use crate::application::notifications::{NotificationEvent, NotificationKind, Notifier};
use crate::application::with_gateway_timeout;
use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::payment::{
    Payment, PaymentStatus, Refund, RefundInitiator, RefundOrigin, RefundStatus,
};
use crate::domain::ports::{ClockRef, PaymentGatewayRef, ReservationStoreRef, ResourceStoreRef};
use crate::error::{BookingError, Result};
use std::time::Duration;
use uuid::Uuid;

/// Issues full-amount refunds with an at-most-one-refund-per-payment
/// guarantee, backed by the store's uniqueness constraint on `payment_id`.
///
/// A gateway failure does not abort the refund: the money obligation is
/// recorded locally with a synthetic reference and surfaces through
/// `unreconciled_refunds()` for an out-of-band confirmation job.
pub struct RefundProcessor {
    store: ReservationStoreRef,
    resources: ResourceStoreRef,
    gateway: PaymentGatewayRef,
    notifier: Notifier,
    clock: ClockRef,
    call_timeout: Duration,
}

impl RefundProcessor {
    pub fn new(
        store: ReservationStoreRef,
        resources: ResourceStoreRef,
        gateway: PaymentGatewayRef,
        notifier: Notifier,
        clock: ClockRef,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            resources,
            gateway,
            notifier,
            clock,
            call_timeout,
        }
    }

    pub async fn process(
        &self,
        booking_id: Uuid,
        reason: String,
        initiated_by: RefundInitiator,
    ) -> Result<Refund> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;

        if booking.status == BookingStatus::Completed {
            return Err(BookingError::invalid_state(
                "booking",
                "refundable status",
                booking.status,
            ));
        }

        let payment = self
            .store
            .payment_for_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("payment for booking {booking_id}")))?;

        if payment.status != PaymentStatus::Paid {
            return Err(BookingError::invalid_state(
                "payment",
                PaymentStatus::Paid,
                payment.status,
            ));
        }

        if self.store.refund_for_payment(payment.id).await?.is_some() {
            return Err(BookingError::invalid_state(
                "refund",
                "no existing refund",
                "already refunded",
            ));
        }

        let refund = self
            .request_refund(&payment, &reason, initiated_by)
            .await;

        // The uniqueness constraint closes the race between two concurrent
        // processors that both passed the existence check above.
        self.store.insert_refund(refund.clone()).await?;

        self.cancel_booking(&booking, &reason).await;

        tracing::info!(
            %booking_id,
            refund_id = %refund.id,
            origin = ?refund.origin,
            %initiated_by,
            "refund recorded"
        );
        self.emit_refund(&booking, &payment, &reason).await;

        Ok(refund)
    }

    /// Asks the gateway for the refund; degrades to a locally-flagged record
    /// when the provider is unreachable, rejects the call or times out.
    async fn request_refund(
        &self,
        payment: &Payment,
        reason: &str,
        initiated_by: RefundInitiator,
    ) -> Refund {
        let base = Refund {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            amount: payment.amount,
            status: RefundStatus::Succeeded,
            reason: reason.to_string(),
            initiated_by,
            origin: RefundOrigin::GatewayConfirmed,
            gateway_refund_id: String::new(),
            created_at: self.clock.now(),
        };

        match with_gateway_timeout(
            self.call_timeout,
            self.gateway
                .create_refund(&payment.gateway_transaction_id, payment.amount, reason),
        )
        .await
        {
            Ok(confirmed) => Refund {
                status: confirmed.status,
                gateway_refund_id: confirmed.gateway_refund_id,
                ..base
            },
            Err(err) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    error = %err,
                    "gateway refund failed, recording local fallback for reconciliation"
                );
                Refund {
                    origin: RefundOrigin::LocalFallback,
                    gateway_refund_id: format!("LOCAL-{}", Uuid::new_v4().simple()),
                    ..base
                }
            }
        }
    }

    /// Moves the booking to Cancelled unless the rejection path already put
    /// it in Rejected. A concurrent transition is logged, not escalated: the
    /// refund record itself stands either way.
    async fn cancel_booking(&self, booking: &Booking, reason: &str) {
        if booking.status == BookingStatus::Rejected {
            return;
        }
        let result = self
            .store
            .transition_booking(
                booking.id,
                booking.status,
                BookingStatus::Cancelled,
                Some(reason.to_string()),
                self.clock.now(),
            )
            .await;
        if let Err(err) = result {
            tracing::warn!(booking_id = %booking.id, error = %err, "booking not cancelled");
        }
    }

    async fn emit_refund(&self, booking: &Booking, payment: &Payment, reason: &str) {
        let resource_name = match self.resources.get(booking.resource_id).await {
            Ok(Some(resource)) => resource.name,
            _ => "unknown resource".to_string(),
        };
        self.notifier.emit(NotificationEvent {
            kind: NotificationKind::RefundProcessed,
            booking_id: booking.id,
            resource_name,
            counterparty_name: payment.payer_name.clone(),
            amount: Some(payment.amount),
            reason: Some(reason.to_string()),
        });
    }
}
