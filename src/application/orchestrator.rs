use crate::application::availability::AvailabilityChecker;
use crate::application::notifications::{NotificationEvent, NotificationKind, Notifier};
use crate::application::refunds::RefundProcessor;
use crate::application::with_gateway_timeout;
use crate::config::GatewayConfig;
use crate::domain::booking::{Booking, BookingRequest, BookingStatus};
use crate::domain::payment::{Amount, Payment, PaymentStatus, RefundInitiator};
use crate::domain::ports::{
    ClockRef, InvoiceRequest, PaymentGatewayRef, ReservationStoreRef, ResourceStoreRef,
};
use crate::error::{BookingError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Returned to the requester after a successful `create`.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct BookingConfirmation {
    pub booking_id: Uuid,
    pub total_amount: Amount,
    pub rental_days: i64,
    pub payment_url: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// Validates requests, reserves the slot, creates the matching invoice and
/// handles the admin decision. The only component allowed to move a booking
/// to Approved.
pub struct BookingOrchestrator {
    store: ReservationStoreRef,
    resources: ResourceStoreRef,
    gateway: PaymentGatewayRef,
    refunds: Arc<RefundProcessor>,
    availability: AvailabilityChecker,
    notifier: Notifier,
    clock: ClockRef,
    config: GatewayConfig,
}

impl BookingOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: ReservationStoreRef,
        resources: ResourceStoreRef,
        gateway: PaymentGatewayRef,
        refunds: Arc<RefundProcessor>,
        notifier: Notifier,
        clock: ClockRef,
        config: GatewayConfig,
    ) -> Self {
        let availability = AvailabilityChecker::new(Arc::clone(&store));
        Self {
            store,
            resources,
            gateway,
            refunds,
            availability,
            notifier,
            clock,
            config,
        }
    }

    /// Creates a booking with its payment.
    ///
    /// The gateway invoice is requested before anything is persisted, so a
    /// provider failure or timeout leaves no partial Booking/Payment behind.
    /// The availability answer is re-checked inside the store's atomic
    /// `reserve`, which closes the check-then-act race between concurrent
    /// requests for overlapping windows.
    pub async fn create(
        &self,
        requester_id: Uuid,
        request: BookingRequest,
    ) -> Result<BookingConfirmation> {
        let (dates, times) = request.validate(self.clock.today())?;

        let resource = self
            .resources
            .get(request.resource_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("resource {}", request.resource_id)))?;

        if !self
            .availability
            .is_available(resource.id, &dates, &times)
            .await?
        {
            return Err(BookingError::Conflict(format!(
                "{} is not available for {} .. {}",
                resource.name, dates.start, dates.end
            )));
        }

        let rental_days = dates.rental_days();
        let total_amount = resource.unit_price_per_day.times_days(rental_days)?;

        let booking = Booking::new(
            resource.id,
            requester_id,
            request.activity_name.clone(),
            dates,
            times,
            request.proposal_document_ref.clone(),
            self.clock.now(),
        );
        let invoice_number = format!("INV-{}", booking.id.simple());

        let handle = with_gateway_timeout(
            self.config.call_timeout,
            self.gateway.create_invoice(InvoiceRequest {
                invoice_number: invoice_number.clone(),
                amount: total_amount,
                payer_name: request.payer_name.clone(),
                payer_email: request.payer_email.clone(),
                description: format!(
                    "{} at {} ({} .. {})",
                    request.activity_name, resource.name, dates.start, dates.end
                ),
                success_url: self.config.success_url.clone(),
                failure_url: self.config.failure_url.clone(),
            }),
        )
        .await?;

        let payment = Payment::new(
            booking.id,
            handle.gateway_id,
            invoice_number,
            total_amount,
            request.payer_name.clone(),
            request.payer_email,
        );

        let booking_id = booking.id;
        self.store.reserve(booking, payment).await?;

        tracing::info!(%booking_id, resource = %resource.name, %total_amount, "booking created");
        self.notifier.emit(NotificationEvent {
            kind: NotificationKind::BookingCreated,
            booking_id,
            resource_name: resource.name,
            counterparty_name: request.payer_name,
            amount: Some(total_amount),
            reason: None,
        });

        Ok(BookingConfirmation {
            booking_id,
            total_amount,
            rental_days,
            payment_url: handle.hosted_payment_url,
        })
    }

    /// Admin decision on a Processing booking.
    ///
    /// A payment event never approves a booking; this is the only approval
    /// path. Rejecting a paid booking synchronously refunds it.
    pub async fn decide(
        &self,
        booking_id: Uuid,
        decision: Decision,
        reason: Option<String>,
    ) -> Result<Booking> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;

        if booking.status != BookingStatus::Processing {
            return Err(BookingError::invalid_state(
                "booking",
                BookingStatus::Processing,
                booking.status,
            ));
        }

        match decision {
            Decision::Approve => {
                let updated = self
                    .store
                    .transition_booking(
                        booking_id,
                        BookingStatus::Processing,
                        BookingStatus::Approved,
                        None,
                        self.clock.now(),
                    )
                    .await?;
                tracing::info!(%booking_id, "booking approved");
                self.emit_decision(&updated, NotificationKind::BookingApproved, None)
                    .await;
                Ok(updated)
            }
            Decision::Reject => {
                let reason = reason
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| {
                        BookingError::Validation("a rejection reason is required".to_string())
                    })?;
                let updated = self
                    .store
                    .transition_booking(
                        booking_id,
                        BookingStatus::Processing,
                        BookingStatus::Rejected,
                        Some(reason.clone()),
                        self.clock.now(),
                    )
                    .await?;
                tracing::info!(%booking_id, %reason, "booking rejected");

                if let Some(payment) = self.store.payment_for_booking(booking_id).await?
                    && payment.status == PaymentStatus::Paid
                {
                    self.refunds
                        .process(booking_id, reason.clone(), RefundInitiator::Rejection)
                        .await?;
                }

                self.emit_decision(&updated, NotificationKind::BookingRejected, Some(reason))
                    .await;
                Ok(updated)
            }
        }
    }

    async fn emit_decision(
        &self,
        booking: &Booking,
        kind: NotificationKind,
        reason: Option<String>,
    ) {
        let resource_name = match self.resources.get(booking.resource_id).await {
            Ok(Some(resource)) => resource.name,
            _ => "unknown resource".to_string(),
        };
        let counterparty_name = match self.store.payment_for_booking(booking.id).await {
            Ok(Some(payment)) => payment.payer_name,
            _ => "unknown payer".to_string(),
        };
        self.notifier.emit(NotificationEvent {
            kind,
            booking_id: booking.id,
            resource_name,
            counterparty_name,
            amount: None,
            reason,
        });
    }
}
