use crate::application::notifications::{NotificationEvent, NotificationKind, Notifier};
use crate::domain::booking::BookingStatus;
use crate::domain::payment::{
    Payment, PaymentStatus, Refund, RefundInitiator, RefundOrigin, RefundStatus,
};
use crate::domain::ports::{ClockRef, PaymentGatewayRef, ReservationStoreRef, ResourceStoreRef};
use crate::error::{BookingError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Invoice callback body: `{external_id, status, payment_method, paid_amount}`.
/// `external_id` is our invoice number.
#[derive(Debug, Deserialize)]
pub struct InvoiceWebhook {
    pub external_id: String,
    pub status: String,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub paid_amount: Option<Decimal>,
}

/// Refund callback body: `{id, status, reference_id, amount, payment_id}`.
/// `payment_id` is the gateway's transaction id for the original invoice.
#[derive(Debug, Deserialize)]
pub struct RefundWebhook {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub reference_id: Option<String>,
    pub amount: Decimal,
    pub payment_id: String,
}

/// Consumes gateway callbacks and reconciles Payment/Booking/Refund state.
///
/// Deliveries are at-least-once, possibly duplicated and possibly out of
/// order, so every handler is idempotent. Unresolvable references are logged
/// and acknowledged: returning an error would only make the sender retry
/// forever.
pub struct WebhookReconciler {
    store: ReservationStoreRef,
    resources: ResourceStoreRef,
    gateway: PaymentGatewayRef,
    notifier: Notifier,
    clock: ClockRef,
}

impl WebhookReconciler {
    pub fn new(
        store: ReservationStoreRef,
        resources: ResourceStoreRef,
        gateway: PaymentGatewayRef,
        notifier: Notifier,
        clock: ClockRef,
    ) -> Self {
        Self {
            store,
            resources,
            gateway,
            notifier,
            clock,
        }
    }

    fn authenticate(&self, raw_payload: &[u8], signature: &str) -> Result<()> {
        if self.gateway.verify_signature(raw_payload, signature) {
            Ok(())
        } else {
            Err(BookingError::Authentication(
                "webhook signature mismatch".to_string(),
            ))
        }
    }

    /// Applies an invoice status callback to the matching payment.
    ///
    /// A transition to Paid touches the payment only; the booking stays in
    /// Processing until an admin decides. Redelivery of an identical payload
    /// and out-of-order downgrades are both no-ops.
    pub async fn handle_invoice_webhook(&self, raw_payload: &[u8], signature: &str) -> Result<()> {
        self.authenticate(raw_payload, signature)?;
        let payload: InvoiceWebhook = serde_json::from_slice(raw_payload)?;

        let target = match PaymentStatus::from_gateway(&payload.status) {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(status = %payload.status, %err, "dropping invoice webhook");
                return Ok(());
            }
        };

        let Some(payment) = self.store.payment_by_invoice(&payload.external_id).await? else {
            tracing::info!(
                external_id = %payload.external_id,
                "invoice webhook references no known payment, acknowledging"
            );
            return Ok(());
        };

        if payment.status == target {
            tracing::debug!(payment_id = %payment.id, status = %target, "duplicate delivery");
            return Ok(());
        }
        if !payment.status.can_transition_to(target) {
            tracing::warn!(
                payment_id = %payment.id,
                current = %payment.status,
                requested = %target,
                "out-of-order invoice webhook ignored"
            );
            return Ok(());
        }

        let paid_at = (target == PaymentStatus::Paid).then(|| self.clock.now());
        match self
            .store
            .transition_payment(
                payment.id,
                payment.status,
                target,
                payload.payment_method.clone(),
                paid_at,
            )
            .await
        {
            Ok(_) => {}
            // A concurrent delivery won the CAS; the state is already settled.
            Err(BookingError::InvalidState { .. }) => {
                tracing::debug!(payment_id = %payment.id, "lost CAS to concurrent delivery");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        match target {
            PaymentStatus::Paid => {
                if let Some(paid) = payload.paid_amount
                    && paid != payment.amount.value()
                {
                    tracing::warn!(
                        payment_id = %payment.id,
                        expected = %payment.amount,
                        reported = %paid,
                        "gateway reported a different paid amount"
                    );
                }
                tracing::info!(payment_id = %payment.id, "payment marked paid");
                self.emit(&payment, NotificationKind::PaymentPaid, None).await;
            }
            PaymentStatus::Failed | PaymentStatus::Expired => {
                tracing::info!(payment_id = %payment.id, status = %target, "payment not collected");
                self.emit(
                    &payment,
                    NotificationKind::PaymentFailed,
                    Some(format!("gateway reported {target}")),
                )
                .await;
            }
            _ => {}
        }

        Ok(())
    }

    /// Applies a refund callback. A payment that already has a refund is left
    /// untouched, which absorbs the gateway's at-least-once delivery.
    pub async fn handle_refund_webhook(&self, raw_payload: &[u8], signature: &str) -> Result<()> {
        self.authenticate(raw_payload, signature)?;
        let payload: RefundWebhook = serde_json::from_slice(raw_payload)?;

        let Some(payment) = self
            .store
            .payment_by_gateway_id(&payload.payment_id)
            .await?
        else {
            tracing::info!(
                gateway_payment_id = %payload.payment_id,
                "refund webhook references no known payment, acknowledging"
            );
            return Ok(());
        };

        // A refund only ever reverses collected money.
        if !matches!(
            payment.status,
            PaymentStatus::Paid | PaymentStatus::Settled
        ) {
            tracing::warn!(
                payment_id = %payment.id,
                status = %payment.status,
                "refund webhook for an uncollected payment, ignoring"
            );
            return Ok(());
        }

        if self.store.refund_for_payment(payment.id).await?.is_some() {
            tracing::debug!(payment_id = %payment.id, "refund already recorded, acknowledging");
            return Ok(());
        }

        if !payload.status.eq_ignore_ascii_case("SUCCEEDED") {
            tracing::info!(
                payment_id = %payment.id,
                status = %payload.status,
                "non-terminal refund webhook, nothing to record"
            );
            return Ok(());
        }

        if payload.amount != payment.amount.value() {
            tracing::warn!(
                payment_id = %payment.id,
                expected = %payment.amount,
                reported = %payload.amount,
                "refund webhook amount mismatch, ignoring (no partial refunds)"
            );
            return Ok(());
        }

        let refund = Refund {
            id: uuid::Uuid::new_v4(),
            payment_id: payment.id,
            amount: payment.amount,
            status: RefundStatus::Succeeded,
            reason: "refund reported by gateway".to_string(),
            initiated_by: RefundInitiator::Webhook,
            origin: RefundOrigin::GatewayConfirmed,
            gateway_refund_id: payload.id.clone(),
            created_at: self.clock.now(),
        };
        match self.store.insert_refund(refund).await {
            Ok(()) => {}
            Err(BookingError::InvalidState { .. }) => {
                tracing::debug!(payment_id = %payment.id, "refund raced a concurrent writer");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        if let Some(booking) = self.store.booking(payment.booking_id).await?
            && booking.status.blocks_availability()
        {
            let result = self
                .store
                .transition_booking(
                    booking.id,
                    booking.status,
                    BookingStatus::Cancelled,
                    Some("refunded by gateway".to_string()),
                    self.clock.now(),
                )
                .await;
            if let Err(err) = result {
                tracing::warn!(booking_id = %booking.id, %err, "booking not cancelled");
            }
        }

        tracing::info!(payment_id = %payment.id, gateway_refund_id = %payload.id, "refund recorded");
        self.emit(
            &payment,
            NotificationKind::RefundProcessed,
            Some("refund reported by gateway".to_string()),
        )
        .await;

        Ok(())
    }

    async fn emit(&self, payment: &Payment, kind: NotificationKind, reason: Option<String>) {
        let resource_name = match self.store.booking(payment.booking_id).await {
            Ok(Some(booking)) => match self.resources.get(booking.resource_id).await {
                Ok(Some(resource)) => resource.name,
                _ => "unknown resource".to_string(),
            },
            _ => "unknown resource".to_string(),
        };
        self.notifier.emit(NotificationEvent {
            kind,
            booking_id: payment.booking_id,
            resource_name,
            counterparty_name: payment.payer_name.clone(),
            amount: Some(payment.amount),
            reason,
        });
    }
}
