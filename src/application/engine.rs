use crate::application::expiry::{ExpiryScanner, SweepReport};
use crate::application::notifications::Notifier;
use crate::application::orchestrator::{BookingConfirmation, BookingOrchestrator, Decision};
use crate::application::reconciler::WebhookReconciler;
use crate::application::refunds::RefundProcessor;
use crate::config::GatewayConfig;
use crate::domain::booking::{Booking, BookingRequest};
use crate::domain::payment::{Payment, Refund, RefundInitiator};
use crate::domain::ports::{
    ClockRef, PaymentGatewayRef, ReservationStoreRef, ResourceStoreRef,
};
use crate::domain::resource::Resource;
use crate::error::Result;
use std::sync::Arc;
use uuid::Uuid;

/// The entry point for the booking lifecycle.
///
/// Owns the five components and the shared ports; the CLI and the tests talk
/// to this façade only.
pub struct BookingEngine {
    store: ReservationStoreRef,
    resources: ResourceStoreRef,
    orchestrator: BookingOrchestrator,
    reconciler: WebhookReconciler,
    refunds: Arc<RefundProcessor>,
    scanner: ExpiryScanner,
}

impl BookingEngine {
    pub fn new(
        store: ReservationStoreRef,
        resources: ResourceStoreRef,
        gateway: PaymentGatewayRef,
        clock: ClockRef,
        config: GatewayConfig,
        notifier: Notifier,
    ) -> Self {
        let refunds = Arc::new(RefundProcessor::new(
            Arc::clone(&store),
            Arc::clone(&resources),
            Arc::clone(&gateway),
            notifier.clone(),
            Arc::clone(&clock),
            config.call_timeout,
        ));
        let orchestrator = BookingOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&resources),
            Arc::clone(&gateway),
            Arc::clone(&refunds),
            notifier.clone(),
            Arc::clone(&clock),
            config,
        );
        let reconciler = WebhookReconciler::new(
            Arc::clone(&store),
            Arc::clone(&resources),
            gateway,
            notifier,
            Arc::clone(&clock),
        );
        let scanner = ExpiryScanner::new(Arc::clone(&store), Arc::clone(&refunds), clock);
        Self {
            store,
            resources,
            orchestrator,
            reconciler,
            refunds,
            scanner,
        }
    }

    pub async fn add_resource(&self, resource: Resource) -> Result<()> {
        self.resources.store(resource).await
    }

    pub async fn create(
        &self,
        requester_id: Uuid,
        request: BookingRequest,
    ) -> Result<BookingConfirmation> {
        self.orchestrator.create(requester_id, request).await
    }

    pub async fn decide(
        &self,
        booking_id: Uuid,
        decision: Decision,
        reason: Option<String>,
    ) -> Result<Booking> {
        self.orchestrator.decide(booking_id, decision, reason).await
    }

    /// Admin-initiated refund.
    pub async fn process_refund(&self, booking_id: Uuid, reason: String) -> Result<Refund> {
        self.refunds
            .process(booking_id, reason, RefundInitiator::Admin)
            .await
    }

    pub async fn handle_invoice_webhook(&self, raw_payload: &[u8], signature: &str) -> Result<()> {
        self.reconciler
            .handle_invoice_webhook(raw_payload, signature)
            .await
    }

    pub async fn handle_refund_webhook(&self, raw_payload: &[u8], signature: &str) -> Result<()> {
        self.reconciler
            .handle_refund_webhook(raw_payload, signature)
            .await
    }

    pub async fn run_expiry_scan(&self) -> Result<SweepReport> {
        self.scanner.run().await
    }

    pub async fn booking(&self, id: Uuid) -> Result<Option<Booking>> {
        self.store.booking(id).await
    }

    pub async fn payment_for_booking(&self, booking_id: Uuid) -> Result<Option<Payment>> {
        self.store.payment_for_booking(booking_id).await
    }

    pub async fn refund_for_booking(&self, booking_id: Uuid) -> Result<Option<Refund>> {
        match self.store.payment_for_booking(booking_id).await? {
            Some(payment) => self.store.refund_for_payment(payment.id).await,
            None => Ok(None),
        }
    }

    /// Locally-recorded refunds still awaiting gateway confirmation.
    pub async fn unreconciled_refunds(&self) -> Result<Vec<Refund>> {
        self.store.unreconciled_refunds().await
    }

    pub async fn all_bookings(&self) -> Result<Vec<Booking>> {
        self.store.all_bookings().await
    }
}
