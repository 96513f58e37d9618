use crate::application::refunds::RefundProcessor;
use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::payment::{PaymentStatus, RefundInitiator};
use crate::domain::ports::{ClockRef, ReservationStoreRef};
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome counts of one expiry sweep.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct SweepReport {
    pub scanned: usize,
    pub rejected: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Periodic sweep resolving bookings whose window has passed without a
/// terminal decision: Processing expires into Rejected (refunding paid
/// payments), Approved rolls forward into Completed.
///
/// Runs are serialised through an internal mutex so two overlapping timers
/// cannot interleave over the same rows. Per-item failures are counted and
/// logged, never allowed to abort the rest of the sweep.
pub struct ExpiryScanner {
    store: ReservationStoreRef,
    refunds: Arc<RefundProcessor>,
    clock: ClockRef,
    sweep_lock: Mutex<()>,
}

impl ExpiryScanner {
    pub fn new(store: ReservationStoreRef, refunds: Arc<RefundProcessor>, clock: ClockRef) -> Self {
        Self {
            store,
            refunds,
            clock,
            sweep_lock: Mutex::new(()),
        }
    }

    pub async fn run(&self) -> Result<SweepReport> {
        let _guard = self.sweep_lock.lock().await;

        let today = self.clock.today();
        let expiring = self.store.expiring_bookings(today).await?;

        let mut report = SweepReport {
            scanned: expiring.len(),
            ..SweepReport::default()
        };

        for booking in expiring {
            match self.resolve(&booking).await {
                Ok(BookingStatus::Rejected) => report.rejected += 1,
                Ok(BookingStatus::Completed) => report.completed += 1,
                Ok(_) => {}
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(booking_id = %booking.id, %err, "expiry sweep item failed");
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            rejected = report.rejected,
            completed = report.completed,
            failed = report.failed,
            "expiry sweep finished"
        );
        Ok(report)
    }

    async fn resolve(&self, booking: &Booking) -> Result<BookingStatus> {
        match booking.status {
            BookingStatus::Processing => {
                self.store
                    .transition_booking(
                        booking.id,
                        BookingStatus::Processing,
                        BookingStatus::Rejected,
                        Some("expired".to_string()),
                        self.clock.now(),
                    )
                    .await?;

                if let Some(payment) = self.store.payment_for_booking(booking.id).await?
                    && payment.status == PaymentStatus::Paid
                {
                    self.refunds
                        .process(booking.id, "expired".to_string(), RefundInitiator::System)
                        .await?;
                }
                Ok(BookingStatus::Rejected)
            }
            BookingStatus::Approved => {
                self.store
                    .transition_booking(
                        booking.id,
                        BookingStatus::Approved,
                        BookingStatus::Completed,
                        None,
                        self.clock.now(),
                    )
                    .await?;
                Ok(BookingStatus::Completed)
            }
            // expiring_bookings only yields Processing/Approved; anything else
            // was resolved by a concurrent actor after the scan.
            other => Ok(other),
        }
    }
}
