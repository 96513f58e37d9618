use crate::domain::booking::{Booking, DateRange, TimeRange};
use crate::domain::ports::ReservationStoreRef;
use crate::error::Result;
use uuid::Uuid;

/// Answers "is this resource free for that window?".
///
/// Only Processing/Approved bookings block a slot; Rejected, Cancelled and
/// Completed bookings never conflict. This is a pre-check: the same predicate
/// runs again inside [`ReservationStore::reserve`] under the store's write
/// lock, so a positive answer here is never trusted alone.
///
/// [`ReservationStore::reserve`]: crate::domain::ports::ReservationStore::reserve
pub struct AvailabilityChecker {
    store: ReservationStoreRef,
}

impl AvailabilityChecker {
    pub fn new(store: ReservationStoreRef) -> Self {
        Self { store }
    }

    pub async fn is_available(
        &self,
        resource_id: Uuid,
        dates: &DateRange,
        times: &TimeRange,
    ) -> Result<bool> {
        let conflicts = self
            .store
            .conflicting_bookings(resource_id, dates, times)
            .await?;
        Ok(conflicts.is_empty())
    }
}

/// Pure form of the check, shared with the store implementations.
pub fn window_is_free(existing: &[Booking], dates: &DateRange, times: &TimeRange) -> bool {
    !existing.iter().any(|b| b.conflicts_with(dates, times))
}
