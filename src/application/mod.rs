//! Application layer containing the core business logic.
//!
//! The five components of the booking lifecycle live here, composed behind
//! the [`engine::BookingEngine`] façade: the availability check, the
//! orchestrator for create/decide, the webhook reconciler, the refund
//! processor and the expiry scanner. They share the domain ports and the
//! outbound notification channel.

pub mod availability;
pub mod engine;
pub mod expiry;
pub mod notifications;
pub mod orchestrator;
pub mod reconciler;
pub mod refunds;

use crate::error::{BookingError, Result};
use std::time::Duration;

/// Bounds a synchronous gateway call; a timeout degrades into the same
/// `Gateway` error as an outright provider failure.
pub(crate) async fn with_gateway_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BookingError::Gateway(format!(
            "gateway call timed out after {limit:?}"
        ))),
    }
}
