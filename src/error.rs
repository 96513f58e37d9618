use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BookingError>;

/// Error taxonomy for the booking engine.
///
/// `Validation`, `Conflict`, `InvalidState` and `NotFound` are caller-visible
/// business errors. `Authentication` covers webhook signature mismatches.
/// `Gateway` covers provider failures and timeouts; on the create path it
/// guarantees no partial Booking/Payment state was left behind.
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("slot unavailable: {0}")]
    Conflict(String),
    #[error("invalid state: {entity} is {actual}, expected {expected}")]
    InvalidState {
        entity: String,
        expected: String,
        actual: String,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("webhook authentication failed: {0}")]
    Authentication(String),
    #[error("payment gateway error: {0}")]
    Gateway(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl BookingError {
    /// Builds an `InvalidState` error from status-like values.
    pub fn invalid_state(
        entity: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidState {
            entity: entity.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
