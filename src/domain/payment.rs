use crate::error::{BookingError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A positive monetary amount.
///
/// Wrapper around `rust_decimal::Decimal` so negative or zero charges are
/// unrepresentable in Payment/Refund records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(BookingError::Validation(format!(
                "amount must be positive, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Total for a whole rental window: per-day price times inclusive days.
    pub fn times_days(&self, days: i64) -> Result<Self> {
        Self::new(self.0 * Decimal::from(days))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = BookingError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Payment lifecycle as reported by the gateway and reconciled locally.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Expired,
    Failed,
    Settled,
}

impl PaymentStatus {
    /// Legal forward transitions. Webhooks arriving out of order would
    /// otherwise move a payment backwards (e.g. EXPIRED after PAID).
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Unpaid, Pending)
                | (Unpaid, Paid)
                | (Unpaid, Expired)
                | (Unpaid, Failed)
                | (Pending, Paid)
                | (Pending, Expired)
                | (Pending, Failed)
                | (Paid, Settled)
        )
    }

    /// Maps the gateway's status vocabulary onto ours. Unknown values are
    /// reported to the caller, which logs and drops the webhook.
    pub fn from_gateway(status: &str) -> Result<Self> {
        match status.to_ascii_uppercase().as_str() {
            "UNPAID" => Ok(Self::Unpaid),
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "EXPIRED" => Ok(Self::Expired),
            "FAILED" => Ok(Self::Failed),
            "SETTLED" => Ok(Self::Settled),
            other => Err(BookingError::Validation(format!(
                "unknown gateway payment status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Expired => "EXPIRED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Settled => "SETTLED",
        };
        f.write_str(s)
    }
}

/// The monetary record, exactly one per booking. Never deleted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    /// Id assigned by the gateway when the invoice was created.
    pub gateway_transaction_id: String,
    /// Our reference carried on the invoice; webhooks resolve through it.
    pub invoice_number: String,
    pub amount: Amount,
    pub status: PaymentStatus,
    /// Invoice payer contact, echoed into notification events.
    pub payer_name: String,
    pub payer_email: String,
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(
        booking_id: Uuid,
        gateway_transaction_id: String,
        invoice_number: String,
        amount: Amount,
        payer_name: String,
        payer_email: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            gateway_transaction_id,
            invoice_number,
            amount,
            status: PaymentStatus::Unpaid,
            payer_name,
            payer_email,
            payment_method: None,
            paid_at: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefundStatus {
    Succeeded,
    Failed,
    Pending,
}

/// Who asked for the money back.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefundInitiator {
    Admin,
    Rejection,
    Webhook,
    System,
}

impl std::fmt::Display for RefundInitiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RefundInitiator::Admin => "ADMIN",
            RefundInitiator::Rejection => "REJECTION",
            RefundInitiator::Webhook => "WEBHOOK",
            RefundInitiator::System => "SYSTEM",
        };
        f.write_str(s)
    }
}

/// Whether the gateway confirmed the refund or we recorded it locally after
/// a provider failure. LocalFallback rows feed the reconciliation queue.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefundOrigin {
    GatewayConfirmed,
    LocalFallback,
}

/// The monetary reversal, at most one per payment, always for the full
/// payment amount. Immutable once created.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Refund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount: Amount,
    pub status: RefundStatus,
    pub reason: String,
    pub initiated_by: RefundInitiator,
    pub origin: RefundOrigin,
    pub gateway_refund_id: String,
    pub created_at: DateTime<Utc>,
}
