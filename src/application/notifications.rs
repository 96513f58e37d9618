use crate::domain::payment::Amount;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingCreated,
    BookingApproved,
    BookingRejected,
    PaymentPaid,
    PaymentFailed,
    RefundProcessed,
}

/// Outbound event handed to whatever delivers notifications (mail, chat, ...).
/// Delivery mechanics live outside this crate.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub booking_id: Uuid,
    pub resource_name: String,
    pub counterparty_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Fire-and-forget sender over an unbounded channel.
///
/// `emit` never blocks and never fails the caller: a slow or absent consumer
/// cannot affect the latency or outcome of the core transaction.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: NotificationEvent) {
        if let Err(err) = self.tx.send(event) {
            tracing::warn!(event = ?err.0.kind, "notification dropped: no consumer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: NotificationKind) -> NotificationEvent {
        NotificationEvent {
            kind,
            booking_id: Uuid::new_v4(),
            resource_name: "Main hall".to_string(),
            counterparty_name: "Dana".to_string(),
            amount: None,
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_emit_delivers_to_consumer() {
        let (notifier, mut rx) = Notifier::channel();
        notifier.emit(event(NotificationKind::BookingCreated));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, NotificationKind::BookingCreated);
    }

    #[tokio::test]
    async fn test_emit_survives_dropped_consumer() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        // Must not panic or block
        notifier.emit(event(NotificationKind::PaymentFailed));
    }
}
