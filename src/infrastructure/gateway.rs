use crate::config::WebhookCredentials;
use crate::domain::payment::{Amount, PaymentStatus, RefundStatus};
use crate::domain::ports::{GatewayRefund, InvoiceHandle, InvoiceRequest, PaymentGateway};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 over the raw payload, the signature scheme the
/// gateway uses on its webhooks.
pub fn sign_payload(secret: &str, raw_payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(raw_payload);
    hex::encode(mac.finalize().into_bytes())
}

fn verify_payload(secret: &str, raw_payload: &[u8], signature: &str) -> bool {
    let Ok(sig_bytes) = hex::decode(signature) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(raw_payload);
    // Constant-time comparison
    mac.verify_slice(&sig_bytes).is_ok()
}

/// Offline gateway adapter: issues deterministic invoice handles and refunds
/// without talking to a provider. Backs the CLI and the integration tests;
/// a networked adapter implements the same [`PaymentGateway`] port.
pub struct StaticGateway {
    credentials: WebhookCredentials,
    invoices: RwLock<HashMap<String, PaymentStatus>>,
}

impl StaticGateway {
    pub fn new(credentials: WebhookCredentials) -> Self {
        Self {
            credentials,
            invoices: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PaymentGateway for StaticGateway {
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<InvoiceHandle> {
        let gateway_id = format!("gw-{}", Uuid::new_v4().simple());
        self.invoices
            .write()
            .map_err(|_| BookingError::Gateway("invoice table poisoned".to_string()))?
            .insert(gateway_id.clone(), PaymentStatus::Unpaid);
        tracing::debug!(%gateway_id, invoice = %request.invoice_number, "invoice created");
        Ok(InvoiceHandle {
            hosted_payment_url: format!("https://pay.gateway.example/checkout/{gateway_id}"),
            gateway_id,
        })
    }

    async fn get_invoice(&self, gateway_id: &str) -> Result<PaymentStatus> {
        self.invoices
            .read()
            .map_err(|_| BookingError::Gateway("invoice table poisoned".to_string()))?
            .get(gateway_id)
            .copied()
            .ok_or_else(|| BookingError::Gateway(format!("unknown invoice {gateway_id}")))
    }

    async fn create_refund(
        &self,
        gateway_transaction_id: &str,
        amount: Amount,
        _reason: &str,
    ) -> Result<GatewayRefund> {
        tracing::debug!(%gateway_transaction_id, %amount, "refund created");
        Ok(GatewayRefund {
            gateway_refund_id: format!("rf-{}", Uuid::new_v4().simple()),
            status: RefundStatus::Succeeded,
        })
    }

    fn verify_signature(&self, raw_payload: &[u8], signature: &str) -> bool {
        match self.credentials.secret() {
            Some(secret) => verify_payload(secret, raw_payload, signature),
            None => {
                // Development bypass; unreachable in production because the
                // credentials constructor refuses a secretless production
                // config.
                tracing::warn!("webhook accepted without signature verification");
                true
            }
        }
    }
}
