use crate::error::{BookingError, Result};
use std::time::Duration;

/// Deployment environment the engine runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl std::str::FromStr for Environment {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(BookingError::Validation(format!(
                "unknown environment: {other}"
            ))),
        }
    }
}

/// Webhook shared-secret material, validated at construction.
///
/// A production configuration without a secret cannot be built, so shipping
/// with signature verification disabled is a constructor error rather than a
/// runtime surprise. Development mode without a secret is allowed but loud.
#[derive(Debug, Clone)]
pub struct WebhookCredentials {
    environment: Environment,
    secret: Option<String>,
}

impl WebhookCredentials {
    pub fn new(environment: Environment, secret: Option<String>) -> Result<Self> {
        let secret = secret.filter(|s| !s.is_empty());
        if environment == Environment::Production && secret.is_none() {
            return Err(BookingError::Validation(
                "webhook secret is required in production".to_string(),
            ));
        }
        if secret.is_none() {
            tracing::warn!(
                "webhook signature verification DISABLED (development mode, no secret configured)"
            );
        }
        Ok(Self {
            environment,
            secret,
        })
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Returns the secret, or `None` when running the development bypass.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }
}

/// Static settings for the payment gateway adapter.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub webhook: WebhookCredentials,
    /// Upper bound for any synchronous gateway call (invoice/refund creation).
    pub call_timeout: Duration,
    /// Where the hosted checkout sends the payer afterwards.
    pub success_url: String,
    pub failure_url: String,
}

impl GatewayConfig {
    pub fn new(webhook: WebhookCredentials) -> Self {
        Self {
            webhook,
            call_timeout: Duration::from_secs(10),
            success_url: "https://bookings.example/payment/success".to_string(),
            failure_url: "https://bookings.example/payment/failure".to_string(),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}
