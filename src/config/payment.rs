//! Payment gateway configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// Paystack-style gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Secret API key (`sk_test_...` / `sk_live_...`)
    pub secret_key: String,

    /// HMAC key for webhook signatures. The gateway signs with the secret
    /// key unless a separate one is configured.
    pub webhook_secret: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Gateway request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Where the hosted checkout returns the user when the client sends none
    pub default_callback_url: Option<String>,

    /// Answer 200 instead of 401 to unsigned webhooks so the sender stops
    /// retrying. The payload is still discarded.
    #[serde(default)]
    pub acknowledge_invalid_signatures: bool,
}

impl PaymentConfig {
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_")
    }

    pub fn is_live_mode(&self) -> bool {
        self.secret_key.starts_with("sk_live_")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_key(&self) -> SecretString {
        SecretString::new(self.secret_key.clone())
    }

    pub fn webhook_key(&self) -> SecretString {
        SecretString::new(
            self.webhook_secret
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| self.secret_key.clone()),
        )
    }

    pub fn validate(&self, environment: Environment) -> Result<(), ValidationError> {
        if self.secret_key.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__SECRET_KEY"));
        }
        if !self.secret_key.starts_with("sk_") {
            return Err(ValidationError::InvalidGatewayKey);
        }
        if self.is_live_mode() && environment != Environment::Production {
            return Err(ValidationError::LiveKeyOutsideProduction);
        }
        if !self.base_url.starts_with("https://") && !self.base_url.starts_with("http://") {
            return Err(ValidationError::InvalidGatewayUrl);
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            default_callback_url: None,
            acknowledge_invalid_signatures: false,
        }
    }
}

fn default_base_url() -> String {
    "https://api.paystack.co".to_string()
}

fn default_timeout() -> u64 {
    30
}
