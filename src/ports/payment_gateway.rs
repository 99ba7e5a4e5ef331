//! Payment gateway port.
//!
//! Typed boundary around the processor's HTTP API. Implementations perform
//! no local state mutation and must be called outside database transactions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a one-time charge and returns the hosted payment handle.
    async fn initialize_transaction(
        &self,
        request: InitializeTransaction,
    ) -> Result<TransactionAuthorization, GatewayError>;

    /// Server-to-server confirmation of a charge by reference.
    async fn verify_transaction(&self, reference: &str)
        -> Result<VerifiedTransaction, GatewayError>;

    /// Creates a recurring billing plan.
    async fn create_plan(&self, request: CreatePlan) -> Result<RemotePlan, GatewayError>;

    async fn create_subscription(
        &self,
        customer_code: &str,
        plan_code: &str,
    ) -> Result<RemoteSubscription, GatewayError>;

    /// Fetches a subscription; the response carries the email token that
    /// `disable_subscription` requires.
    async fn fetch_subscription(
        &self,
        subscription_code: &str,
    ) -> Result<RemoteSubscription, GatewayError>;

    async fn disable_subscription(
        &self,
        subscription_code: &str,
        email_token: &str,
    ) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitializeTransaction {
    pub email: String,
    /// Minor currency units.
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
    /// Recurring plan; `None` for one-off charges.
    pub plan_code: Option<String>,
    pub callback_url: Option<String>,
    /// Echoed back verbatim on verification.
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAuthorization {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Result of verifying a charge with the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedTransaction {
    pub id: Option<String>,
    pub reference: String,
    /// Gateway status string: "success", "failed", "abandoned", ...
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
    pub paid_at: Option<Timestamp>,
    pub channel: Option<String>,
    pub customer_code: Option<String>,
    pub customer_email: Option<String>,
    pub gateway_response: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl VerifiedTransaction {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatePlan {
    pub name: String,
    /// "monthly" or "annually".
    pub interval: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlan {
    pub plan_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSubscription {
    pub subscription_code: String,
    pub email_token: Option<String>,
    pub status: String,
    pub customer_code: Option<String>,
    pub plan_code: Option<String>,
    pub next_payment_date: Option<String>,
}

/// Errors from gateway calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
    /// HTTP status, when a response arrived.
    pub status: Option<u16>,
    /// Raw response body for diagnostics.
    pub body: Option<String>,
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            body: None,
            retryable: code.is_retryable(),
        }
    }

    /// Non-2xx response. 5xx and 429 are retryable.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        let code = match status {
            401 | 403 => GatewayErrorCode::Authentication,
            404 => GatewayErrorCode::NotFound,
            429 => GatewayErrorCode::RateLimited,
            s if s >= 500 => GatewayErrorCode::Provider,
            _ => GatewayErrorCode::Rejected,
        };
        let body = body.into();
        Self {
            code,
            message: format!("gateway returned HTTP {}", status),
            status: Some(status),
            retryable: code.is_retryable(),
            body: Some(body),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Timeout, message)
    }

    /// `status: false` envelope.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Rejected, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidResponse, message)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for BillingError {
    fn from(err: GatewayError) -> Self {
        BillingError::gateway(err.to_string(), err.retryable)
    }
}

impl From<GatewayError> for DomainError {
    fn from(err: GatewayError) -> Self {
        DomainError::new(ErrorCode::GatewayError, err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    Network,
    Timeout,
    Authentication,
    NotFound,
    RateLimited,
    /// The gateway answered with `status: false` or a 4xx.
    Rejected,
    /// Body did not decode into the expected envelope.
    InvalidResponse,
    /// Gateway-side 5xx.
    Provider,
}

impl GatewayErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::Network
                | GatewayErrorCode::Timeout
                | GatewayErrorCode::RateLimited
                | GatewayErrorCode::Provider
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::Network => "network_error",
            GatewayErrorCode::Timeout => "timeout",
            GatewayErrorCode::Authentication => "authentication_error",
            GatewayErrorCode::NotFound => "not_found",
            GatewayErrorCode::RateLimited => "rate_limited",
            GatewayErrorCode::Rejected => "rejected",
            GatewayErrorCode::InvalidResponse => "invalid_response",
            GatewayErrorCode::Provider => "provider_error",
        };
        write!(f, "{}", s)
    }
}
