//! Webhook processing errors.
//!
//! The status code decides whether the gateway redelivers: 2xx is final,
//! 4xx is final, 5xx is retried with the same body.

use axum::http::StatusCode;
use thiserror::Error;

use super::BillingError;

#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature missing or wrong. Security event.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Body is not a JSON event envelope.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Echoed transaction metadata lacks a required key.
    #[error("Missing metadata: {0}")]
    MissingMetadata(&'static str),

    /// Event payload lacks a required field.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// The event can never be applied (unknown tier, bad ids).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Another writer holds or changed the subscription row.
    #[error("Contention: {0}")]
    Contention(String),

    /// Re-verification with the gateway failed.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Unexpected constraint violation.
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// True if the gateway should redeliver.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Contention(_) | WebhookError::Gateway(_) | WebhookError::Database(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::ParseError(_)
            | WebhookError::MissingMetadata(_)
            | WebhookError::MissingField(_)
            | WebhookError::Rejected(_) => StatusCode::BAD_REQUEST,
            WebhookError::Contention(_) | WebhookError::Gateway(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            WebhookError::Integrity(_) | WebhookError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<BillingError> for WebhookError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation { .. }
            | BillingError::NotFound { .. }
            | BillingError::Conflict(_)
            | BillingError::InvalidState { .. } => WebhookError::Rejected(err.message()),
            BillingError::Contention(msg) => WebhookError::Contention(msg),
            BillingError::Gateway { message, .. } => WebhookError::Gateway(message),
            BillingError::Integrity(msg) => WebhookError::Integrity(msg),
            BillingError::Infrastructure(msg) => WebhookError::Database(msg),
        }
    }
}
