//! Billing error taxonomy.
//!
//! | Error | HTTP Status | Retry |
//! |-------|-------------|-------|
//! | Validation | 400 | no |
//! | NotFound | 404 | no |
//! | Conflict | 409 | no |
//! | InvalidState | 409 | no |
//! | Contention | 409 | yes |
//! | Gateway | 502 | when transport failed |
//! | Integrity | 500 | no |
//! | Infrastructure | 500 | yes |

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

use super::SubscriptionStatus;

/// Errors surfaced by billing operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Bad input: unknown ids, unusable tier, malformed metadata.
    Validation { field: String, message: String },

    /// Referenced entity does not exist.
    NotFound { entity: &'static str, id: String },

    /// The user already holds a live subscription, or the effect was
    /// already applied.
    Conflict(String),

    /// The subscription's status does not allow the operation.
    InvalidState {
        current: SubscriptionStatus,
        attempted: &'static str,
    },

    /// A concurrent writer changed or holds the row; retrying re-reads it.
    Contention(String),

    /// Remote gateway rejected the call or could not be reached.
    Gateway { message: String, retryable: bool },

    /// Unexpected constraint violation outside the known idempotency keys.
    Integrity(String),

    /// Storage or cache failure.
    Infrastructure(String),
}

impl BillingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BillingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        BillingError::Conflict(message.into())
    }

    pub fn invalid_state(current: SubscriptionStatus, attempted: &'static str) -> Self {
        BillingError::InvalidState { current, attempted }
    }

    pub fn contention(message: impl Into<String>) -> Self {
        BillingError::Contention(message.into())
    }

    pub fn gateway(message: impl Into<String>, retryable: bool) -> Self {
        BillingError::Gateway {
            message: message.into(),
            retryable,
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        BillingError::Integrity(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::Validation { .. } => ErrorCode::ValidationFailed,
            BillingError::NotFound { entity, .. } => match *entity {
                "user" => ErrorCode::UserNotFound,
                "tier" => ErrorCode::TierNotFound,
                _ => ErrorCode::SubscriptionNotFound,
            },
            BillingError::Conflict(_) => ErrorCode::AlreadySubscribed,
            BillingError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            BillingError::Contention(_) => ErrorCode::ConcurrencyConflict,
            BillingError::Gateway { .. } => ErrorCode::GatewayError,
            BillingError::Integrity(_) => ErrorCode::IntegrityViolation,
            BillingError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    pub fn message(&self) -> String {
        match self {
            BillingError::Validation { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            BillingError::NotFound { entity, id } => format!("{} not found: {}", entity, id),
            BillingError::Conflict(msg) => msg.clone(),
            BillingError::InvalidState { current, attempted } => {
                format!("Cannot {} a subscription in {} state", attempted, current)
            }
            BillingError::Contention(msg) => msg.clone(),
            BillingError::Gateway { message, .. } => format!("Payment gateway error: {}", message),
            BillingError::Integrity(msg) => format!("Integrity violation: {}", msg),
            BillingError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// True when the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::Gateway { retryable, .. } => *retryable,
            BillingError::Contention(_) | BillingError::Infrastructure(_) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        BillingError::validation(err.field().to_string(), err.to_string())
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => BillingError::Validation {
                field: err.details.get("field").cloned().unwrap_or_default(),
                message: err.message,
            },
            ErrorCode::AlreadySubscribed | ErrorCode::DuplicateSettlement => {
                BillingError::Conflict(err.message)
            }
            ErrorCode::ConcurrencyConflict => BillingError::Contention(err.message),
            ErrorCode::UniqueViolation | ErrorCode::IntegrityViolation => {
                BillingError::Integrity(err.message)
            }
            ErrorCode::UserNotFound => BillingError::NotFound {
                entity: "user",
                id: err.details.get("id").cloned().unwrap_or_default(),
            },
            ErrorCode::TierNotFound => BillingError::NotFound {
                entity: "tier",
                id: err.details.get("id").cloned().unwrap_or_default(),
            },
            ErrorCode::SubscriptionNotFound => BillingError::NotFound {
                entity: "subscription",
                id: err.details.get("id").cloned().unwrap_or_default(),
            },
            _ => BillingError::Infrastructure(err.message),
        }
    }
}
