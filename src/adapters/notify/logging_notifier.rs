//! Notifier that writes billing notifications to the structured log.
//!
//! Delivery (email, push) belongs to a downstream consumer of these events.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::{BillingNotification, UserNotifier};

#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UserNotifier for TracingNotifier {
    async fn notify(
        &self,
        user_id: &UserId,
        notification: BillingNotification,
    ) -> Result<(), DomainError> {
        let payload = serde_json::to_string(&notification).map_err(|e| {
            DomainError::new(
                ErrorCode::InternalError,
                format!("Failed to encode notification: {}", e),
            )
        })?;
        tracing::info!(user_id = %user_id, notification = %payload, "Billing notification");
        Ok(())
    }
}
