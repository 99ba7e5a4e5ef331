//! "Notify user" capability. Delivery is someone else's concern.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::foundation::{DomainError, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillingNotification {
    SubscriptionActivated { tier_name: String, period_end: Timestamp },
    TrialStarted { tier_name: String, trial_end: Timestamp },
    SubscriptionCancelled { effective_at: Timestamp },
    PaymentFailed,
    SubscriptionExpired,
}

#[async_trait]
pub trait UserNotifier: Send + Sync {
    async fn notify(
        &self,
        user_id: &UserId,
        notification: BillingNotification,
    ) -> Result<(), DomainError>;
}
