//! Subscription persistence.
//!
//! Writes that change entitlement also update the owning user's premium
//! flag in the same transaction.

use async_trait::async_trait;

use crate::domain::billing::UserSubscription;
use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The user already holds a live row, or another writer holds it.
    CurrentExists,
}

/// Keyset position in the lapsed scan, ordered by `(current_period_end, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LapsedCursor {
    pub period_end: Timestamp,
    pub id: SubscriptionId,
}

impl LapsedCursor {
    /// Position just after `subscription`.
    pub fn after(subscription: &UserSubscription) -> Self {
        Self {
            period_end: subscription.current_period_end,
            id: subscription.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireOutcome {
    Expired { user_id: UserId },
    /// Already expired or changed by a concurrent writer.
    Skipped,
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// The user's live (trialing, active, past due) subscription.
    async fn find_current_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSubscription>, DomainError>;

    /// Latest row carrying this gateway subscription code, any status.
    async fn find_by_remote_subscription_code(
        &self,
        code: &str,
    ) -> Result<Option<UserSubscription>, DomainError>;

    /// Latest row for this gateway customer, any status.
    async fn find_by_customer_code(
        &self,
        code: &str,
    ) -> Result<Option<UserSubscription>, DomainError>;

    /// Inserts a subscription unless the user already holds a live one.
    async fn create_if_none_current(
        &self,
        subscription: &UserSubscription,
    ) -> Result<CreateOutcome, DomainError>;

    /// Persists field changes and syncs the user's premium flag.
    ///
    /// Only writes when the stored row still has `subscription.version`;
    /// otherwise fails with `ConcurrencyConflict` and changes nothing.
    async fn save(&self, subscription: &UserSubscription) -> Result<(), DomainError>;

    /// Active rows past their period end and trialing rows past trial end,
    /// ordered by `(current_period_end, id)` and starting after `after`.
    async fn find_lapsed(
        &self,
        now: Timestamp,
        after: Option<LapsedCursor>,
        limit: u32,
    ) -> Result<Vec<UserSubscription>, DomainError>;

    /// Expires one lapsed row in its own transaction and clears the user's
    /// premium flag.
    async fn expire_lapsed(
        &self,
        id: &SubscriptionId,
        now: Timestamp,
    ) -> Result<ExpireOutcome, DomainError>;
}
