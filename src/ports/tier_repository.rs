//! Read access to administrator-managed tiers.

use async_trait::async_trait;

use crate::domain::billing::SubscriptionTier;
use crate::domain::foundation::{DomainError, TierId};

#[async_trait]
pub trait TierRepository: Send + Sync {
    /// Includes soft-deleted and inactive tiers; callers check availability.
    async fn find_by_id(&self, id: &TierId) -> Result<Option<SubscriptionTier>, DomainError>;

    /// Active, non-deleted tiers ordered by `sort_order`.
    async fn list_available(&self) -> Result<Vec<SubscriptionTier>, DomainError>;
}
