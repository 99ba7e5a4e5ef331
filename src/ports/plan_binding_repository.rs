//! Tier to remote plan bindings.

use async_trait::async_trait;

use crate::domain::billing::RemotePlanBinding;
use crate::domain::foundation::{DomainError, TierId};

/// Result of a create-if-absent insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingInsert {
    /// Our binding was stored.
    Inserted(String),
    /// Another writer's binding was found on the in-transaction re-check.
    Existing(String),
    /// The partial unique index rejected our row; re-query for the winner.
    Conflict,
}

#[async_trait]
pub trait PlanBindingRepository: Send + Sync {
    async fn find_active(&self, tier_id: &TierId)
        -> Result<Option<RemotePlanBinding>, DomainError>;

    /// Re-checks for an active binding inside a transaction and stores
    /// `binding` only if none exists.
    async fn insert_if_absent(&self, binding: &RemotePlanBinding)
        -> Result<BindingInsert, DomainError>;
}
