//! Cache in front of plan bindings.
//!
//! Advisory only: the binding table stays authoritative and cache errors
//! never fail a request.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, TierId};

#[async_trait]
pub trait PlanCodeCache: Send + Sync {
    async fn get(&self, tier_id: &TierId) -> Result<Option<String>, DomainError>;

    async fn put(&self, tier_id: &TierId, plan_code: &str) -> Result<(), DomainError>;
}
