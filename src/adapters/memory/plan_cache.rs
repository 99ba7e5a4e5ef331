//! Process-local plan code cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, TierId};
use crate::ports::PlanCodeCache;

#[derive(Clone, Default)]
pub struct InMemoryPlanCodeCache {
    codes: Arc<RwLock<HashMap<TierId, String>>>,
}

impl InMemoryPlanCodeCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanCodeCache for InMemoryPlanCodeCache {
    async fn get(&self, tier_id: &TierId) -> Result<Option<String>, DomainError> {
        Ok(self.codes.read().await.get(tier_id).cloned())
    }

    async fn put(&self, tier_id: &TierId, plan_code: &str) -> Result<(), DomainError> {
        self.codes
            .write()
            .await
            .insert(*tier_id, plan_code.to_string());
        Ok(())
    }
}
