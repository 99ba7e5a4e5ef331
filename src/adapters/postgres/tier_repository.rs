//! PostgreSQL implementation of TierRepository.

use async_trait::async_trait;
use sqlx::PgPool;

use super::rows::{TierRow, TIER_COLUMNS};
use crate::domain::billing::SubscriptionTier;
use crate::domain::foundation::{DomainError, TierId};
use crate::ports::TierRepository;

/// Read access to the tier catalog. Tiers are managed elsewhere.
#[derive(Clone)]
pub struct PostgresTierRepository {
    pool: PgPool,
}

impl PostgresTierRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TierRepository for PostgresTierRepository {
    async fn find_by_id(&self, id: &TierId) -> Result<Option<SubscriptionTier>, DomainError> {
        let sql = format!("SELECT {} FROM subscription_tiers WHERE id = $1", TIER_COLUMNS);
        let row: Option<TierRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("fetch tier", e))?;

        row.map(SubscriptionTier::try_from).transpose()
    }

    async fn list_available(&self) -> Result<Vec<SubscriptionTier>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM subscription_tiers
            WHERE is_active AND deleted_at IS NULL
            ORDER BY sort_order ASC, tier_level ASC
            "#,
            TIER_COLUMNS
        );
        let rows: Vec<TierRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("list tiers", e))?;

        rows.into_iter().map(SubscriptionTier::try_from).collect()
    }
}
