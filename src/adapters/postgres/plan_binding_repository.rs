//! PostgreSQL implementation of PlanBindingRepository.
//!
//! The gateway plan is created before this adapter is called; only the
//! local row is written here. No row is locked: the partial unique index on
//! active bindings per tier decides between concurrent provisioners, and the
//! loser re-reads the winner's plan code.

use async_trait::async_trait;
use sqlx::PgPool;

use super::rows::{is_unique_violation, BindingRow};
use crate::domain::billing::RemotePlanBinding;
use crate::domain::foundation::{DomainError, TierId};
use crate::ports::{BindingInsert, PlanBindingRepository};

#[derive(Clone)]
pub struct PostgresPlanBindingRepository {
    pool: PgPool,
}

impl PostgresPlanBindingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanBindingRepository for PostgresPlanBindingRepository {
    async fn find_active(
        &self,
        tier_id: &TierId,
    ) -> Result<Option<RemotePlanBinding>, DomainError> {
        let row: Option<BindingRow> = sqlx::query_as(
            r#"
            SELECT id, tier_id, plan_code, is_active, created_at
            FROM remote_plan_bindings
            WHERE tier_id = $1 AND is_active
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tier_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("fetch plan binding", e))?;

        Ok(row.map(RemotePlanBinding::from))
    }

    async fn insert_if_absent(
        &self,
        binding: &RemotePlanBinding,
    ) -> Result<BindingInsert, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("begin transaction", e))?;

        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT plan_code FROM remote_plan_bindings WHERE tier_id = $1 AND is_active LIMIT 1",
        )
        .bind(binding.tier_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DomainError::database("re-check plan binding", e))?;

        if let Some((plan_code,)) = existing {
            tx.rollback().await.ok();
            return Ok(BindingInsert::Existing(plan_code));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO remote_plan_bindings (id, tier_id, plan_code, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(binding.id.as_uuid())
        .bind(binding.tier_id.as_uuid())
        .bind(&binding.plan_code)
        .bind(binding.is_active)
        .bind(binding.created_at.as_datetime())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            // Partial unique index on active bindings per tier.
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await.ok();
                return Ok(BindingInsert::Conflict);
            }
            Err(e) => {
                tx.rollback().await.ok();
                return Err(DomainError::database("insert plan binding", e));
            }
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::database("commit plan binding", e))?;

        Ok(BindingInsert::Inserted(binding.plan_code.clone()))
    }
}
