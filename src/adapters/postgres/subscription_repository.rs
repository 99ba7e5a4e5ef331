//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Every write recomputes `users.is_premium` in the same transaction.
//! Updates are guarded by the row's `version`; row locks are only ever taken
//! with `SKIP LOCKED`.

use async_trait::async_trait;
use sqlx::PgPool;

use super::rows::{
    insert_subscription, stale_write, sync_premium, update_subscription, violates,
    SubscriptionRow, CURRENT_STATUSES, ONE_LIVE_SUBSCRIPTION_IDX, SUBSCRIPTION_COLUMNS,
};
use crate::domain::billing::UserSubscription;
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use crate::ports::{CreateOutcome, ExpireOutcome, LapsedCursor, SubscriptionRepository};

#[derive(Clone)]
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(
        &self,
        filter: &str,
        value: &str,
        operation: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM user_subscriptions
            WHERE {} = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            SUBSCRIPTION_COLUMNS, filter
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(operation, e))?;

        row.map(UserSubscription::try_from).transpose()
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn find_current_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSubscription>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM user_subscriptions
            WHERE user_id = $1 AND is_active AND deleted_at IS NULL
              AND status IN {}
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            SUBSCRIPTION_COLUMNS, CURRENT_STATUSES
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("fetch current subscription", e))?;

        row.map(UserSubscription::try_from).transpose()
    }

    async fn find_by_remote_subscription_code(
        &self,
        code: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        self.find_one(
            "remote_subscription_code",
            code,
            "fetch subscription by remote code",
        )
        .await
    }

    async fn find_by_customer_code(
        &self,
        code: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        self.find_one(
            "remote_customer_code",
            code,
            "fetch subscription by customer code",
        )
        .await
    }

    async fn create_if_none_current(
        &self,
        subscription: &UserSubscription,
    ) -> Result<CreateOutcome, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("begin transaction", e))?;

        let user_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(subscription.user_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| DomainError::database("check user", e))?;
        if !user_exists {
            tx.rollback().await.ok();
            return Err(
                DomainError::new(ErrorCode::UserNotFound, "User not found")
                    .with_detail("id", subscription.user_id.to_string()),
            );
        }

        // Plain read: a live row, locked or not, occupies the slot. Racing
        // inserts are settled by the one-live index.
        let sql = format!(
            r#"
            SELECT 1 FROM user_subscriptions
            WHERE user_id = $1 AND is_active AND deleted_at IS NULL
              AND status IN {}
            LIMIT 1
            "#,
            CURRENT_STATUSES
        );
        let current: Option<(i32,)> = sqlx::query_as(&sql)
            .bind(subscription.user_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DomainError::database("check current subscription", e))?;
        if current.is_some() {
            tx.rollback().await.ok();
            return Ok(CreateOutcome::CurrentExists);
        }

        match insert_subscription(&mut tx, subscription).await {
            Ok(()) => {}
            Err(e) if violates(&e, ONE_LIVE_SUBSCRIPTION_IDX) => {
                tx.rollback().await.ok();
                return Ok(CreateOutcome::CurrentExists);
            }
            Err(e) => {
                tx.rollback().await.ok();
                return Err(DomainError::database("insert subscription", e));
            }
        }

        if let Err(e) = sync_premium(&mut tx, &subscription.user_id).await {
            tx.rollback().await.ok();
            return Err(DomainError::database("sync premium flag", e));
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::database("commit subscription", e))?;

        Ok(CreateOutcome::Created)
    }

    async fn save(&self, subscription: &UserSubscription) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("begin transaction", e))?;

        let updated = match update_subscription(&mut tx, subscription).await {
            Ok(updated) => updated,
            Err(e) => {
                tx.rollback().await.ok();
                if violates(&e, ONE_LIVE_SUBSCRIPTION_IDX) {
                    return Err(DomainError::new(
                        ErrorCode::AlreadySubscribed,
                        "User already has a current subscription",
                    ));
                }
                return Err(DomainError::database("update subscription", e));
            }
        };

        if updated == 0 {
            let err = match stale_write(&mut tx, subscription).await {
                Ok(err) => err,
                Err(e) => DomainError::database("check subscription", e),
            };
            tx.rollback().await.ok();
            return Err(err);
        }

        if let Err(e) = sync_premium(&mut tx, &subscription.user_id).await {
            tx.rollback().await.ok();
            return Err(DomainError::database("sync premium flag", e));
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::database("commit subscription", e))?;

        Ok(())
    }

    async fn find_lapsed(
        &self,
        now: Timestamp,
        after: Option<LapsedCursor>,
        limit: u32,
    ) -> Result<Vec<UserSubscription>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM user_subscriptions
            WHERE is_active AND deleted_at IS NULL
              AND (
                (status = 'active' AND current_period_end < $1)
                OR (status = 'trialing' AND trial_end < $1)
              )
              AND ($2::timestamptz IS NULL OR (current_period_end, id) > ($2, $3))
            ORDER BY current_period_end ASC, id ASC
            LIMIT $4
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(now.as_datetime())
            .bind(after.map(|c| c.period_end.into_datetime()))
            .bind(after.map(|c| *c.id.as_uuid()))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("find lapsed subscriptions", e))?;

        rows.into_iter().map(UserSubscription::try_from).collect()
    }

    async fn expire_lapsed(
        &self,
        id: &SubscriptionId,
        now: Timestamp,
    ) -> Result<ExpireOutcome, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("begin transaction", e))?;

        // Rows held by a concurrent settlement are picked up next sweep.
        let sql = format!(
            "SELECT {} FROM user_subscriptions WHERE id = $1 FOR UPDATE SKIP LOCKED",
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DomainError::database("lock subscription", e))?;

        let Some(row) = row else {
            tx.rollback().await.ok();
            return Ok(ExpireOutcome::Skipped);
        };
        let mut subscription = UserSubscription::try_from(row)?;

        // Re-evaluated under the lock; a renewal may have landed since the scan.
        if !subscription.has_lapsed(now) || subscription.expire(now).is_err() {
            tx.rollback().await.ok();
            return Ok(ExpireOutcome::Skipped);
        }

        match update_subscription(&mut tx, &subscription).await {
            Ok(1) => {}
            Ok(_) => {
                tx.rollback().await.ok();
                return Ok(ExpireOutcome::Skipped);
            }
            Err(e) => {
                tx.rollback().await.ok();
                return Err(DomainError::database("expire subscription", e));
            }
        }
        if let Err(e) = sync_premium(&mut tx, &subscription.user_id).await {
            tx.rollback().await.ok();
            return Err(DomainError::database("sync premium flag", e));
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::database("commit expiry", e))?;

        Ok(ExpireOutcome::Expired {
            user_id: subscription.user_id,
        })
    }
}
