//! PostgreSQL implementation of SettlementStore.
//!
//! Settlement is one transaction:
//!
//! 1. re-check the reference (a concurrent delivery may have committed)
//! 2. lock the user's current subscription row with `SKIP LOCKED`
//! 3. create or promote the subscription, insert the settlement record
//! 4. recompute the premium flag and commit
//!
//! No other row is locked. When the live row is held elsewhere the outcome is
//! `Contended` (the caller asks for redelivery) unless the held row is an
//! entitled active subscription. The unique reference constraint and the
//! one-live-subscription index settle transactions that race past the checks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::rows::{
    insert_subscription, sync_premium, update_subscription, violates, SettlementRow,
    SubscriptionRow, CURRENT_STATUSES, ONE_LIVE_SUBSCRIPTION_IDX, SETTLEMENT_COLUMNS,
    SETTLEMENT_REFERENCE_KEY, SUBSCRIPTION_COLUMNS,
};
use crate::domain::billing::{SettlementDecision, SettlementRecord, UserSubscription};
use crate::domain::foundation::{DomainError, ErrorCode, Page, PageRequest, Timestamp, UserId};
use crate::ports::{SettleOutcome, SettlementRequest, SettlementStore};

#[derive(Clone)]
pub struct PostgresSettlementStore {
    pool: PgPool,
}

impl PostgresSettlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn reference_exists(conn: &mut PgConnection, reference: &str) -> Result<bool, DomainError> {
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM settlement_records WHERE reference = $1)")
            .bind(reference)
            .fetch_one(conn)
            .await
            .map_err(|e| DomainError::database("check settlement reference", e))?;
    Ok(exists)
}

fn user_not_found(user_id: &UserId) -> DomainError {
    DomainError::new(ErrorCode::UserNotFound, "User not found").with_detail("id", user_id.to_string())
}

/// Outcome when the user's live row is locked by another transaction.
///
/// Only an entitled active row whose period has not ended is final; anything
/// else may change under the holder, so the caller retries.
fn held_row_outcome(held: Option<(Uuid, String, DateTime<Utc>)>, now: Timestamp) -> SettleOutcome {
    match held {
        Some((id, status, period_end))
            if status == "active" && !Timestamp::from_datetime(period_end).is_before(&now) =>
        {
            SettleOutcome::ActiveSubscriptionExists {
                subscription_id: id.into(),
            }
        }
        _ => SettleOutcome::Contended,
    }
}

/// Maps a write failure inside the settlement transaction.
fn classify(err: sqlx::Error, operation: &str) -> Result<SettleOutcome, DomainError> {
    if violates(&err, SETTLEMENT_REFERENCE_KEY) {
        return Ok(SettleOutcome::AlreadySettled);
    }
    // A concurrent transaction took the live slot first.
    if violates(&err, ONE_LIVE_SUBSCRIPTION_IDX) {
        return Ok(SettleOutcome::Contended);
    }
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation()
            || db_err.is_foreign_key_violation()
            || db_err.is_check_violation()
        {
            return Err(DomainError::new(
                ErrorCode::IntegrityViolation,
                format!("Failed to {}: {}", operation, err),
            ));
        }
    }
    Err(DomainError::database(operation, err))
}

#[async_trait]
impl SettlementStore for PostgresSettlementStore {
    async fn exists(&self, reference: &str) -> Result<bool, DomainError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| DomainError::database("acquire connection", e))?;
        reference_exists(&mut conn, reference).await
    }

    async fn settle(&self, request: SettlementRequest) -> Result<SettleOutcome, DomainError> {
        let SettlementRequest { payment, tier, now } = request;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("begin transaction", e))?;

        if reference_exists(&mut tx, &payment.reference).await? {
            tx.rollback().await.ok();
            return Ok(SettleOutcome::AlreadySettled);
        }

        let user_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(payment.user_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| DomainError::database("check user", e))?;
        if !user_exists {
            tx.rollback().await.ok();
            return Err(user_not_found(&payment.user_id));
        }

        let current_sql = format!(
            r#"
            SELECT {} FROM user_subscriptions
            WHERE user_id = $1 AND is_active AND deleted_at IS NULL
              AND status IN {}
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
            SUBSCRIPTION_COLUMNS, CURRENT_STATUSES
        );
        let current_row: Option<SubscriptionRow> = sqlx::query_as(&current_sql)
            .bind(payment.user_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DomainError::database("lock current subscription", e))?;

        let current = match current_row {
            Some(row) => Some(UserSubscription::try_from(row)?),
            None => {
                // Nothing lockable; a live row may still be held by someone else.
                let held_sql = format!(
                    r#"
                    SELECT id, status, current_period_end FROM user_subscriptions
                    WHERE user_id = $1 AND is_active AND deleted_at IS NULL
                      AND status IN {}
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#,
                    CURRENT_STATUSES
                );
                let held: Option<(Uuid, String, DateTime<Utc>)> = sqlx::query_as(&held_sql)
                    .bind(payment.user_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| DomainError::database("read held subscription", e))?;
                if held.is_some() {
                    tx.rollback().await.ok();
                    return Ok(held_row_outcome(held, now));
                }
                None
            }
        };

        let (subscription, promoted) = match SettlementDecision::decide(current, &payment, &tier, now) {
            SettlementDecision::AlreadyActive(id) => {
                tx.rollback().await.ok();
                return Ok(SettleOutcome::ActiveSubscriptionExists { subscription_id: id });
            }
            SettlementDecision::Create(sub) => {
                if let Err(e) = insert_subscription(&mut tx, &sub).await {
                    tx.rollback().await.ok();
                    return classify(e, "insert subscription");
                }
                (sub, false)
            }
            SettlementDecision::Promote(mut sub) => {
                match update_subscription(&mut tx, &sub).await {
                    Ok(1) => sub.version += 1,
                    // Row is locked by this transaction; no match means it vanished.
                    Ok(_) => {
                        tx.rollback().await.ok();
                        return Ok(SettleOutcome::Contended);
                    }
                    Err(e) => {
                        tx.rollback().await.ok();
                        return classify(e, "promote subscription");
                    }
                }
                (sub, true)
            }
        };

        let settlement = SettlementRecord::for_payment(&payment, subscription.id, now);
        let inserted = sqlx::query(
            r#"
            INSERT INTO settlement_records (
                id, reference, user_id, subscription_id, tier_id, amount, currency,
                gateway_transaction_id, channel, paid_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(settlement.id.as_uuid())
        .bind(&settlement.reference)
        .bind(settlement.user_id.as_uuid())
        .bind(settlement.subscription_id.as_uuid())
        .bind(settlement.tier_id.as_uuid())
        .bind(settlement.amount)
        .bind(&settlement.currency)
        .bind(&settlement.gateway_transaction_id)
        .bind(&settlement.channel)
        .bind(settlement.paid_at.as_datetime())
        .bind(settlement.created_at.as_datetime())
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            tx.rollback().await.ok();
            return classify(e, "insert settlement record");
        }

        if let Err(e) = sync_premium(&mut tx, &payment.user_id).await {
            tx.rollback().await.ok();
            return Err(DomainError::database("sync premium flag", e));
        }

        if let Err(e) = tx.commit().await {
            return classify(e, "commit settlement");
        }

        tracing::info!(
            reference = %settlement.reference,
            user_id = %settlement.user_id,
            subscription_id = %subscription.id,
            promoted,
            "Payment settled"
        );

        Ok(SettleOutcome::Applied {
            subscription,
            settlement,
            promoted,
        })
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        page: PageRequest,
    ) -> Result<Page<SettlementRecord>, DomainError> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM settlement_records WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| DomainError::database("count settlements", e))?;

        let sql = format!(
            r#"
            SELECT {} FROM settlement_records
            WHERE user_id = $1
            ORDER BY paid_at DESC, created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            SETTLEMENT_COLUMNS
        );
        let rows: Vec<SettlementRow> = sqlx::query_as(&sql)
            .bind(user_id.as_uuid())
            .bind(i64::from(page.limit))
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("list settlements", e))?;

        let items = rows.into_iter().map(SettlementRecord::from).collect();
        Ok(Page::new(items, page, total.max(0) as u64))
    }
}
