//! Row types and statements shared by the Postgres billing adapters.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::billing::{
    RemotePlanBinding, SettlementRecord, SubscriptionStatus, SubscriptionTier, UserSubscription,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, PlanBindingId, SettlementId, SubscriptionId, TierId, Timestamp, UserId,
};

/// Statuses that occupy a user's single live subscription slot.
pub(super) const CURRENT_STATUSES: &str = "('trialing', 'active', 'past_due')";

pub(super) const SUBSCRIPTION_COLUMNS: &str = r#"
    id, user_id, tier_id, remote_customer_code, remote_subscription_code,
    last_payment_reference, amount_paid, last_payment_at, status, is_active,
    current_period_start, current_period_end, cancel_at_period_end,
    trial_start, trial_end, cancelled_at, created_at, updated_at, deleted_at,
    version
"#;

pub(super) const SETTLEMENT_COLUMNS: &str = r#"
    id, reference, user_id, subscription_id, tier_id, amount, currency,
    gateway_transaction_id, channel, paid_at, created_at
"#;

pub(super) const TIER_COLUMNS: &str = r#"
    id, name, billing_type, tier_level, price, currency, billing_cycle_days,
    trial_days, features, is_active, sort_order, deleted_at
"#;

/// Unique constraint backing settlement idempotency.
pub(super) const SETTLEMENT_REFERENCE_KEY: &str = "settlement_records_reference_key";

/// Partial unique index: one live subscription per user.
pub(super) const ONE_LIVE_SUBSCRIPTION_IDX: &str = "user_subscriptions_one_live_idx";

/// True when `err` is a unique violation on the named constraint.
pub(super) fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", what, detail),
    )
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct TierRow {
    id: Uuid,
    name: String,
    billing_type: String,
    tier_level: i32,
    price: Decimal,
    currency: String,
    billing_cycle_days: i32,
    trial_days: i32,
    features: Vec<String>,
    is_active: bool,
    sort_order: i32,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<TierRow> for SubscriptionTier {
    type Error = DomainError;

    fn try_from(row: TierRow) -> Result<Self, Self::Error> {
        Ok(SubscriptionTier {
            id: TierId::from_uuid(row.id),
            name: row.name,
            billing_type: row
                .billing_type
                .parse()
                .map_err(|e| corrupt("billing_type", e))?,
            level: row.tier_level,
            price: row.price,
            currency: row.currency,
            billing_cycle_days: row.billing_cycle_days,
            trial_days: row.trial_days,
            features: row.features,
            is_active: row.is_active,
            sort_order: row.sort_order,
            deleted_at: row.deleted_at.map(Timestamp::from_datetime),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct BindingRow {
    id: Uuid,
    tier_id: Uuid,
    plan_code: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<BindingRow> for RemotePlanBinding {
    fn from(row: BindingRow) -> Self {
        RemotePlanBinding {
            id: PlanBindingId::from_uuid(row.id),
            tier_id: TierId::from_uuid(row.tier_id),
            plan_code: row.plan_code,
            is_active: row.is_active,
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    tier_id: Uuid,
    remote_customer_code: Option<String>,
    remote_subscription_code: Option<String>,
    last_payment_reference: Option<String>,
    amount_paid: Option<Decimal>,
    last_payment_at: Option<DateTime<Utc>>,
    status: String,
    is_active: bool,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    cancel_at_period_end: bool,
    trial_start: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    version: i32,
}

impl TryFrom<SubscriptionRow> for UserSubscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = row.status.parse().map_err(|e| corrupt("status", e))?;
        Ok(UserSubscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            tier_id: TierId::from_uuid(row.tier_id),
            remote_customer_code: row.remote_customer_code,
            remote_subscription_code: row.remote_subscription_code,
            last_payment_reference: row.last_payment_reference,
            amount_paid: row.amount_paid,
            last_payment_at: row.last_payment_at.map(Timestamp::from_datetime),
            status,
            is_active: row.is_active,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            cancel_at_period_end: row.cancel_at_period_end,
            trial_start: row.trial_start.map(Timestamp::from_datetime),
            trial_end: row.trial_end.map(Timestamp::from_datetime),
            cancelled_at: row.cancelled_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            deleted_at: row.deleted_at.map(Timestamp::from_datetime),
            version: row.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct SettlementRow {
    id: Uuid,
    reference: String,
    user_id: Uuid,
    subscription_id: Uuid,
    tier_id: Uuid,
    amount: Decimal,
    currency: String,
    gateway_transaction_id: Option<String>,
    channel: Option<String>,
    paid_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<SettlementRow> for SettlementRecord {
    fn from(row: SettlementRow) -> Self {
        SettlementRecord {
            id: SettlementId::from_uuid(row.id),
            reference: row.reference,
            user_id: UserId::from_uuid(row.user_id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            tier_id: TierId::from_uuid(row.tier_id),
            amount: row.amount,
            currency: row.currency,
            gateway_transaction_id: row.gateway_transaction_id,
            channel: row.channel,
            paid_at: Timestamp::from_datetime(row.paid_at),
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

fn opt_dt(ts: &Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(Timestamp::into_datetime)
}

pub(super) async fn insert_subscription(
    conn: &mut PgConnection,
    sub: &UserSubscription,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_subscriptions (
            id, user_id, tier_id, remote_customer_code, remote_subscription_code,
            last_payment_reference, amount_paid, last_payment_at, status, is_active,
            current_period_start, current_period_end, cancel_at_period_end,
            trial_start, trial_end, cancelled_at, created_at, updated_at, version
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        "#,
    )
    .bind(sub.id.as_uuid())
    .bind(sub.user_id.as_uuid())
    .bind(sub.tier_id.as_uuid())
    .bind(&sub.remote_customer_code)
    .bind(&sub.remote_subscription_code)
    .bind(&sub.last_payment_reference)
    .bind(sub.amount_paid)
    .bind(opt_dt(&sub.last_payment_at))
    .bind(sub.status.as_str())
    .bind(sub.is_active)
    .bind(sub.current_period_start.as_datetime())
    .bind(sub.current_period_end.as_datetime())
    .bind(sub.cancel_at_period_end)
    .bind(opt_dt(&sub.trial_start))
    .bind(opt_dt(&sub.trial_end))
    .bind(opt_dt(&sub.cancelled_at))
    .bind(sub.created_at.as_datetime())
    .bind(sub.updated_at.as_datetime())
    .bind(sub.version)
    .execute(conn)
    .await?;
    Ok(())
}

/// Writes `sub` if the stored row still carries `sub.version`, bumping it.
///
/// Returns the number of rows touched; 0 means the row is gone or another
/// writer got there first (see [`stale_write`]).
pub(super) async fn update_subscription(
    conn: &mut PgConnection,
    sub: &UserSubscription,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE user_subscriptions SET
            tier_id = $2,
            remote_customer_code = $3,
            remote_subscription_code = $4,
            last_payment_reference = $5,
            amount_paid = $6,
            last_payment_at = $7,
            status = $8,
            is_active = $9,
            current_period_start = $10,
            current_period_end = $11,
            cancel_at_period_end = $12,
            trial_start = $13,
            trial_end = $14,
            cancelled_at = $15,
            updated_at = $16,
            version = version + 1
        WHERE id = $1 AND version = $17
        "#,
    )
    .bind(sub.id.as_uuid())
    .bind(sub.tier_id.as_uuid())
    .bind(&sub.remote_customer_code)
    .bind(&sub.remote_subscription_code)
    .bind(&sub.last_payment_reference)
    .bind(sub.amount_paid)
    .bind(opt_dt(&sub.last_payment_at))
    .bind(sub.status.as_str())
    .bind(sub.is_active)
    .bind(sub.current_period_start.as_datetime())
    .bind(sub.current_period_end.as_datetime())
    .bind(sub.cancel_at_period_end)
    .bind(opt_dt(&sub.trial_start))
    .bind(opt_dt(&sub.trial_end))
    .bind(opt_dt(&sub.cancelled_at))
    .bind(sub.updated_at.as_datetime())
    .bind(sub.version)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Explains a version-guarded update that touched nothing.
pub(super) async fn stale_write(
    conn: &mut PgConnection,
    sub: &UserSubscription,
) -> Result<DomainError, sqlx::Error> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM user_subscriptions WHERE id = $1)")
            .bind(sub.id.as_uuid())
            .fetch_one(conn)
            .await?;
    Ok(stale_write_error(sub, exists))
}

pub(super) fn stale_write_error(sub: &UserSubscription, exists: bool) -> DomainError {
    if exists {
        DomainError::new(
            ErrorCode::ConcurrencyConflict,
            "Subscription version mismatch - another update occurred",
        )
        .with_detail("id", sub.id.to_string())
        .with_detail("version", sub.version.to_string())
    } else {
        DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
            .with_detail("id", sub.id.to_string())
    }
}

/// Recomputes `users.is_premium` from the user's live subscriptions.
pub(super) async fn sync_premium(conn: &mut PgConnection, user_id: &UserId) -> Result<(), sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE users SET is_premium = EXISTS (
            SELECT 1 FROM user_subscriptions
            WHERE user_id = $1 AND is_active AND deleted_at IS NULL
              AND status IN {}
        )
        WHERE id = $1
        "#,
        CURRENT_STATUSES
    );
    sqlx::query(&sql).bind(user_id.as_uuid()).execute(conn).await?;
    Ok(())
}
