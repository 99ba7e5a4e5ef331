//! Fixtures for tests that run against a real database.
//!
//! These tests are `#[ignore]`d. Run them with a scratch database:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/ledger_test cargo test -- --ignored
//! ```

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::SubscriptionTier;
use crate::domain::foundation::UserId;

/// Connects to `DATABASE_URL` and applies the migrations.
pub(super) async fn pool() -> PgPool {
    connect(PgPoolOptions::new()).await
}

/// A pool that hands out one connection and fails fast when it is taken.
pub(super) async fn single_connection_pool() -> PgPool {
    connect(
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(2)),
    )
    .await
}

async fn connect(options: PgPoolOptions) -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for live tests");
    let pool = options.connect(&url).await.expect("connect to DATABASE_URL");
    sqlx::migrate!("./migrations").run(&pool).await.expect("run migrations");
    pool
}

pub(super) async fn seed_user(pool: &PgPool) -> UserId {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
        .bind(id)
        .bind(format!("{}@example.com", id.simple()))
        .execute(pool)
        .await
        .expect("insert user");
    UserId::from_uuid(id)
}

pub(super) async fn seed_tier(pool: &PgPool, tier: &SubscriptionTier) {
    sqlx::query(
        r#"
        INSERT INTO subscription_tiers (
            id, name, billing_type, tier_level, price, currency,
            billing_cycle_days, trial_days, features, is_active, sort_order
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(tier.id.as_uuid())
    .bind(&tier.name)
    .bind(tier.billing_type.as_str())
    .bind(tier.level)
    .bind(tier.price)
    .bind(&tier.currency)
    .bind(tier.billing_cycle_days)
    .bind(tier.trial_days)
    .bind(&tier.features)
    .bind(tier.is_active)
    .bind(tier.sort_order)
    .execute(pool)
    .await
    .expect("insert tier");
}

pub(super) async fn is_premium(pool: &PgPool, user_id: &UserId) -> bool {
    sqlx::query_scalar("SELECT is_premium FROM users WHERE id = $1")
        .bind(user_id.as_uuid())
        .fetch_one(pool)
        .await
        .expect("read premium flag")
}
