//! Redis-backed plan code cache shared by every server instance.
//!
//! Entries expire after a TTL so a rebound tier is picked up without a flush.
//! The database stays the source of truth; a miss only costs one query.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::domain::foundation::{DomainError, ErrorCode, TierId};
use crate::ports::PlanCodeCache;

pub const DEFAULT_KEY_PREFIX: &str = "billing:plan_code";
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
pub struct RedisPlanCodeCache {
    conn: MultiplexedConnection,
    prefix: String,
    ttl: Duration,
}

impl RedisPlanCodeCache {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn key(&self, tier_id: &TierId) -> String {
        cache_key(&self.prefix, tier_id)
    }
}

fn cache_key(prefix: &str, tier_id: &TierId) -> String {
    format!("{}:{}", prefix, tier_id)
}

fn cache_error(operation: &str, err: redis::RedisError) -> DomainError {
    DomainError::new(
        ErrorCode::CacheError,
        format!("Failed to {}: {}", operation, err),
    )
}

#[async_trait]
impl PlanCodeCache for RedisPlanCodeCache {
    async fn get(&self, tier_id: &TierId) -> Result<Option<String>, DomainError> {
        let mut conn = self.conn.clone();
        conn.get(self.key(tier_id))
            .await
            .map_err(|e| cache_error("read plan code", e))
    }

    async fn put(&self, tier_id: &TierId, plan_code: &str) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.key(tier_id))
            .arg(plan_code)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| cache_error("write plan code", e))
    }
}
