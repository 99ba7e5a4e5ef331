//! Redis configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Redis backs the shared plan code cache. Without a URL the service falls
/// back to a process-local cache.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub url: String,

    /// Plan code cache entry lifetime in seconds
    #[serde(default = "default_plan_code_ttl")]
    pub plan_code_ttl_secs: u64,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl RedisConfig {
    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }

    pub fn plan_code_ttl(&self) -> Duration {
        Duration::from_secs(self.plan_code_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.is_enabled() {
            return Ok(());
        }
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ValidationError::InvalidRedisUrl);
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            plan_code_ttl_secs: default_plan_code_ttl(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_plan_code_ttl() -> u64 {
    3600
}

fn default_key_prefix() -> String {
    "billing:plan_code".to_string()
}
