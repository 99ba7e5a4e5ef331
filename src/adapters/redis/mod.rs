//! Redis adapters.

mod plan_code_cache;

pub use plan_code_cache::RedisPlanCodeCache;
