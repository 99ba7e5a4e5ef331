//! In-memory adapters for tests and local development.

mod plan_cache;
mod store;

pub use plan_cache::InMemoryPlanCodeCache;
pub use store::InMemoryBillingStore;
