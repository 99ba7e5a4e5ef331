//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing domain to external systems:
//! - `paystack` - payment gateway HTTP client and a scriptable mock
//! - `postgres` - transactional persistence
//! - `redis` - shared plan code cache
//! - `memory` - in-process stores for tests and local runs
//! - `notify` - user notifications
//! - `http` - axum routes

pub mod http;
pub mod memory;
pub mod notify;
pub mod paystack;
pub mod postgres;
pub mod redis;

pub use memory::{InMemoryBillingStore, InMemoryPlanCodeCache};
pub use notify::TracingNotifier;
pub use paystack::{MockPaymentGateway, PaystackConfig, PaystackGateway};
pub use postgres::{
    PostgresPlanBindingRepository, PostgresSettlementStore, PostgresSubscriptionRepository,
    PostgresTierRepository, PostgresUserDirectory,
};
pub use self::redis::RedisPlanCodeCache;
