//! PostgreSQL adapters for the billing ports.
//!
//! - `PostgresTierRepository` - tier catalog reads
//! - `PostgresPlanBindingRepository` - tier to gateway plan code bindings
//! - `PostgresSubscriptionRepository` - subscription rows and expiry
//! - `PostgresSettlementStore` - idempotent payment settlement and invoices
//! - `PostgresUserDirectory` - contact lookup for gateway calls

#[cfg(test)]
mod live;
mod plan_binding_repository;
mod rows;
mod settlement_store;
mod subscription_repository;
mod tier_repository;
mod user_directory;

pub use plan_binding_repository::PostgresPlanBindingRepository;
pub use settlement_store::PostgresSettlementStore;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use tier_repository::PostgresTierRepository;
pub use user_directory::PostgresUserDirectory;
