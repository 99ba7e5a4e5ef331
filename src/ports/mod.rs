//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing domain and the outside world. Adapters implement these ports.
//!
//! ## Gateway
//!
//! - `PaymentGateway` - Remote payment processor
//!
//! ## Storage
//!
//! - `TierRepository` - Administrator-managed tiers (read-only)
//! - `PlanBindingRepository` - Tier to remote plan mapping
//! - `SubscriptionRepository` - User subscriptions and premium flag
//! - `SettlementStore` - Idempotent settlement and invoices
//! - `PlanCodeCache` - Advisory cache of plan codes
//!
//! ## Collaborators
//!
//! - `UserDirectory` - User contact lookup
//! - `UserNotifier` - Notify-user capability

mod payment_gateway;
mod plan_binding_repository;
mod plan_code_cache;
mod settlement_store;
mod subscription_repository;
mod tier_repository;
mod user_directory;
mod user_notifier;

pub use payment_gateway::{
    CreatePlan, GatewayError, GatewayErrorCode, InitializeTransaction, PaymentGateway, RemotePlan,
    RemoteSubscription, TransactionAuthorization, VerifiedTransaction,
};
pub use plan_binding_repository::{BindingInsert, PlanBindingRepository};
pub use plan_code_cache::PlanCodeCache;
pub use settlement_store::{SettleOutcome, SettlementRequest, SettlementStore};
pub use subscription_repository::{
    CreateOutcome, ExpireOutcome, LapsedCursor, SubscriptionRepository,
};
pub use tier_repository::TierRepository;
pub use user_directory::{UserContact, UserDirectory};
pub use user_notifier::{BillingNotification, UserNotifier};
