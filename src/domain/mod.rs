//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (ids, timestamps, pagination, errors)
//! - `billing` - Tiers, subscriptions, settlements, and gateway webhooks
//!   with the subscription state machine

pub mod billing;
pub mod foundation;
