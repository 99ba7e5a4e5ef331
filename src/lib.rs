//! Subscription Ledger - payment and subscription lifecycle engine.
//!
//! Sells subscription tiers through a Paystack-style gateway: provisions
//! remote plans lazily, settles each confirmed payment exactly once, keeps
//! one live subscription per user, and expires lapsed subscriptions.
//!
//! # Layout
//!
//! - `domain` - tiers, subscriptions and their state machine, settlements,
//!   webhook events
//! - `ports` - traits for the gateway, storage, cache and notifications
//! - `application` - command and query handlers
//! - `adapters` - Postgres, Redis, Paystack, in-memory and HTTP
//! - `config` - environment-driven configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
