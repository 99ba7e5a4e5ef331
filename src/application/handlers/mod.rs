//! Command and query handlers.

pub mod billing;

pub use billing::*;
