//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, pagination, the state machine trait, and the
//! error types every other layer speaks.

mod errors;
mod ids;
mod pagination;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{PlanBindingId, SettlementId, SubscriptionId, TierId, UserId};
pub use pagination::{total_pages, Page, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
