//! SettlementStore port - the idempotency boundary for confirmed payments.
//!
//! A reference is applied at most once. Implementations must:
//!
//! - re-check the reference inside the transaction,
//! - take the user's live subscription row with a non-blocking lock
//!   (skip, never wait) and report `Contended` when it is held elsewhere,
//!   unless the held row is already an entitled active subscription,
//! - write the subscription change and the settlement row atomically,
//! - treat a unique violation on the reference as `AlreadySettled`.

use async_trait::async_trait;

use crate::domain::billing::{ConfirmedPayment, SettlementRecord, SubscriptionTier, UserSubscription};
use crate::domain::foundation::{DomainError, Page, PageRequest, SubscriptionId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRequest {
    pub payment: ConfirmedPayment,
    pub tier: SubscriptionTier,
    pub now: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// Effect applied in this call.
    Applied {
        subscription: UserSubscription,
        settlement: SettlementRecord,
        /// A trialing or past-due row was converted rather than created.
        promoted: bool,
    },
    /// The reference was already recorded.
    AlreadySettled,
    /// The user holds an entitled active subscription; the payment is not
    /// applied.
    ActiveSubscriptionExists { subscription_id: SubscriptionId },
    /// Another transaction holds the user's live row or won the race for the
    /// live slot. Nothing was written; the caller should retry.
    Contended,
}

#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Fast-path check, outside any transaction.
    async fn exists(&self, reference: &str) -> Result<bool, DomainError>;

    async fn settle(&self, request: SettlementRequest) -> Result<SettleOutcome, DomainError>;

    /// Newest first.
    async fn list_for_user(
        &self,
        user_id: &UserId,
        page: PageRequest,
    ) -> Result<Page<SettlementRecord>, DomainError>;
}
