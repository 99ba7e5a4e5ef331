//! Settlement records (invoices) and the confirmed payment they capture.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{SettlementId, SubscriptionId, TierId, Timestamp, UserId};

use super::subscription::{PaymentDetails, UserSubscription};
use super::tier::{minor_to_major, SubscriptionTier};

/// A payment the gateway confirmed server-to-server, bound back to a user
/// and tier through the echoed metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedPayment {
    pub reference: String,
    pub user_id: UserId,
    pub tier_id: TierId,
    pub amount_minor: i64,
    pub currency: String,
    pub gateway_transaction_id: Option<String>,
    pub channel: Option<String>,
    pub customer_code: Option<String>,
    pub paid_at: Timestamp,
}

impl ConfirmedPayment {
    /// Amount in major units.
    pub fn amount(&self) -> Decimal {
        minor_to_major(self.amount_minor)
    }

    pub fn details(&self) -> PaymentDetails {
        PaymentDetails {
            reference: self.reference.clone(),
            amount: self.amount(),
            customer_code: self.customer_code.clone(),
            paid_at: self.paid_at,
        }
    }
}

/// One row per applied payment. Its existence for a reference means the
/// financial effect has happened. Never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: SettlementId,
    pub reference: String,
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
    pub tier_id: TierId,
    /// Major currency units.
    pub amount: Decimal,
    pub currency: String,
    pub gateway_transaction_id: Option<String>,
    pub channel: Option<String>,
    pub paid_at: Timestamp,
    pub created_at: Timestamp,
}

impl SettlementRecord {
    pub fn for_payment(
        payment: &ConfirmedPayment,
        subscription_id: SubscriptionId,
        now: Timestamp,
    ) -> Self {
        Self {
            id: SettlementId::new(),
            reference: payment.reference.clone(),
            user_id: payment.user_id,
            subscription_id,
            tier_id: payment.tier_id,
            amount: payment.amount(),
            currency: payment.currency.clone(),
            gateway_transaction_id: payment.gateway_transaction_id.clone(),
            channel: payment.channel.clone(),
            paid_at: payment.paid_at,
            created_at: now,
        }
    }
}

/// What a settlement does to the user's current subscription row, decided
/// while that row is locked.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementDecision {
    /// No live row: insert this new active subscription.
    Create(UserSubscription),
    /// A trialing or past-due row was paid: update it in place.
    Promote(UserSubscription),
    /// The user already holds an active subscription.
    AlreadyActive(SubscriptionId),
}

impl SettlementDecision {
    pub fn decide(
        current: Option<UserSubscription>,
        payment: &ConfirmedPayment,
        tier: &SubscriptionTier,
        now: Timestamp,
    ) -> Self {
        match current {
            None => SettlementDecision::Create(UserSubscription::from_payment(
                payment.user_id,
                tier,
                &payment.details(),
                now,
            )),
            Some(existing) if existing.is_entitled() || !existing.is_current() => {
                SettlementDecision::AlreadyActive(existing.id)
            }
            Some(mut existing) => match existing.apply_payment(tier, &payment.details(), now) {
                Ok(()) => SettlementDecision::Promote(existing),
                Err(_) => SettlementDecision::AlreadyActive(existing.id),
            },
        }
    }
}
