//! UserSubscription aggregate.
//!
//! A user's subscription instance. Rows are never physically deleted; terminal
//! rows stay for audit and a new purchase creates a new row.
//!
//! # Invariants
//!
//! - At most one row per user with status `active`; enforced by the store at
//!   settlement time, not here.
//! - Status changes follow [`SubscriptionStatus`]'s state machine.
//! - `is_active` is false once the status is terminal.
//! - Plan changes keep the billing period.
//! - `version` is the optimistic lock: stores only write a copy whose version
//!   matches the stored row, and bump it on success.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{StateMachine, SubscriptionId, TierId, Timestamp, UserId};

use super::{BillingError, SubscriptionStatus, SubscriptionTier};

/// Payment facts applied to a subscription at settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDetails {
    pub reference: String,
    /// Major currency units.
    pub amount: Decimal,
    pub customer_code: Option<String>,
    pub paid_at: Timestamp,
}

/// Direction of an in-place plan change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanChange {
    Upgrade,
    Downgrade,
}

impl PlanChange {
    fn verb(&self) -> &'static str {
        match self {
            PlanChange::Upgrade => "upgrade",
            PlanChange::Downgrade => "downgrade",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub tier_id: TierId,
    pub remote_customer_code: Option<String>,
    pub remote_subscription_code: Option<String>,
    pub last_payment_reference: Option<String>,
    /// Last amount paid, major units.
    pub amount_paid: Option<Decimal>,
    pub last_payment_at: Option<Timestamp>,
    pub status: SubscriptionStatus,
    pub is_active: bool,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
    #[serde(default)]
    pub version: i32,
}

impl UserSubscription {
    /// New active subscription from a confirmed first payment.
    ///
    /// The billing period runs from `now` for one tier cycle.
    pub fn from_payment(
        user_id: UserId,
        tier: &SubscriptionTier,
        payment: &PaymentDetails,
        now: Timestamp,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            user_id,
            tier_id: tier.id,
            remote_customer_code: payment.customer_code.clone(),
            remote_subscription_code: None,
            last_payment_reference: Some(payment.reference.clone()),
            amount_paid: Some(payment.amount),
            last_payment_at: Some(payment.paid_at),
            status: SubscriptionStatus::Active,
            is_active: true,
            current_period_start: now,
            current_period_end: tier.period_end_from(now),
            cancel_at_period_end: false,
            trial_start: None,
            trial_end: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 0,
        }
    }

    /// New trialing subscription (promotional assignment).
    pub fn start_trial(
        user_id: UserId,
        tier: &SubscriptionTier,
        now: Timestamp,
    ) -> Result<Self, BillingError> {
        if !tier.offers_trial() {
            return Err(BillingError::validation(
                "tier_id",
                format!("tier '{}' does not offer a trial", tier.name),
            ));
        }
        let trial_end = now.add_days(i64::from(tier.trial_days));
        Ok(Self {
            id: SubscriptionId::new(),
            user_id,
            tier_id: tier.id,
            remote_customer_code: None,
            remote_subscription_code: None,
            last_payment_reference: None,
            amount_paid: None,
            last_payment_at: None,
            status: SubscriptionStatus::Trialing,
            is_active: true,
            current_period_start: now,
            current_period_end: trial_end,
            cancel_at_period_end: false,
            trial_start: Some(now),
            trial_end: Some(trial_end),
            cancelled_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 0,
        })
    }

    /// Holds the user's live slot (trialing, active or past due).
    pub fn is_current(&self) -> bool {
        self.is_active && self.status.is_current()
    }

    /// Active and entitled, the glossary meaning of "active subscription".
    pub fn is_entitled(&self) -> bool {
        self.is_active && self.status == SubscriptionStatus::Active
    }

    /// Whether the owning user's premium flag should be set. Trials and the
    /// past-due grace period keep entitlements.
    pub fn grants_premium(&self) -> bool {
        self.is_current()
    }

    /// Applies a confirmed payment to a trialing or past-due row.
    ///
    /// Starts a fresh billing period from `now`.
    pub fn apply_payment(
        &mut self,
        tier: &SubscriptionTier,
        payment: &PaymentDetails,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        self.transition(SubscriptionStatus::Active, "settle")?;
        self.tier_id = tier.id;
        self.last_payment_reference = Some(payment.reference.clone());
        self.amount_paid = Some(payment.amount);
        self.last_payment_at = Some(payment.paid_at);
        if payment.customer_code.is_some() {
            self.remote_customer_code = payment.customer_code.clone();
        }
        self.current_period_start = now;
        self.current_period_end = tier.period_end_from(now);
        self.is_active = true;
        self.updated_at = now;
        Ok(())
    }

    /// Switches tier in place. The billing period is left untouched.
    pub fn change_tier(
        &mut self,
        current: &SubscriptionTier,
        target: &SubscriptionTier,
        direction: PlanChange,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        if !self.is_entitled() {
            return Err(BillingError::invalid_state(self.status, direction.verb()));
        }
        if !target.is_available() {
            return Err(BillingError::validation(
                "tier_id",
                format!("tier '{}' is not available", target.name),
            ));
        }
        let ok = match direction {
            PlanChange::Upgrade => target.level > current.level,
            PlanChange::Downgrade => target.level < current.level,
        };
        if !ok {
            return Err(BillingError::validation(
                "tier_id",
                format!(
                    "cannot {} from level {} to level {}",
                    direction.verb(),
                    current.level,
                    target.level
                ),
            ));
        }
        self.tier_id = target.id;
        self.updated_at = now;
        Ok(())
    }

    /// Immediate cancellation.
    pub fn cancel(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.transition(SubscriptionStatus::Cancelled, "cancel")?;
        self.is_active = false;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Keeps access until the period ends; the sweeper expires the row then.
    pub fn cancel_at_period_end(&mut self, now: Timestamp) -> Result<(), BillingError> {
        if !self.is_current() {
            return Err(BillingError::invalid_state(self.status, "cancel"));
        }
        self.cancel_at_period_end = true;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_past_due(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.transition(SubscriptionStatus::PastDue, "mark past due")?;
        self.updated_at = now;
        Ok(())
    }

    /// Past-due row paid its renewal.
    pub fn recover(&mut self, now: Timestamp) -> Result<(), BillingError> {
        if self.status != SubscriptionStatus::PastDue {
            return Err(BillingError::invalid_state(self.status, "recover"));
        }
        self.transition(SubscriptionStatus::Active, "recover")?;
        self.updated_at = now;
        Ok(())
    }

    /// A paid renewal: starts the next billing period from `now`, recovering
    /// a past-due row on the way.
    pub fn renew(&mut self, tier: &SubscriptionTier, now: Timestamp) -> Result<(), BillingError> {
        match self.status {
            SubscriptionStatus::PastDue => self.recover(now)?,
            SubscriptionStatus::Active if self.is_active => {}
            _ => return Err(BillingError::invalid_state(self.status, "renew")),
        }
        self.current_period_start = now;
        self.current_period_end = tier.period_end_from(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn expire(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.transition(SubscriptionStatus::Expired, "expire")?;
        self.is_active = false;
        self.updated_at = now;
        Ok(())
    }

    /// Records the gateway's recurring subscription code.
    pub fn bind_remote(
        &mut self,
        subscription_code: impl Into<String>,
        customer_code: Option<String>,
        now: Timestamp,
    ) {
        self.remote_subscription_code = Some(subscription_code.into());
        if customer_code.is_some() {
            self.remote_customer_code = customer_code;
        }
        self.updated_at = now;
    }

    /// Due for expiry: an active period or a trial ended before `now`.
    ///
    /// Past-due rows are left to the gateway's retry schedule.
    pub fn has_lapsed(&self, now: Timestamp) -> bool {
        if !self.is_active || self.deleted_at.is_some() {
            return false;
        }
        match self.status {
            SubscriptionStatus::Active => self.current_period_end.is_before(&now),
            SubscriptionStatus::Trialing => {
                self.trial_end.map(|end| end.is_before(&now)).unwrap_or(false)
            }
            _ => false,
        }
    }

    fn transition(
        &mut self,
        target: SubscriptionStatus,
        attempted: &'static str,
    ) -> Result<(), BillingError> {
        let current = self.status;
        self.status = current
            .transition_to(target)
            .map_err(|_| BillingError::invalid_state(current, attempted))?;
        Ok(())
    }
}
