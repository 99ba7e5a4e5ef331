//! Request and response bodies for the billing API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::{CurrentSubscription, SettlementResult, WebhookOutcome};
use crate::domain::billing::{
    minor_to_major, BillingType, SettlementRecord, SubscriptionStatus, SubscriptionTier,
    UserSubscription,
};
use crate::domain::foundation::{Page, SettlementId, SubscriptionId, TierId, Timestamp};
use crate::ports::{TransactionAuthorization, VerifiedTransaction};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePaymentRequest {
    pub tier_id: TierId,
    /// Falls back to the configured default when omitted.
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// Body of trial, upgrade and downgrade requests.
#[derive(Debug, Clone, Deserialize)]
pub struct TierRequest {
    pub tier_id: TierId,
}

/// Cancels immediately unless `at_period_end` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelSubscriptionRequest {
    #[serde(default)]
    pub at_period_end: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiatedResponse {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

impl From<TransactionAuthorization> for PaymentInitiatedResponse {
    fn from(auth: TransactionAuthorization) -> Self {
        Self {
            authorization_url: auth.authorization_url,
            access_code: auth.access_code,
            reference: auth.reference,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmationResponse {
    pub reference: String,
    /// Gateway status string.
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    pub paid_at: Option<Timestamp>,
    pub channel: Option<String>,
    /// `settled`, `already_settled`, `active_subscription_exists`, or absent
    /// when the charge did not succeed.
    pub settlement: Option<&'static str>,
    pub subscription: Option<SubscriptionResponse>,
}

impl PaymentConfirmationResponse {
    pub fn new(transaction: VerifiedTransaction, settlement: Option<SettlementResult>) -> Self {
        let (outcome, subscription) = match settlement {
            Some(SettlementResult::Settled { subscription, .. }) => {
                (Some("settled"), Some(SubscriptionResponse::from(subscription)))
            }
            Some(SettlementResult::AlreadySettled) => (Some("already_settled"), None),
            Some(SettlementResult::ActiveSubscriptionExists { .. }) => {
                (Some("active_subscription_exists"), None)
            }
            None => (None, None),
        };
        Self {
            reference: transaction.reference,
            status: transaction.status,
            amount: minor_to_major(transaction.amount_minor),
            currency: transaction.currency,
            paid_at: transaction.paid_at,
            channel: transaction.channel,
            settlement: outcome,
            subscription,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TierSummary {
    pub id: TierId,
    pub name: String,
    pub billing_type: BillingType,
    pub price: Decimal,
    pub currency: String,
    pub features: Vec<String>,
}

impl From<SubscriptionTier> for TierSummary {
    fn from(tier: SubscriptionTier) -> Self {
        Self {
            id: tier.id,
            name: tier.name,
            billing_type: tier.billing_type,
            price: tier.price,
            currency: tier.currency,
            features: tier.features,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: SubscriptionId,
    pub tier_id: TierId,
    pub status: SubscriptionStatus,
    pub is_active: bool,
    pub has_access: bool,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
    pub trial_end: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub amount_paid: Option<Decimal>,
    pub last_payment_at: Option<Timestamp>,
}

impl From<UserSubscription> for SubscriptionResponse {
    fn from(sub: UserSubscription) -> Self {
        Self {
            has_access: sub.grants_premium(),
            id: sub.id,
            tier_id: sub.tier_id,
            status: sub.status,
            is_active: sub.is_active,
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
            trial_end: sub.trial_end,
            cancelled_at: sub.cancelled_at,
            amount_paid: sub.amount_paid,
            last_payment_at: sub.last_payment_at,
        }
    }
}

/// `subscription` is null when the user has no current subscription.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentSubscriptionResponse {
    pub subscription: Option<SubscriptionResponse>,
    pub tier: Option<TierSummary>,
}

impl From<Option<CurrentSubscription>> for CurrentSubscriptionResponse {
    fn from(current: Option<CurrentSubscription>) -> Self {
        match current {
            Some(current) => Self {
                subscription: Some(current.subscription.into()),
                tier: current.tier.map(TierSummary::from),
            },
            None => Self {
                subscription: None,
                tier: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceResponse {
    pub id: SettlementId,
    pub reference: String,
    pub subscription_id: SubscriptionId,
    pub tier_id: TierId,
    pub amount: Decimal,
    pub currency: String,
    pub channel: Option<String>,
    pub paid_at: Timestamp,
}

impl From<SettlementRecord> for InvoiceResponse {
    fn from(record: SettlementRecord) -> Self {
        Self {
            id: record.id,
            reference: record.reference,
            subscription_id: record.subscription_id,
            tier_id: record.tier_id,
            amount: record.amount,
            currency: record.currency,
            channel: record.channel,
            paid_at: record.paid_at,
        }
    }
}

pub type InvoiceListResponse = Page<InvoiceResponse>;

pub fn invoice_page(page: Page<SettlementRecord>) -> InvoiceListResponse {
    Page {
        items: page.items.into_iter().map(InvoiceResponse::from).collect(),
        page: page.page,
        limit: page.limit,
        total: page.total,
        total_pages: page.total_pages,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAckResponse {
    pub received: bool,
    pub outcome: &'static str,
}

impl From<&WebhookOutcome> for WebhookAckResponse {
    fn from(outcome: &WebhookOutcome) -> Self {
        let outcome = match outcome {
            WebhookOutcome::Settled { .. } => "settled",
            WebhookOutcome::AlreadySettled => "already_settled",
            WebhookOutcome::Bound { .. } => "bound",
            WebhookOutcome::Cancelled { .. } => "cancelled",
            WebhookOutcome::CancellationScheduled { .. } => "cancellation_scheduled",
            WebhookOutcome::MarkedPastDue { .. } => "past_due",
            WebhookOutcome::Recovered { .. } => "recovered",
            WebhookOutcome::Renewed { .. } => "renewed",
            WebhookOutcome::Acknowledged => "acknowledged",
            WebhookOutcome::Ignored => "ignored",
        };
        Self {
            received: true,
            outcome,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
