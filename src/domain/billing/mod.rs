//! Billing domain - subscriptions, tiers, settlements, and gateway webhooks.

mod errors;
mod gateway_event;
mod plan_binding;
mod reference;
mod settlement;
mod status;
mod subscription;
mod tier;
mod webhook_errors;
mod webhook_verifier;

pub use errors::BillingError;
pub use gateway_event::{GatewayEvent, GatewayEventKind, PaymentMetadata};
pub use plan_binding::RemotePlanBinding;
pub use reference::PaymentReference;
pub use settlement::{ConfirmedPayment, SettlementDecision, SettlementRecord};
pub use status::SubscriptionStatus;
pub use subscription::{PaymentDetails, PlanChange, UserSubscription};
pub use tier::{
    minor_to_major, BillingType, SubscriptionTier, LIFETIME_PERIOD_DAYS, MINOR_UNITS_PER_MAJOR,
};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{WebhookSignatureVerifier, SIGNATURE_HEADER};

#[cfg(test)]
pub(crate) use tier::test_tier;
