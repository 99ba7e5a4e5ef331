//! Billing handlers: plan provisioning, payment initiation and settlement,
//! gateway webhooks, subscription lifecycle, expiry sweeps and invoices.

mod handle_gateway_webhook;
mod initiate_payment;
mod list_invoices;
mod plan_provisioner;
mod settle_payment;
mod subscription_lifecycle;
mod sweep_expired;

pub use handle_gateway_webhook::{
    HandleGatewayWebhookCommand, HandleGatewayWebhookHandler, WebhookOutcome,
};
pub use initiate_payment::{InitiatePaymentCommand, InitiatePaymentHandler};
pub use list_invoices::{ListInvoicesHandler, ListInvoicesQuery};
pub use plan_provisioner::PlanProvisioner;
pub use settle_payment::{
    ConfirmPaymentCommand, PaymentConfirmation, SettlePaymentHandler, SettlementResult,
};
pub use subscription_lifecycle::{
    CancelSubscriptionCommand, ChangePlanCommand, CurrentSubscription, SubscribeCommand,
    SubscriptionLifecycleHandler,
};
pub use sweep_expired::{SweepExpiredHandler, SweepReport, DEFAULT_BATCH_SIZE};
