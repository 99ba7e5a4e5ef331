//! Application layer - Commands, Queries, and Handlers.
//!
//! Handlers orchestrate domain operations across ports. They own no state
//! beyond `Arc`'d ports and are shared by the HTTP layer and background tasks.

pub mod handlers;

pub use handlers::billing::{
    CancelSubscriptionCommand, ChangePlanCommand, ConfirmPaymentCommand, CurrentSubscription,
    HandleGatewayWebhookCommand, HandleGatewayWebhookHandler, InitiatePaymentCommand,
    InitiatePaymentHandler, ListInvoicesHandler, ListInvoicesQuery, PaymentConfirmation,
    PlanProvisioner, SettlePaymentHandler, SettlementResult, SubscribeCommand,
    SubscriptionLifecycleHandler, SweepExpiredHandler, SweepReport, WebhookOutcome,
};
