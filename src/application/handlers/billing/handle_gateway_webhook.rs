//! HandleGatewayWebhookHandler - verifies and dispatches gateway webhooks.
//!
//! Every event is safe to redeliver. Out-of-order deliveries (a late
//! `subscription.disable` after a local cancel, a failed invoice on an
//! expired row) are acknowledged without effect. A write that loses a race
//! with another writer surfaces as a retryable error so the gateway
//! redelivers against the fresh row.

use std::sync::Arc;

use crate::domain::billing::{
    GatewayEvent, GatewayEventKind, PaymentMetadata, SubscriptionStatus, UserSubscription,
    WebhookError, WebhookSignatureVerifier,
};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{
    BillingNotification, PaymentGateway, SubscriptionRepository, TierRepository, UserNotifier,
};

use super::{SettlePaymentHandler, SettlementResult};

#[derive(Debug, Clone)]
pub struct HandleGatewayWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A charge created or promoted a subscription.
    Settled { subscription_id: SubscriptionId },
    /// The reference was settled by an earlier delivery.
    AlreadySettled,
    /// A gateway subscription code was attached to a local row.
    Bound { subscription_id: SubscriptionId },
    Cancelled { subscription_id: SubscriptionId },
    /// The gateway will not renew; access runs to the period end.
    CancellationScheduled { subscription_id: SubscriptionId },
    MarkedPastDue { subscription_id: SubscriptionId },
    /// A past-due row paid its renewal.
    Recovered { subscription_id: SubscriptionId },
    /// An active row paid its renewal; the period was extended.
    Renewed { subscription_id: SubscriptionId },
    /// Known event, nothing to change.
    Acknowledged,
    /// Event type this service does not act on.
    Ignored,
}

pub struct HandleGatewayWebhookHandler {
    verifier: WebhookSignatureVerifier,
    settle: Arc<SettlePaymentHandler>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    tiers: Arc<dyn TierRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn UserNotifier>,
}

impl HandleGatewayWebhookHandler {
    pub fn new(
        verifier: WebhookSignatureVerifier,
        settle: Arc<SettlePaymentHandler>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        tiers: Arc<dyn TierRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        Self {
            verifier,
            settle,
            subscriptions,
            tiers,
            gateway,
            notifier,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleGatewayWebhookCommand,
    ) -> Result<WebhookOutcome, WebhookError> {
        if !self.verifier.verify(&cmd.payload, cmd.signature.as_deref()) {
            tracing::warn!(
                security_event = true,
                signature_present = cmd.signature.is_some(),
                body_len = cmd.payload.len(),
                "Webhook signature verification failed"
            );
            return Err(WebhookError::InvalidSignature);
        }

        let event = GatewayEvent::from_slice(&cmd.payload)?;
        let kind = event.kind();
        tracing::debug!(event = %event.event, "Processing gateway webhook");

        match kind {
            GatewayEventKind::ChargeSuccess => self.charge_success(&event).await,
            GatewayEventKind::SubscriptionCreate => self.subscription_create(&event).await,
            GatewayEventKind::SubscriptionDisable => self.subscription_disable(&event).await,
            GatewayEventKind::SubscriptionNotRenew => self.subscription_not_renew(&event).await,
            GatewayEventKind::InvoicePaymentFailed => self.invoice_failed(&event).await,
            GatewayEventKind::InvoiceUpdate => self.invoice_update(&event).await,
            GatewayEventKind::Unknown(name) => {
                tracing::info!(event = %name, "Ignoring unhandled webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn charge_success(&self, event: &GatewayEvent) -> Result<WebhookOutcome, WebhookError> {
        let reference = event
            .reference()
            .ok_or(WebhookError::MissingField("reference"))?;

        // The body only names the reference; status and amount come from the gateway.
        let transaction = self
            .gateway
            .verify_transaction(reference)
            .await
            .map_err(|e| WebhookError::Gateway(e.to_string()))?;

        if !transaction.is_success() {
            tracing::warn!(
                reference = %reference,
                status = %transaction.status,
                "charge.success not confirmed by gateway"
            );
            return Ok(WebhookOutcome::Acknowledged);
        }

        let metadata = if transaction.metadata.is_null() {
            event.data.get("metadata").cloned().unwrap_or_default()
        } else {
            transaction.metadata.clone()
        };
        let metadata = PaymentMetadata::from_value(&metadata)?;

        match self.settle.settle_verified(&transaction, metadata).await? {
            SettlementResult::Settled { subscription, .. } => Ok(WebhookOutcome::Settled {
                subscription_id: subscription.id,
            }),
            SettlementResult::AlreadySettled => Ok(WebhookOutcome::AlreadySettled),
            SettlementResult::ActiveSubscriptionExists { .. } => Ok(WebhookOutcome::Acknowledged),
        }
    }

    async fn subscription_create(
        &self,
        event: &GatewayEvent,
    ) -> Result<WebhookOutcome, WebhookError> {
        let code = event
            .subscription_code()
            .ok_or(WebhookError::MissingField("subscription_code"))?;
        let Some(customer) = event.customer_code() else {
            return Ok(WebhookOutcome::Acknowledged);
        };

        let found = self.subscriptions.find_by_customer_code(customer).await.map_err(db)?;
        let Some(mut subscription) = found.filter(UserSubscription::is_current) else {
            tracing::info!(customer_code = %customer, "No subscription to bind gateway code to");
            return Ok(WebhookOutcome::Acknowledged);
        };
        if subscription.remote_subscription_code.as_deref() == Some(code) {
            return Ok(WebhookOutcome::Acknowledged);
        }

        subscription.bind_remote(code, Some(customer.to_string()), Timestamp::now());
        self.subscriptions.save(&subscription).await.map_err(db)?;

        tracing::info!(
            subscription_id = %subscription.id,
            subscription_code = %code,
            "Bound gateway subscription"
        );
        Ok(WebhookOutcome::Bound {
            subscription_id: subscription.id,
        })
    }

    async fn subscription_disable(
        &self,
        event: &GatewayEvent,
    ) -> Result<WebhookOutcome, WebhookError> {
        let Some(mut subscription) = self.matching_subscription(event).await? else {
            return Ok(WebhookOutcome::Acknowledged);
        };
        if !subscription.is_current() {
            return Ok(WebhookOutcome::Acknowledged);
        }

        let now = Timestamp::now();
        subscription.cancel(now)?;
        self.subscriptions.save(&subscription).await.map_err(db)?;
        self.notify(
            &subscription,
            BillingNotification::SubscriptionCancelled { effective_at: now },
        )
        .await;

        tracing::info!(subscription_id = %subscription.id, "Subscription cancelled by gateway");
        Ok(WebhookOutcome::Cancelled {
            subscription_id: subscription.id,
        })
    }

    async fn subscription_not_renew(
        &self,
        event: &GatewayEvent,
    ) -> Result<WebhookOutcome, WebhookError> {
        let Some(mut subscription) = self.matching_subscription(event).await? else {
            return Ok(WebhookOutcome::Acknowledged);
        };
        if !subscription.is_current() || subscription.cancel_at_period_end {
            return Ok(WebhookOutcome::Acknowledged);
        }

        subscription.cancel_at_period_end(Timestamp::now())?;
        self.subscriptions.save(&subscription).await.map_err(db)?;
        self.notify(
            &subscription,
            BillingNotification::SubscriptionCancelled {
                effective_at: subscription.current_period_end,
            },
        )
        .await;

        tracing::info!(subscription_id = %subscription.id, "Gateway will not renew subscription");
        Ok(WebhookOutcome::CancellationScheduled {
            subscription_id: subscription.id,
        })
    }

    async fn invoice_failed(&self, event: &GatewayEvent) -> Result<WebhookOutcome, WebhookError> {
        let Some(mut subscription) = self.matching_subscription(event).await? else {
            return Ok(WebhookOutcome::Acknowledged);
        };
        if !subscription.is_entitled() {
            return Ok(WebhookOutcome::Acknowledged);
        }

        subscription.mark_past_due(Timestamp::now())?;
        self.subscriptions.save(&subscription).await.map_err(db)?;
        self.notify(&subscription, BillingNotification::PaymentFailed).await;

        tracing::info!(subscription_id = %subscription.id, "Subscription marked past due");
        Ok(WebhookOutcome::MarkedPastDue {
            subscription_id: subscription.id,
        })
    }

    async fn invoice_update(&self, event: &GatewayEvent) -> Result<WebhookOutcome, WebhookError> {
        if !event.invoice_paid() {
            return Ok(WebhookOutcome::Acknowledged);
        }
        let Some(mut subscription) = self.matching_subscription(event).await? else {
            return Ok(WebhookOutcome::Acknowledged);
        };
        let was_past_due = subscription.status == SubscriptionStatus::PastDue;
        if !was_past_due && !subscription.is_entitled() {
            return Ok(WebhookOutcome::Acknowledged);
        }

        let tier = self
            .tiers
            .find_by_id(&subscription.tier_id)
            .await
            .map_err(db)?
            .ok_or_else(|| {
                WebhookError::Integrity(format!(
                    "subscription {} references missing tier {}",
                    subscription.id, subscription.tier_id
                ))
            })?;

        subscription.renew(&tier, Timestamp::now())?;
        self.subscriptions.save(&subscription).await.map_err(db)?;

        let subscription_id = subscription.id;
        tracing::info!(subscription_id = %subscription_id, recovered = was_past_due, "Renewal paid");
        if was_past_due {
            Ok(WebhookOutcome::Recovered { subscription_id })
        } else {
            Ok(WebhookOutcome::Renewed { subscription_id })
        }
    }

    /// By gateway subscription code, else by customer code.
    async fn matching_subscription(
        &self,
        event: &GatewayEvent,
    ) -> Result<Option<UserSubscription>, WebhookError> {
        if let Some(code) = event.subscription_code() {
            if let Some(found) = self
                .subscriptions
                .find_by_remote_subscription_code(code)
                .await
                .map_err(db)?
            {
                return Ok(Some(found));
            }
        }
        match event.customer_code() {
            Some(customer) => self.subscriptions.find_by_customer_code(customer).await.map_err(db),
            None => Ok(None),
        }
    }

    async fn notify(&self, subscription: &UserSubscription, notification: BillingNotification) {
        if let Err(e) = self.notifier.notify(&subscription.user_id, notification).await {
            tracing::warn!(user_id = %subscription.user_id, error = %e, "Billing notification failed");
        }
    }
}

fn db(err: crate::domain::foundation::DomainError) -> WebhookError {
    WebhookError::from(crate::domain::billing::BillingError::from(err))
}
