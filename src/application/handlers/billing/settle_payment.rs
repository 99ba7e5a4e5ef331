//! SettlePaymentHandler - applies a gateway-confirmed payment exactly once.
//!
//! Callers must have verified the transaction server-to-server; webhook
//! bodies are never trusted for amounts or status.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, ConfirmedPayment, PaymentMetadata, PaymentReference, SettlementRecord,
    UserSubscription,
};
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};
use crate::ports::{
    BillingNotification, PaymentGateway, SettleOutcome, SettlementRequest, SettlementStore,
    TierRepository, UserNotifier, VerifiedTransaction,
};

/// What settling a verified payment did.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementResult {
    Settled {
        subscription: UserSubscription,
        settlement: SettlementRecord,
        promoted: bool,
    },
    /// The reference was applied before; nothing changed.
    AlreadySettled,
    /// The user already holds an entitled active subscription.
    ActiveSubscriptionExists { subscription_id: SubscriptionId },
}

#[derive(Debug, Clone)]
pub struct ConfirmPaymentCommand {
    pub reference: String,
    /// When set, the transaction must belong to this user.
    pub user_id: Option<UserId>,
}

/// Verified transaction plus what settlement did with it. `settlement` is
/// `None` when the gateway does not report success.
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub transaction: VerifiedTransaction,
    pub settlement: Option<SettlementResult>,
}

pub struct SettlePaymentHandler {
    tiers: Arc<dyn TierRepository>,
    settlements: Arc<dyn SettlementStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn UserNotifier>,
}

impl SettlePaymentHandler {
    pub fn new(
        tiers: Arc<dyn TierRepository>,
        settlements: Arc<dyn SettlementStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        Self {
            tiers,
            settlements,
            gateway,
            notifier,
        }
    }

    /// Verifies `reference` with the gateway and settles it on success.
    pub async fn confirm(
        &self,
        cmd: ConfirmPaymentCommand,
    ) -> Result<PaymentConfirmation, BillingError> {
        let reference = PaymentReference::parse(&cmd.reference)?;
        let transaction = self.gateway.verify_transaction(reference.as_str()).await?;

        if !transaction.is_success() {
            tracing::info!(
                reference = %reference,
                status = %transaction.status,
                "Confirmed transaction is not successful"
            );
            return Ok(PaymentConfirmation {
                transaction,
                settlement: None,
            });
        }

        let metadata = PaymentMetadata::from_value(&transaction.metadata)
            .map_err(|e| BillingError::validation("metadata", e.to_string()))?;
        if let Some(user_id) = cmd.user_id {
            if metadata.user_id != user_id {
                return Err(BillingError::not_found("payment", reference));
            }
        }

        let settlement = self.settle_verified(&transaction, metadata).await?;
        Ok(PaymentConfirmation {
            transaction,
            settlement: Some(settlement),
        })
    }

    /// Settles a transaction the gateway reported as successful.
    pub async fn settle_verified(
        &self,
        transaction: &VerifiedTransaction,
        metadata: PaymentMetadata,
    ) -> Result<SettlementResult, BillingError> {
        if !transaction.is_success() {
            return Err(BillingError::validation(
                "status",
                format!("transaction status is '{}'", transaction.status),
            ));
        }

        if self.settlements.exists(&transaction.reference).await? {
            tracing::debug!(reference = %transaction.reference, "Reference already settled");
            return Ok(SettlementResult::AlreadySettled);
        }

        let tier = self
            .tiers
            .find_by_id(&metadata.tier_id)
            .await?
            .ok_or_else(|| BillingError::not_found("tier", metadata.tier_id))?;

        if !transaction.currency.eq_ignore_ascii_case(&tier.currency) {
            return Err(BillingError::validation(
                "currency",
                format!(
                    "paid in {} but tier '{}' is priced in {}",
                    transaction.currency, tier.name, tier.currency
                ),
            ));
        }
        let expected_minor = tier.price_minor()?;
        if transaction.amount_minor < expected_minor {
            return Err(BillingError::validation(
                "amount",
                format!(
                    "paid {} minor units, tier '{}' costs {}",
                    transaction.amount_minor, tier.name, expected_minor
                ),
            ));
        }

        let now = Timestamp::now();
        let payment = ConfirmedPayment {
            reference: transaction.reference.clone(),
            user_id: metadata.user_id,
            tier_id: tier.id,
            amount_minor: transaction.amount_minor,
            currency: tier.currency.clone(),
            gateway_transaction_id: transaction.id.clone(),
            channel: transaction.channel.clone(),
            customer_code: transaction.customer_code.clone(),
            paid_at: transaction.paid_at.unwrap_or(now),
        };

        let outcome = self
            .settlements
            .settle(SettlementRequest {
                payment,
                tier: tier.clone(),
                now,
            })
            .await?;

        match outcome {
            SettleOutcome::Applied {
                subscription,
                settlement,
                promoted,
            } => {
                self.notify(
                    &subscription.user_id,
                    BillingNotification::SubscriptionActivated {
                        tier_name: tier.name.clone(),
                        period_end: subscription.current_period_end,
                    },
                )
                .await;
                Ok(SettlementResult::Settled {
                    subscription,
                    settlement,
                    promoted,
                })
            }
            SettleOutcome::AlreadySettled => Ok(SettlementResult::AlreadySettled),
            SettleOutcome::ActiveSubscriptionExists { subscription_id } => {
                tracing::warn!(
                    reference = %transaction.reference,
                    user_id = %metadata.user_id,
                    subscription_id = %subscription_id,
                    "Paid reference not applied: user already has an active subscription"
                );
                Ok(SettlementResult::ActiveSubscriptionExists { subscription_id })
            }
            SettleOutcome::Contended => {
                tracing::info!(
                    reference = %transaction.reference,
                    user_id = %metadata.user_id,
                    "Settlement contended, asking for retry"
                );
                Err(BillingError::contention(format!(
                    "subscription for user {} is being changed concurrently",
                    metadata.user_id
                )))
            }
        }
    }

    async fn notify(&self, user_id: &UserId, notification: BillingNotification) {
        if let Err(e) = self.notifier.notify(user_id, notification).await {
            tracing::warn!(user_id = %user_id, error = %e, "Billing notification failed");
        }
    }
}
