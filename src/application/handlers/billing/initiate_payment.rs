//! InitiatePaymentHandler - opens a hosted checkout for a paid tier.
//!
//! No local state is written: the tier and user ride through the gateway in
//! the transaction metadata and come back on verification.

use std::sync::Arc;

use reqwest::Url;

use crate::domain::billing::{BillingError, PaymentMetadata, PaymentReference};
use crate::domain::foundation::{TierId, Timestamp, UserId};
use crate::ports::{
    InitializeTransaction, PaymentGateway, SubscriptionRepository, TierRepository,
    TransactionAuthorization, UserDirectory,
};

use super::PlanProvisioner;

#[derive(Debug, Clone)]
pub struct InitiatePaymentCommand {
    pub user_id: UserId,
    pub tier_id: TierId,
    pub callback_url: Option<String>,
}

pub struct InitiatePaymentHandler {
    users: Arc<dyn UserDirectory>,
    tiers: Arc<dyn TierRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    provisioner: Arc<PlanProvisioner>,
    gateway: Arc<dyn PaymentGateway>,
}

impl InitiatePaymentHandler {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        tiers: Arc<dyn TierRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        provisioner: Arc<PlanProvisioner>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            users,
            tiers,
            subscriptions,
            provisioner,
            gateway,
        }
    }

    pub async fn handle(
        &self,
        cmd: InitiatePaymentCommand,
    ) -> Result<TransactionAuthorization, BillingError> {
        let callback_url = cmd
            .callback_url
            .as_deref()
            .map(validate_callback_url)
            .transpose()?;

        let contact = self
            .users
            .find_contact(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::not_found("user", cmd.user_id))?;

        let tier = self
            .tiers
            .find_by_id(&cmd.tier_id)
            .await?
            .filter(|t| t.is_available())
            .ok_or_else(|| BillingError::not_found("tier", cmd.tier_id))?;
        if tier.is_free() {
            return Err(BillingError::validation(
                "tier_id",
                format!("tier '{}' is free and needs no payment", tier.name),
            ));
        }

        // Optimistic: settlement re-checks under lock.
        if let Some(current) = self.subscriptions.find_current_for_user(&cmd.user_id).await? {
            if current.is_entitled() {
                return Err(BillingError::conflict(
                    "User already has an active subscription",
                ));
            }
        }

        let plan_code = if tier.billing_type.is_recurring() {
            Some(self.provisioner.plan_code_for(&tier).await?)
        } else {
            None
        };

        let reference = PaymentReference::generate(Timestamp::now());
        let metadata = PaymentMetadata {
            user_id: cmd.user_id,
            tier_id: tier.id,
        };

        let authorization = self
            .gateway
            .initialize_transaction(InitializeTransaction {
                email: contact.email,
                amount_minor: tier.price_minor()?,
                currency: tier.currency.clone(),
                reference: reference.as_str().to_string(),
                plan_code,
                callback_url,
                metadata: metadata.to_value(),
            })
            .await?;

        tracing::info!(
            user_id = %cmd.user_id,
            tier_id = %tier.id,
            reference = %authorization.reference,
            "Payment initiated"
        );

        Ok(authorization)
    }
}

fn validate_callback_url(raw: &str) -> Result<String, BillingError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| BillingError::validation("callback_url", e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url.to_string()),
        _ => Err(BillingError::validation(
            "callback_url",
            "must be an absolute http(s) URL",
        )),
    }
}
