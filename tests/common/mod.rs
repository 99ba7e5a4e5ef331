//! Shared fixtures for integration tests.
//!
//! Everything runs against the in-memory store and the scriptable gateway,
//! wired through the same `BillingAppState` the server uses.

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{json, Value};

use subscription_ledger::adapters::http::{BillingAppState, BillingPorts, HttpPolicy};
use subscription_ledger::adapters::{
    InMemoryBillingStore, InMemoryPlanCodeCache, MockPaymentGateway, TracingNotifier,
};
use subscription_ledger::application::HandleGatewayWebhookCommand;
use subscription_ledger::domain::billing::{
    BillingType, PaymentMetadata, SubscriptionTier, WebhookSignatureVerifier,
};
use subscription_ledger::domain::foundation::{TierId, UserId};

pub const WEBHOOK_SECRET: &str = "sk_test_integration_secret";

/// A purchasable tier priced in NGN.
pub fn tier(price_minor: i64, billing_type: BillingType) -> SubscriptionTier {
    SubscriptionTier {
        id: TierId::new(),
        name: "Pro".to_string(),
        billing_type,
        level: 2,
        price: Decimal::new(price_minor, 2),
        currency: "NGN".to_string(),
        billing_cycle_days: 30,
        trial_days: 0,
        features: vec!["unlimited_projects".to_string()],
        is_active: true,
        sort_order: 1,
        deleted_at: None,
    }
}

pub struct TestApp {
    pub store: InMemoryBillingStore,
    pub gateway: MockPaymentGateway,
    pub plan_cache: InMemoryPlanCodeCache,
    pub state: BillingAppState,
    pub signer: WebhookSignatureVerifier,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_batch_size(500)
    }

    pub fn with_batch_size(batch_size: u32) -> Self {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let plan_cache = InMemoryPlanCodeCache::new();
        let ports = BillingPorts {
            users: Arc::new(store.clone()),
            tiers: Arc::new(store.clone()),
            bindings: Arc::new(store.clone()),
            subscriptions: Arc::new(store.clone()),
            settlements: Arc::new(store.clone()),
            plan_cache: Arc::new(plan_cache.clone()),
            gateway: Arc::new(gateway.clone()),
            notifier: Arc::new(TracingNotifier::new()),
        };
        let state = BillingAppState::new(
            ports,
            secret(),
            batch_size,
            HttpPolicy {
                default_callback_url: Some("https://app.example.com/billing/return".to_string()),
                ..Default::default()
            },
        );
        Self {
            store,
            gateway,
            plan_cache,
            state,
            signer: WebhookSignatureVerifier::new(secret()),
        }
    }

    /// Signs `body` the way the gateway does.
    pub fn signed(&self, body: &Value) -> HandleGatewayWebhookCommand {
        let payload = serde_json::to_vec(body).expect("serialize webhook body");
        let signature = self.signer.sign(&payload);
        HandleGatewayWebhookCommand {
            payload,
            signature: Some(signature),
        }
    }
}

pub fn secret() -> SecretString {
    SecretString::new(WEBHOOK_SECRET.to_string())
}

pub fn metadata(user_id: UserId, tier_id: TierId) -> Value {
    PaymentMetadata { user_id, tier_id }.to_value()
}

pub fn charge_success(reference: &str, amount_minor: i64, metadata: Value) -> Value {
    json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "amount": amount_minor,
            "currency": "NGN",
            "status": "success",
            "metadata": metadata,
        }
    })
}
