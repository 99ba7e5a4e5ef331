//! In-process gateway for tests.
//!
//! Supports canned verification results, error injection, an artificial
//! plan-creation delay (to widen race windows), and a call log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::foundation::Timestamp;
use crate::ports::{
    CreatePlan, GatewayError, InitializeTransaction, PaymentGateway, RemotePlan,
    RemoteSubscription, TransactionAuthorization, VerifiedTransaction,
};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Initialize(InitializeTransaction),
    Verify(String),
    CreatePlan(CreatePlan),
    CreateSubscription { customer_code: String, plan_code: String },
    FetchSubscription(String),
    DisableSubscription { code: String, email_token: String },
}

#[derive(Clone, Default)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    transactions: HashMap<String, VerifiedTransaction>,
    subscriptions: HashMap<String, RemoteSubscription>,
    plans_created: u32,
    plan_delay: Option<Duration>,
    next_error: Option<GatewayError>,
    calls: Vec<GatewayCall>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread poisons the lock; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers what `verify_transaction` returns for a reference.
    pub fn set_transaction(&self, tx: VerifiedTransaction) {
        self.state().transactions.insert(tx.reference.clone(), tx);
    }

    /// Convenience: a successful charge with the given metadata.
    pub fn succeed(&self, reference: &str, amount_minor: i64, metadata: Value) {
        let id = 4_000_000_000u64 + self.state().transactions.len() as u64;
        self.set_transaction(VerifiedTransaction {
            id: Some(id.to_string()),
            reference: reference.to_string(),
            status: "success".to_string(),
            amount_minor,
            currency: "NGN".to_string(),
            paid_at: Some(Timestamp::now()),
            channel: Some("card".to_string()),
            customer_code: Some(format!("CUS_{}", reference)),
            customer_email: Some("customer@example.com".to_string()),
            gateway_response: Some("Successful".to_string()),
            metadata,
        });
    }

    pub fn set_subscription(&self, sub: RemoteSubscription) {
        self.state()
            .subscriptions
            .insert(sub.subscription_code.clone(), sub);
    }

    /// The next call of any kind fails with `error`.
    pub fn fail_next(&self, error: GatewayError) {
        self.state().next_error = Some(error);
    }

    pub fn set_plan_delay(&self, delay: Duration) {
        self.state().plan_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    pub fn plans_created(&self) -> u32 {
        self.state().plans_created
    }

    pub fn count_calls(&self, matches: impl Fn(&GatewayCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| matches(c)).count()
    }

    fn record(&self, call: GatewayCall) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.calls.push(call);
        match state.next_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn initialize_transaction(
        &self,
        request: InitializeTransaction,
    ) -> Result<TransactionAuthorization, GatewayError> {
        let reference = request.reference.clone();
        self.record(GatewayCall::Initialize(request))?;
        Ok(TransactionAuthorization {
            authorization_url: format!("https://checkout.example.com/{}", reference),
            access_code: format!("acc_{}", reference),
            reference,
        })
    }

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<VerifiedTransaction, GatewayError> {
        self.record(GatewayCall::Verify(reference.to_string()))?;
        self.state()
            .transactions
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::rejected("Transaction reference not found"))
    }

    async fn create_plan(&self, request: CreatePlan) -> Result<RemotePlan, GatewayError> {
        let name = request.name.clone();
        self.record(GatewayCall::CreatePlan(request))?;
        let delay = self.state().plan_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.plans_created += 1;
        Ok(RemotePlan {
            plan_code: format!("PLN_{:04}", state.plans_created),
            name,
        })
    }

    async fn create_subscription(
        &self,
        customer_code: &str,
        plan_code: &str,
    ) -> Result<RemoteSubscription, GatewayError> {
        self.record(GatewayCall::CreateSubscription {
            customer_code: customer_code.to_string(),
            plan_code: plan_code.to_string(),
        })?;
        let mut state = self.state();
        let sub = RemoteSubscription {
            subscription_code: format!("SUB_{:04}", state.subscriptions.len() + 1),
            email_token: Some(format!("tok_{}", customer_code)),
            status: "active".to_string(),
            customer_code: Some(customer_code.to_string()),
            plan_code: Some(plan_code.to_string()),
            next_payment_date: None,
        };
        state
            .subscriptions
            .insert(sub.subscription_code.clone(), sub.clone());
        Ok(sub)
    }

    async fn fetch_subscription(
        &self,
        subscription_code: &str,
    ) -> Result<RemoteSubscription, GatewayError> {
        self.record(GatewayCall::FetchSubscription(subscription_code.to_string()))?;
        self.state()
            .subscriptions
            .get(subscription_code)
            .cloned()
            .ok_or_else(|| GatewayError::http(404, r#"{"status":false,"message":"Subscription not found"}"#))
    }

    async fn disable_subscription(
        &self,
        subscription_code: &str,
        email_token: &str,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::DisableSubscription {
            code: subscription_code.to_string(),
            email_token: email_token.to_string(),
        })?;
        if let Some(sub) = self.state().subscriptions.get_mut(subscription_code) {
            sub.status = "complete".to_string();
        }
        Ok(())
    }
}
