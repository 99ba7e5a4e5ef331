//! HTTP adapter for a Paystack-style gateway.
//!
//! Bearer-authenticated JSON calls with a bounded timeout. Non-2xx answers
//! surface the raw body; `status: false` envelopes surface `message`.
//!
//! ```ignore
//! let config = PaystackConfig::new(secret_key).with_base_url("http://localhost:8089");
//! let gateway = PaystackGateway::new(config)?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ports::{
    CreatePlan, GatewayError, InitializeTransaction, PaymentGateway, RemotePlan,
    RemoteSubscription, TransactionAuthorization, VerifiedTransaction,
};

use super::wire::{
    AuthorizationData, DisableBody, Envelope, InitializeBody, PlanBody, PlanData,
    SubscriptionBody, SubscriptionData, TransactionData,
};

pub const DEFAULT_BASE_URL: &str = "https://api.paystack.co";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct PaystackConfig {
    secret_key: SecretString,
    base_url: String,
    timeout: Duration,
}

impl PaystackConfig {
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            secret_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

pub struct PaystackGateway {
    config: PaystackConfig,
    http_client: reqwest::Client,
}

impl PaystackGateway {
    pub fn new(config: PaystackConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Sends one request and unwraps the `{status, message, data}` envelope.
    async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        operation: &'static str,
    ) -> Result<Envelope<T>, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url, path);
        let mut request = self
            .http_client
            .request(method, &url)
            .bearer_auth(self.config.secret_key.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "Gateway request failed");
            if e.is_timeout() {
                GatewayError::timeout(format!("{} timed out", operation))
            } else {
                GatewayError::network(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(operation, status = status.as_u16(), body = %text, "Gateway call failed");
            return Err(GatewayError::http(status.as_u16(), text));
        }

        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(operation, error = %e, "Failed to decode gateway response");
            GatewayError::invalid_response(format!("{}: {}", operation, e))
        })?;

        if !envelope.status {
            tracing::warn!(operation, message = %envelope.message, "Gateway rejected request");
            return Err(GatewayError::rejected(envelope.message));
        }

        Ok(envelope)
    }

    async fn call_data<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        operation: &'static str,
    ) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call::<B, T>(method, path, body, operation)
            .await?
            .data
            .ok_or_else(|| GatewayError::invalid_response(format!("{}: missing data", operation)))
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize_transaction(
        &self,
        request: InitializeTransaction,
    ) -> Result<TransactionAuthorization, GatewayError> {
        let body = InitializeBody {
            email: &request.email,
            amount: request.amount_minor,
            currency: &request.currency,
            reference: &request.reference,
            plan: request.plan_code.as_deref(),
            callback_url: request.callback_url.as_deref(),
            metadata: &request.metadata,
        };
        let data: AuthorizationData = self
            .call_data(Method::POST, "/transaction/initialize", Some(&body), "initialize_transaction")
            .await?;
        tracing::info!(reference = %data.reference, "Gateway transaction initialized");
        Ok(data.into())
    }

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<VerifiedTransaction, GatewayError> {
        let path = format!("/transaction/verify/{}", reference);
        let data: TransactionData = self
            .call_data::<(), _>(Method::GET, &path, None, "verify_transaction")
            .await?;
        Ok(data.into())
    }

    async fn create_plan(&self, request: CreatePlan) -> Result<RemotePlan, GatewayError> {
        let body = PlanBody {
            name: &request.name,
            interval: &request.interval,
            amount: request.amount_minor,
            currency: &request.currency,
        };
        let data: PlanData = self
            .call_data(Method::POST, "/plan", Some(&body), "create_plan")
            .await?;
        tracing::info!(plan_code = %data.plan_code, "Gateway plan created");
        Ok(data.into())
    }

    async fn create_subscription(
        &self,
        customer_code: &str,
        plan_code: &str,
    ) -> Result<RemoteSubscription, GatewayError> {
        let body = SubscriptionBody {
            customer: customer_code,
            plan: plan_code,
        };
        let data: SubscriptionData = self
            .call_data(Method::POST, "/subscription", Some(&body), "create_subscription")
            .await?;
        Ok(data.into())
    }

    async fn fetch_subscription(
        &self,
        subscription_code: &str,
    ) -> Result<RemoteSubscription, GatewayError> {
        let path = format!("/subscription/{}", subscription_code);
        let data: SubscriptionData = self
            .call_data::<(), _>(Method::GET, &path, None, "fetch_subscription")
            .await?;
        Ok(data.into())
    }

    async fn disable_subscription(
        &self,
        subscription_code: &str,
        email_token: &str,
    ) -> Result<(), GatewayError> {
        let body = DisableBody {
            code: subscription_code,
            token: email_token,
        };
        self.call::<_, serde_json::Value>(
            Method::POST,
            "/subscription/disable",
            Some(&body),
            "disable_subscription",
        )
        .await?;
        tracing::info!(subscription_code, "Gateway subscription disabled");
        Ok(())
    }
}
