//! Gateway wire types.
//!
//! Every response is wrapped in `{status, message, data}`. Only fields the
//! engine reads are modelled; unknown fields are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::Timestamp;
use crate::ports::{RemotePlan, RemoteSubscription, TransactionAuthorization, VerifiedTransaction};

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InitializeBody<'a> {
    pub email: &'a str,
    pub amount: i64,
    pub currency: &'a str,
    pub reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<&'a str>,
    pub metadata: &'a Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct PlanBody<'a> {
    pub name: &'a str,
    pub interval: &'a str,
    pub amount: i64,
    pub currency: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubscriptionBody<'a> {
    pub customer: &'a str,
    pub plan: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DisableBody<'a> {
    pub code: &'a str,
    pub token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthorizationData {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

impl From<AuthorizationData> for TransactionAuthorization {
    fn from(data: AuthorizationData) -> Self {
        Self {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CustomerData {
    pub customer_code: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransactionData {
    pub id: Option<i64>,
    pub reference: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub channel: Option<String>,
    pub gateway_response: Option<String>,
    pub customer: Option<CustomerData>,
    #[serde(default)]
    pub metadata: Value,
}

impl From<TransactionData> for VerifiedTransaction {
    fn from(data: TransactionData) -> Self {
        let (customer_code, customer_email) = match data.customer {
            Some(c) => (c.customer_code, c.email),
            None => (None, None),
        };
        Self {
            id: data.id.map(|id| id.to_string()),
            reference: data.reference,
            status: data.status,
            amount_minor: data.amount,
            currency: data.currency,
            paid_at: data.paid_at.map(Timestamp::from_datetime),
            channel: data.channel,
            customer_code,
            customer_email,
            gateway_response: data.gateway_response,
            metadata: data.metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlanData {
    pub plan_code: String,
    pub name: String,
}

impl From<PlanData> for RemotePlan {
    fn from(data: PlanData) -> Self {
        Self {
            plan_code: data.plan_code,
            name: data.name,
        }
    }
}

/// Plan and customer are objects on fetch but bare ids on create.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Embedded {
    Object(Value),
    Id(i64),
}

impl Embedded {
    fn code(&self, key: &str) -> Option<String> {
        match self {
            Embedded::Object(v) => v.get(key).and_then(Value::as_str).map(str::to_string),
            Embedded::Id(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionData {
    pub subscription_code: String,
    pub email_token: Option<String>,
    #[serde(default)]
    pub status: String,
    pub customer: Option<Embedded>,
    pub plan: Option<Embedded>,
    pub next_payment_date: Option<String>,
}

impl From<SubscriptionData> for RemoteSubscription {
    fn from(data: SubscriptionData) -> Self {
        Self {
            customer_code: data.customer.as_ref().and_then(|c| c.code("customer_code")),
            plan_code: data.plan.as_ref().and_then(|p| p.code("plan_code")),
            subscription_code: data.subscription_code,
            email_token: data.email_token,
            status: data.status,
            next_payment_date: data.next_payment_date,
        }
    }
}
