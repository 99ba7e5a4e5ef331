//! Inbound gateway webhook events.
//!
//! Only the fields the lifecycle needs are read; everything else in `data`
//! is ignored so new gateway fields never break delivery.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::foundation::{TierId, UserId};

use super::webhook_errors::WebhookError;

/// Event types this service acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEventKind {
    ChargeSuccess,
    SubscriptionCreate,
    SubscriptionDisable,
    SubscriptionNotRenew,
    InvoicePaymentFailed,
    InvoiceUpdate,
    Unknown(String),
}

impl GatewayEventKind {
    pub fn parse(event: &str) -> Self {
        match event {
            "charge.success" => GatewayEventKind::ChargeSuccess,
            "subscription.create" => GatewayEventKind::SubscriptionCreate,
            "subscription.disable" => GatewayEventKind::SubscriptionDisable,
            "subscription.not_renew" => GatewayEventKind::SubscriptionNotRenew,
            "invoice.payment_failed" => GatewayEventKind::InvoicePaymentFailed,
            "invoice.update" => GatewayEventKind::InvoiceUpdate,
            other => GatewayEventKind::Unknown(other.to_string()),
        }
    }
}

/// `{event, data}` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl GatewayEvent {
    pub fn from_slice(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(|e| WebhookError::ParseError(e.to_string()))
    }

    pub fn kind(&self) -> GatewayEventKind {
        GatewayEventKind::parse(&self.event)
    }

    /// Transaction reference on charge events.
    pub fn reference(&self) -> Option<&str> {
        non_empty(self.data.get("reference"))
    }

    /// Subscription code, either top-level (subscription events) or nested
    /// under `subscription` (invoice events).
    pub fn subscription_code(&self) -> Option<&str> {
        non_empty(self.data.get("subscription_code"))
            .or_else(|| non_empty(self.data.pointer("/subscription/subscription_code")))
    }

    pub fn customer_code(&self) -> Option<&str> {
        non_empty(self.data.pointer("/customer/customer_code"))
    }

    /// `invoice.update` marks a settled renewal with `paid: true`.
    pub fn invoice_paid(&self) -> bool {
        self.data.get("paid").and_then(Value::as_bool).unwrap_or(false)
    }
}

fn non_empty(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `{user_id, subscription_id}` echoed back by the gateway.
///
/// `subscription_id` carries the tier id chosen at initiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentMetadata {
    pub user_id: UserId,
    pub tier_id: TierId,
}

impl PaymentMetadata {
    pub const USER_KEY: &'static str = "user_id";
    pub const TIER_KEY: &'static str = "subscription_id";

    /// Reads metadata that may arrive as an object or as a JSON-encoded
    /// string, with ids as strings.
    pub fn from_value(metadata: &Value) -> Result<Self, WebhookError> {
        let decoded;
        let object = match metadata {
            Value::String(raw) => {
                decoded = serde_json::from_str::<Value>(raw)
                    .map_err(|_| WebhookError::MissingMetadata(Self::USER_KEY))?;
                &decoded
            }
            other => other,
        };

        let user_id = object
            .get(Self::USER_KEY)
            .and_then(id_text)
            .ok_or(WebhookError::MissingMetadata(Self::USER_KEY))?
            .parse::<UserId>()
            .map_err(|_| WebhookError::MissingMetadata(Self::USER_KEY))?;
        let tier_id = object
            .get(Self::TIER_KEY)
            .and_then(id_text)
            .ok_or(WebhookError::MissingMetadata(Self::TIER_KEY))?
            .parse::<TierId>()
            .map_err(|_| WebhookError::MissingMetadata(Self::TIER_KEY))?;

        Ok(Self { user_id, tier_id })
    }

    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(Self::USER_KEY.to_string(), Value::String(self.user_id.to_string()));
        map.insert(Self::TIER_KEY.to_string(), Value::String(self.tier_id.to_string()));
        Value::Object(map)
    }
}

fn id_text(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}
