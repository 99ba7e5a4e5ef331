//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the billing application handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use secrecy::SecretString;
use subtle::ConstantTimeEq;

use crate::application::{
    CancelSubscriptionCommand, ChangePlanCommand, ConfirmPaymentCommand,
    HandleGatewayWebhookCommand, HandleGatewayWebhookHandler, InitiatePaymentCommand,
    InitiatePaymentHandler, ListInvoicesHandler, ListInvoicesQuery, PlanProvisioner,
    SettlePaymentHandler, SubscribeCommand, SubscriptionLifecycleHandler, SweepExpiredHandler,
};
use crate::domain::billing::{
    BillingError, PlanChange, WebhookError, WebhookSignatureVerifier, SIGNATURE_HEADER,
};
use crate::domain::foundation::UserId;
use crate::ports::{
    PaymentGateway, PlanBindingRepository, PlanCodeCache, SettlementStore, SubscriptionRepository,
    TierRepository, UserDirectory, UserNotifier,
};

use super::dto::{
    invoice_page, CancelSubscriptionRequest, CurrentSubscriptionResponse, ErrorResponse,
    HealthResponse, InitiatePaymentRequest, InvoiceListQuery, PaymentConfirmationResponse,
    PaymentInitiatedResponse, SubscriptionResponse, TierRequest, WebhookAckResponse,
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Every port the billing handlers depend on.
#[derive(Clone)]
pub struct BillingPorts {
    pub users: Arc<dyn UserDirectory>,
    pub tiers: Arc<dyn TierRepository>,
    pub bindings: Arc<dyn PlanBindingRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub settlements: Arc<dyn SettlementStore>,
    pub plan_cache: Arc<dyn PlanCodeCache>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn UserNotifier>,
}

/// Deployment knobs the HTTP layer applies on top of the handlers.
#[derive(Debug, Clone, Default)]
pub struct HttpPolicy {
    /// Used when an initiate request carries no callback URL.
    pub default_callback_url: Option<String>,
    /// Answer 200 to unsigned webhooks so the gateway stops retrying.
    pub acknowledge_invalid_signatures: bool,
    /// Admin routes answer 404 when unset.
    pub admin_token: Option<String>,
}

/// Shared state, cloned per request.
#[derive(Clone)]
pub struct BillingAppState {
    pub initiate_payment: Arc<InitiatePaymentHandler>,
    pub settle_payment: Arc<SettlePaymentHandler>,
    pub webhook: Arc<HandleGatewayWebhookHandler>,
    pub lifecycle: Arc<SubscriptionLifecycleHandler>,
    pub sweeper: Arc<SweepExpiredHandler>,
    pub invoices: Arc<ListInvoicesHandler>,
    pub policy: Arc<HttpPolicy>,
}

impl BillingAppState {
    /// Builds every handler over one set of ports.
    pub fn new(
        ports: BillingPorts,
        webhook_secret: SecretString,
        sweep_batch_size: u32,
        policy: HttpPolicy,
    ) -> Self {
        let provisioner = Arc::new(PlanProvisioner::new(
            ports.bindings.clone(),
            ports.gateway.clone(),
            ports.plan_cache.clone(),
        ));
        let settle_payment = Arc::new(SettlePaymentHandler::new(
            ports.tiers.clone(),
            ports.settlements.clone(),
            ports.gateway.clone(),
            ports.notifier.clone(),
        ));

        Self {
            initiate_payment: Arc::new(InitiatePaymentHandler::new(
                ports.users.clone(),
                ports.tiers.clone(),
                ports.subscriptions.clone(),
                provisioner,
                ports.gateway.clone(),
            )),
            webhook: Arc::new(HandleGatewayWebhookHandler::new(
                WebhookSignatureVerifier::new(webhook_secret),
                settle_payment.clone(),
                ports.subscriptions.clone(),
                ports.tiers.clone(),
                ports.gateway.clone(),
                ports.notifier.clone(),
            )),
            lifecycle: Arc::new(SubscriptionLifecycleHandler::new(
                ports.users.clone(),
                ports.tiers.clone(),
                ports.subscriptions.clone(),
                ports.gateway.clone(),
                ports.notifier.clone(),
            )),
            sweeper: Arc::new(
                SweepExpiredHandler::new(ports.subscriptions.clone(), ports.notifier.clone())
                    .with_batch_size(sweep_batch_size),
            ),
            invoices: Arc::new(ListInvoicesHandler::new(ports.settlements)),
            settle_payment,
            policy: Arc::new(policy),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity. Authentication happens upstream; the gateway in front of
/// this service forwards the user id in `X-User-Id`.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<UserId>().ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

fn admin_authorized(policy: &HttpPolicy, headers: &HeaderMap) -> Result<(), BillingApiError> {
    let Some(expected) = policy.admin_token.as_deref() else {
        return Err(BillingError::not_found("route", "admin").into());
    };
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        tracing::warn!(security_event = true, "Rejected admin request");
        Err(BillingApiError::Forbidden)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Payments
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/payments/initiate
pub async fn initiate_payment(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = InitiatePaymentCommand {
        user_id: user.user_id,
        tier_id: request.tier_id,
        callback_url: request
            .callback_url
            .or_else(|| state.policy.default_callback_url.clone()),
    };

    let authorization = state.initiate_payment.handle(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(PaymentInitiatedResponse::from(authorization)),
    ))
}

/// GET /api/billing/payments/:reference/confirm
pub async fn confirm_payment(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = ConfirmPaymentCommand {
        reference,
        user_id: Some(user.user_id),
    };

    let confirmation = state.settle_payment.confirm(cmd).await?;

    Ok(Json(PaymentConfirmationResponse::new(
        confirmation.transaction,
        confirmation.settlement,
    )))
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscriptions
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/subscriptions/trial
pub async fn start_trial(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<TierRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let subscription = state
        .lifecycle
        .subscribe(SubscribeCommand {
            user_id: user.user_id,
            tier_id: request.tier_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from(subscription)),
    ))
}

/// POST /api/billing/subscriptions/upgrade
pub async fn upgrade(
    state: State<BillingAppState>,
    user: AuthenticatedUser,
    request: Json<TierRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    change_plan(state, user, request, PlanChange::Upgrade).await
}

/// POST /api/billing/subscriptions/downgrade
pub async fn downgrade(
    state: State<BillingAppState>,
    user: AuthenticatedUser,
    request: Json<TierRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    change_plan(state, user, request, PlanChange::Downgrade).await
}

async fn change_plan(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<TierRequest>,
    direction: PlanChange,
) -> Result<Json<SubscriptionResponse>, BillingApiError> {
    let subscription = state
        .lifecycle
        .change_plan(ChangePlanCommand {
            user_id: user.user_id,
            tier_id: request.tier_id,
            direction,
        })
        .await?;

    Ok(Json(SubscriptionResponse::from(subscription)))
}

/// POST /api/billing/subscriptions/cancel
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CancelSubscriptionRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let subscription = state
        .lifecycle
        .cancel(CancelSubscriptionCommand {
            user_id: user.user_id,
            at_period_end: request.at_period_end,
        })
        .await?;

    Ok(Json(SubscriptionResponse::from(subscription)))
}

/// GET /api/billing/subscriptions/current
pub async fn current_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let current = state.lifecycle.current_subscription(&user.user_id).await?;
    Ok(Json(CurrentSubscriptionResponse::from(current)))
}

/// GET /api/billing/invoices
pub async fn list_invoices(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Query(query): Query<InvoiceListQuery>,
) -> Result<impl IntoResponse, BillingApiError> {
    let page = state
        .invoices
        .handle(ListInvoicesQuery {
            user_id: user.user_id,
            page: query.page,
            limit: query.limit,
        })
        .await?;

    Ok(Json(invoice_page(page)))
}

/// POST /api/billing/admin/sweep
pub async fn run_sweep(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, BillingApiError> {
    admin_authorized(&state.policy, &headers)?;
    let report = state.sweeper.handle().await?;
    Ok(Json(report))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhooks
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/paystack
///
/// The body is taken as raw bytes; the signature covers them exactly.
pub async fn handle_paystack_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = HandleGatewayWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    match state.webhook.handle(cmd).await {
        Ok(outcome) => (StatusCode::OK, Json(WebhookAckResponse::from(&outcome))).into_response(),
        Err(WebhookError::InvalidSignature) if state.policy.acknowledge_invalid_signatures => {
            let body = WebhookAckResponse {
                received: false,
                outcome: "discarded",
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => WebhookApiError(err).into_response(),
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
pub enum BillingApiError {
    Billing(BillingError),
    Forbidden,
}

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self::Billing(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let err = match self {
            BillingApiError::Forbidden => {
                let body = ErrorResponse::new("FORBIDDEN", "Admin token required");
                return (StatusCode::FORBIDDEN, Json(body)).into_response();
            }
            BillingApiError::Billing(err) => err,
        };

        let status = match &err {
            BillingError::Validation { .. } => StatusCode::BAD_REQUEST,
            BillingError::NotFound { .. } => StatusCode::NOT_FOUND,
            BillingError::Conflict(_)
            | BillingError::InvalidState { .. }
            | BillingError::Contention(_) => StatusCode::CONFLICT,
            BillingError::Gateway { .. } => StatusCode::BAD_GATEWAY,
            BillingError::Integrity(_) | BillingError::Infrastructure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %err, code = %err.code(), "Billing request failed");
        }

        let body = ErrorResponse::new(err.code().to_string(), err.message())
            .retryable(err.is_retryable());
        (status, Json(body)).into_response()
    }
}

/// Webhook errors carry their own status so the gateway knows whether to
/// redeliver.
pub struct WebhookApiError(pub WebhookError);

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let code = match &err {
            WebhookError::InvalidSignature => "INVALID_SIGNATURE",
            WebhookError::ParseError(_) => "PARSE_ERROR",
            WebhookError::MissingMetadata(_) => "MISSING_METADATA",
            WebhookError::MissingField(_) => "MISSING_FIELD",
            WebhookError::Rejected(_) => "REJECTED",
            WebhookError::Contention(_) => "CONCURRENCY_CONFLICT",
            WebhookError::Gateway(_) => "GATEWAY_ERROR",
            WebhookError::Integrity(_) => "INTEGRITY_VIOLATION",
            WebhookError::Database(_) => "DATABASE_ERROR",
        };

        if err.is_retryable() {
            tracing::error!(error = %err, "Webhook processing failed, gateway will retry");
        } else if !matches!(err, WebhookError::InvalidSignature) {
            tracing::warn!(error = %err, "Webhook rejected");
        }

        let body = ErrorResponse::new(code, err.to_string()).retryable(err.is_retryable());
        (err.status_code(), Json(body)).into_response()
    }
}
