//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, confirm_payment, current_subscription, downgrade,
    handle_paystack_webhook, health, initiate_payment, list_invoices, run_sweep, start_trial,
    upgrade, BillingAppState,
};

/// User-facing billing routes, mounted at `/billing`.
///
/// All of them require `X-User-Id` except `/admin/sweep`, which takes the
/// admin token instead.
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/payments/initiate", post(initiate_payment))
        .route("/payments/:reference/confirm", get(confirm_payment))
        .route("/subscriptions/trial", post(start_trial))
        .route("/subscriptions/upgrade", post(upgrade))
        .route("/subscriptions/downgrade", post(downgrade))
        .route("/subscriptions/cancel", post(cancel_subscription))
        .route("/subscriptions/current", get(current_subscription))
        .route("/invoices", get(list_invoices))
        .route("/admin/sweep", post(run_sweep))
}

/// Gateway webhooks, mounted at `/webhooks`. Verified by signature, not by
/// user identity.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/paystack", post(handle_paystack_webhook))
}

/// Complete service router: `/api/billing`, `/api/webhooks` and `/health`.
pub fn billing_router(state: BillingAppState) -> Router {
    let api = Router::new()
        .nest("/billing", billing_routes())
        .nest("/webhooks", webhook_routes());

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::adapters::http::billing::{BillingPorts, HttpPolicy};
    use crate::adapters::{
        InMemoryBillingStore, InMemoryPlanCodeCache, MockPaymentGateway, TracingNotifier,
    };
    use crate::domain::billing::{
        test_tier, BillingType, WebhookSignatureVerifier, SIGNATURE_HEADER,
    };
    use crate::domain::foundation::UserId;

    const SECRET: &str = "sk_test_router";

    struct Harness {
        store: InMemoryBillingStore,
        gateway: MockPaymentGateway,
        router: Router,
    }

    fn harness(policy: HttpPolicy) -> Harness {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let ports = BillingPorts {
            users: Arc::new(store.clone()),
            tiers: Arc::new(store.clone()),
            bindings: Arc::new(store.clone()),
            subscriptions: Arc::new(store.clone()),
            settlements: Arc::new(store.clone()),
            plan_cache: Arc::new(InMemoryPlanCodeCache::new()),
            gateway: Arc::new(gateway.clone()),
            notifier: Arc::new(TracingNotifier),
        };
        let secret = SecretString::new(SECRET.to_string());
        let state = BillingAppState::new(ports, secret, 100, policy);
        Harness {
            store,
            gateway,
            router: billing_router(state),
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, user: Option<UserId>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_as(uri: &str, user: UserId) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-user-id", user.to_string())
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let h = harness(HttpPolicy::default());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&h.router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn billing_routes_require_user_header() {
        let h = harness(HttpPolicy::default());
        let req = Request::builder()
            .uri("/api/billing/subscriptions/current")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.router, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "AUTHENTICATION_REQUIRED");
    }

    #[tokio::test]
    async fn initiate_returns_authorization() {
        let h = harness(HttpPolicy {
            default_callback_url: Some("https://app.example.com/billing/return".to_string()),
            ..Default::default()
        });
        let user = h.store.add_user("ada@example.com").await;
        let tier = test_tier(Decimal::new(5000, 2), BillingType::Lifetime);
        h.store.add_tier(tier.clone()).await;

        let (status, body) = send(
            &h.router,
            post_json(
                "/api/billing/payments/initiate",
                Some(user),
                json!({ "tier_id": tier.id }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert!(body["reference"].as_str().unwrap().starts_with("sub_"));
        assert!(body["authorization_url"].is_string());
    }

    #[tokio::test]
    async fn initiate_for_unknown_tier_is_not_found() {
        let h = harness(HttpPolicy::default());
        let user = h.store.add_user("ada@example.com").await;

        let (status, body) = send(
            &h.router,
            post_json(
                "/api/billing/payments/initiate",
                Some(user),
                json!({
                    "tier_id": uuid::Uuid::new_v4(),
                    "callback_url": "https://app.example.com/cb",
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "TIER_NOT_FOUND");
    }

    #[tokio::test]
    async fn current_subscription_is_null_without_one() {
        let h = harness(HttpPolicy::default());
        let user = h.store.add_user("ada@example.com").await;

        let (status, body) =
            send(&h.router, get_as("/api/billing/subscriptions/current", user)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["subscription"].is_null());
    }

    #[tokio::test]
    async fn trial_then_current() {
        let h = harness(HttpPolicy::default());
        let user = h.store.add_user("ada@example.com").await;
        let mut tier = test_tier(Decimal::new(5000, 2), BillingType::Monthly);
        tier.trial_days = 14;
        h.store.add_tier(tier.clone()).await;

        let (status, body) = send(
            &h.router,
            post_json(
                "/api/billing/subscriptions/trial",
                Some(user),
                json!({ "tier_id": tier.id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "trialing");

        let (status, body) = send(
            &h.router,
            post_json(
                "/api/billing/subscriptions/trial",
                Some(user),
                json!({ "tier_id": tier.id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["retryable"], false);

        let (_, body) = send(&h.router, get_as("/api/billing/subscriptions/current", user)).await;
        assert_eq!(body["subscription"]["status"], "trialing");
        assert_eq!(body["tier"]["name"], "Pro");
    }

    #[tokio::test]
    async fn invoices_paginate() {
        let h = harness(HttpPolicy::default());
        let user = h.store.add_user("ada@example.com").await;

        let (status, body) =
            send(&h.router, get_as("/api/billing/invoices?page=2&limit=5", user)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], 2);
        assert_eq!(body["limit"], 5);
        assert_eq!(body["total"], 0);
        assert_eq!(body["items"], json!([]));
    }

    #[tokio::test]
    async fn webhook_rejects_bad_signature() {
        let h = harness(HttpPolicy::default());
        let req = Request::builder()
            .method("POST")
            .uri("/api/webhooks/paystack")
            .header(SIGNATURE_HEADER, "00ff")
            .body(Body::from(r#"{"event":"charge.success","data":{}}"#))
            .unwrap();

        let (status, body) = send(&h.router, req).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_SIGNATURE");
    }

    #[tokio::test]
    async fn webhook_bad_signature_can_be_acknowledged() {
        let h = harness(HttpPolicy {
            acknowledge_invalid_signatures: true,
            ..Default::default()
        });
        let req = Request::builder()
            .method("POST")
            .uri("/api/webhooks/paystack")
            .body(Body::from(r#"{"event":"charge.success","data":{}}"#))
            .unwrap();

        let (status, body) = send(&h.router, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], false);
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn webhook_ignores_unknown_events() {
        let h = harness(HttpPolicy::default());
        let payload = r#"{"event":"transfer.success","data":{"reference":"trf_1"}}"#;
        let signature = WebhookSignatureVerifier::new(SecretString::new(SECRET.to_string()))
            .sign(payload.as_bytes());
        let req = Request::builder()
            .method("POST")
            .uri("/api/webhooks/paystack")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(payload))
            .unwrap();

        let (status, body) = send(&h.router, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "ignored");
    }

    #[tokio::test]
    async fn sweep_requires_admin_token() {
        let h = harness(HttpPolicy {
            admin_token: Some("s3cret".to_string()),
            ..Default::default()
        });

        let denied = Request::builder()
            .method("POST")
            .uri("/api/billing/admin/sweep")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&h.router, denied).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let allowed = Request::builder()
            .method("POST")
            .uri("/api/billing/admin/sweep")
            .header("x-admin-token", "s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.router, allowed).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["expired"], 0);
    }
}
