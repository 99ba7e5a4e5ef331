//! End-to-end gateway webhook flows.

mod common;

use rust_decimal::Decimal;
use serde_json::json;

use subscription_ledger::application::{CancelSubscriptionCommand, WebhookOutcome};
use subscription_ledger::domain::billing::{
    BillingType, PaymentDetails, SubscriptionStatus, UserSubscription, WebhookError,
};
use subscription_ledger::domain::foundation::Timestamp;
use subscription_ledger::ports::RemoteSubscription;

use common::{charge_success, metadata, tier, TestApp};

#[tokio::test]
async fn duplicate_charge_success_settles_once() {
    let app = TestApp::new();
    let user = app.store.add_user("ada@example.com").await;
    let monthly = tier(5000, BillingType::Monthly);
    app.store.add_tier(monthly.clone()).await;
    let reference = "sub_ab12cd34_1700000000";
    app.gateway.succeed(reference, 5000, metadata(user, monthly.id));
    let body = charge_success(reference, 5000, metadata(user, monthly.id));

    let before = Timestamp::now();
    let first = app.state.webhook.handle(app.signed(&body)).await.unwrap();
    let after = Timestamp::now();
    let second = app.state.webhook.handle(app.signed(&body)).await.unwrap();

    assert!(matches!(first, WebhookOutcome::Settled { .. }));
    assert_eq!(second, WebhookOutcome::AlreadySettled);

    let subscriptions = app.store.subscriptions_for(&user).await;
    assert_eq!(subscriptions.len(), 1);
    let sub = &subscriptions[0];
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.is_active);
    assert_eq!(sub.amount_paid, Some(Decimal::new(5000, 2)));
    assert_eq!(sub.amount_paid.unwrap().to_string(), "50.00");
    assert!(!sub.current_period_end.is_before(&before.add_days(30)));
    assert!(!sub.current_period_end.is_after(&after.add_days(30)));

    let settlements = app.store.settlements_for_reference(reference).await;
    assert_eq!(settlements.len(), 1);
    assert_eq!(settlements[0].amount, Decimal::new(5000, 2));
    assert!(app.store.is_premium(&user).await);
}

#[tokio::test]
async fn charge_success_trusts_the_gateway_not_the_body() {
    let app = TestApp::new();
    let user = app.store.add_user("ada@example.com").await;
    let monthly = tier(5000, BillingType::Monthly);
    app.store.add_tier(monthly.clone()).await;
    let reference = "sub_deadbeef_1700000000";
    // Gateway says 10.00 although the body claims 50.00.
    app.gateway.succeed(reference, 1000, metadata(user, monthly.id));
    let body = charge_success(reference, 5000, metadata(user, monthly.id));

    let err = app.state.webhook.handle(app.signed(&body)).await.unwrap_err();

    assert!(matches!(err, WebhookError::Rejected(_)));
    assert!(!err.is_retryable());
    assert!(app.store.subscriptions_for(&user).await.is_empty());
}

#[tokio::test]
async fn cancel_then_late_disable_is_harmless() {
    let app = TestApp::new();
    let user = app.store.add_user("ada@example.com").await;
    let monthly = tier(5000, BillingType::Monthly);
    app.store.add_tier(monthly.clone()).await;

    let now = Timestamp::now();
    let mut sub = UserSubscription::from_payment(
        user,
        &monthly,
        &PaymentDetails {
            reference: "sub_cafebabe_1700000000".to_string(),
            amount: Decimal::new(5000, 2),
            customer_code: Some("CUS_ada".to_string()),
            paid_at: now,
        },
        now,
    );
    sub.bind_remote("SUB_ada", Some("CUS_ada".to_string()), now);
    app.store.insert_subscription(sub.clone()).await;
    app.gateway.set_subscription(RemoteSubscription {
        subscription_code: "SUB_ada".to_string(),
        email_token: Some("tok_ada".to_string()),
        status: "active".to_string(),
        customer_code: Some("CUS_ada".to_string()),
        plan_code: Some("PLN_0001".to_string()),
        next_payment_date: None,
    });

    let cancelled = app
        .state
        .lifecycle
        .cancel(CancelSubscriptionCommand {
            user_id: user,
            at_period_end: false,
        })
        .await
        .unwrap();
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);

    let late = json!({
        "event": "subscription.disable",
        "data": {
            "subscription_code": "SUB_ada",
            "status": "complete",
            "customer": { "customer_code": "CUS_ada" }
        }
    });
    let outcome = app.state.webhook.handle(app.signed(&late)).await.unwrap();

    assert_eq!(outcome, WebhookOutcome::Acknowledged);
    let row = app.store.subscription(&sub.id).await.unwrap();
    assert_eq!(row.status, SubscriptionStatus::Cancelled);
    assert!(!app.store.is_premium(&user).await);
}

#[tokio::test]
async fn failed_then_paid_invoice_recovers() {
    let app = TestApp::new();
    let user = app.store.add_user("ada@example.com").await;
    let monthly = tier(5000, BillingType::Monthly);
    app.store.add_tier(monthly.clone()).await;
    let now = Timestamp::now();
    let mut sub = UserSubscription::from_payment(
        user,
        &monthly,
        &PaymentDetails {
            reference: "sub_facefeed_1700000000".to_string(),
            amount: Decimal::new(5000, 2),
            customer_code: Some("CUS_ada".to_string()),
            paid_at: now.add_days(-30),
        },
        now.add_days(-30),
    );
    sub.bind_remote("SUB_ada", None, now);
    app.store.insert_subscription(sub.clone()).await;

    let failed = json!({
        "event": "invoice.payment_failed",
        "data": { "subscription": { "subscription_code": "SUB_ada" }, "paid": false }
    });
    let outcome = app.state.webhook.handle(app.signed(&failed)).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::MarkedPastDue { .. }));
    assert!(app.store.is_premium(&user).await);

    let paid = json!({
        "event": "invoice.update",
        "data": { "subscription": { "subscription_code": "SUB_ada" }, "paid": true }
    });
    let outcome = app.state.webhook.handle(app.signed(&paid)).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::Recovered { .. }));

    let row = app.store.subscription(&sub.id).await.unwrap();
    assert_eq!(row.status, SubscriptionStatus::Active);
    assert!(row.current_period_end.is_after(&now.add_days(29)));
}

#[tokio::test]
async fn unknown_events_are_ignored() {
    let app = TestApp::new();
    let body = json!({ "event": "transfer.success", "data": { "reference": "trf_1" } });

    let outcome = app.state.webhook.handle(app.signed(&body)).await.unwrap();

    assert_eq!(outcome, WebhookOutcome::Ignored);
    assert!(app.gateway.calls().is_empty());
}

#[tokio::test]
async fn tampered_body_fails_verification() {
    let app = TestApp::new();
    let body = charge_success("sub_ab12cd34_1700000000", 5000, json!({}));
    let mut cmd = app.signed(&body);
    let last = cmd.payload.len() - 2;
    cmd.payload[last] ^= 0x01;

    let err = app.state.webhook.handle(cmd).await.unwrap_err();

    assert!(matches!(err, WebhookError::InvalidSignature));
    assert_eq!(err.status_code().as_u16(), 401);
    assert!(app.gateway.calls().is_empty());
}

#[tokio::test]
async fn missing_signature_fails_verification() {
    let app = TestApp::new();
    let mut cmd = app.signed(&json!({ "event": "charge.success", "data": {} }));
    cmd.signature = None;

    let err = app.state.webhook.handle(cmd).await.unwrap_err();

    assert!(matches!(err, WebhookError::InvalidSignature));
}
