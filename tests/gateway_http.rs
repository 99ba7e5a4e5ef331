//! Paystack HTTP adapter against a mock server.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use subscription_ledger::adapters::{PaystackConfig, PaystackGateway};
use subscription_ledger::ports::{
    CreatePlan, GatewayErrorCode, InitializeTransaction, PaymentGateway,
};

const KEY: &str = "sk_test_wiremock";

fn gateway(server: &MockServer) -> PaystackGateway {
    PaystackGateway::new(
        PaystackConfig::new(SecretString::new(KEY.to_string()))
            .with_base_url(server.uri())
            .with_timeout(Duration::from_millis(500)),
    )
    .unwrap()
}

#[tokio::test]
async fn initialize_sends_minor_units_and_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .and(header("authorization", format!("Bearer {}", KEY).as_str()))
        .and(body_partial_json(json!({
            "email": "ada@example.com",
            "amount": 5000,
            "reference": "sub_ab12cd34_1700000000",
            "metadata": { "user_id": "u-1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/0peioxfhpn",
                "access_code": "0peioxfhpn",
                "reference": "sub_ab12cd34_1700000000"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = gateway(&server)
        .initialize_transaction(InitializeTransaction {
            email: "ada@example.com".to_string(),
            amount_minor: 5000,
            currency: "NGN".to_string(),
            reference: "sub_ab12cd34_1700000000".to_string(),
            plan_code: None,
            callback_url: Some("https://app.example.com/billing/return".to_string()),
            metadata: json!({ "user_id": "u-1", "subscription_id": "t-1" }),
        })
        .await
        .unwrap();

    assert_eq!(auth.access_code, "0peioxfhpn");
    assert_eq!(auth.reference, "sub_ab12cd34_1700000000");
}

#[tokio::test]
async fn verify_decodes_transaction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/sub_ab12cd34_1700000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "id": 4099260516u64,
                "status": "success",
                "reference": "sub_ab12cd34_1700000000",
                "amount": 5000,
                "currency": "NGN",
                "paid_at": "2024-08-22T09:15:02.000Z",
                "channel": "card",
                "customer": { "customer_code": "CUS_xnxdt6s1zg1f4nx", "email": "ada@example.com" },
                "metadata": { "user_id": "u-1", "subscription_id": "t-1" }
            }
        })))
        .mount(&server)
        .await;

    let tx = gateway(&server)
        .verify_transaction("sub_ab12cd34_1700000000")
        .await
        .unwrap();

    assert!(tx.is_success());
    assert_eq!(tx.amount_minor, 5000);
    assert_eq!(tx.customer_code.as_deref(), Some("CUS_xnxdt6s1zg1f4nx"));
    assert_eq!(tx.metadata["subscription_id"], "t-1");
    assert!(tx.paid_at.is_some());
}

#[tokio::test]
async fn status_false_is_a_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/plan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": false,
            "message": "Invalid amount"
        })))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .create_plan(CreatePlan {
            name: "Pro (monthly)".to_string(),
            interval: "monthly".to_string(),
            amount_minor: 0,
            currency: "NGN".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.code, GatewayErrorCode::Rejected);
    assert!(!err.retryable);
}

#[tokio::test]
async fn server_errors_are_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/sub_x"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = gateway(&server).verify_transaction("sub_x").await.unwrap_err();

    assert_eq!(err.code, GatewayErrorCode::Provider);
    assert_eq!(err.status, Some(503));
    assert!(err.retryable);
}

#[tokio::test]
async fn slow_gateway_times_out_as_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/sub_slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({ "status": true, "message": "ok", "data": null })),
        )
        .mount(&server)
        .await;

    let err = gateway(&server).verify_transaction("sub_slow").await.unwrap_err();

    assert_eq!(err.code, GatewayErrorCode::Timeout);
    assert!(err.retryable);
}

#[tokio::test]
async fn fetch_then_disable_subscription() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscription/SUB_vsyqdmlzble3uii"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Subscription retrieved successfully",
            "data": {
                "subscription_code": "SUB_vsyqdmlzble3uii",
                "email_token": "d7gofp6yppn3qz7",
                "status": "active",
                "customer": { "customer_code": "CUS_xnxdt6s1zg1f4nx" },
                "plan": { "plan_code": "PLN_gx2wn530m0i3w3m" }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscription/disable"))
        .and(body_partial_json(json!({
            "code": "SUB_vsyqdmlzble3uii",
            "token": "d7gofp6yppn3qz7"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Subscription disabled successfully"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let remote = gateway
        .fetch_subscription("SUB_vsyqdmlzble3uii")
        .await
        .unwrap();
    assert_eq!(remote.plan_code.as_deref(), Some("PLN_gx2wn530m0i3w3m"));

    gateway
        .disable_subscription(&remote.subscription_code, remote.email_token.as_deref().unwrap())
        .await
        .unwrap();
}
