//! Payment webhook verification through the router.

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode};
use serde_json::json;

use vendora_integration_tests::{TestApp, payment_webhook};
use vendora_storefront::db::unix_now;
use vendora_storefront::services::stripe::webhook::sign;

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let mut app = TestApp::new().await;
    let (payload, _) = payment_webhook("payment_intent.succeeded", "pi_x", 100, &json!({}));
    let response = app
        .send(Method::POST, "/api/stripe/webhook", Some(payload), &[])
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tampered_payload_is_rejected() {
    let mut app = TestApp::new().await;
    let (payload, signature) = payment_webhook("payment_intent.succeeded", "pi_x", 100, &json!({}));
    let tampered = payload.replace("\"amount\":100", "\"amount\":1");
    let response = app.webhook(tampered, &signature).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wrong_secret_and_stale_timestamp_are_rejected() {
    let mut app = TestApp::new().await;
    let (payload, _) = payment_webhook("payment_intent.succeeded", "pi_x", 100, &json!({}));

    let forged = sign(&payload, "whsec_someone_else", unix_now());
    assert_eq!(app.webhook(payload.clone(), &forged).await.status, StatusCode::BAD_REQUEST);

    let stale = sign(&payload, vendora_integration_tests::WEBHOOK_SECRET, unix_now() - 3_600);
    assert_eq!(app.webhook(payload, &stale).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unhandled_event_types_are_acknowledged() {
    let mut app = TestApp::new().await;
    let payload = json!({
        "id": "evt_other",
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } }
    })
    .to_string();
    let signature = sign(&payload, vendora_integration_tests::WEBHOOK_SECRET, unix_now());

    let response = app.webhook(payload, &signature).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["received"], true);
}
