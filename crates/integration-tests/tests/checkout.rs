//! Public catalog and checkout endpoints.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use vendora_core::ReservationStatus;
use vendora_integration_tests::{StubProcessor, TestApp};
use vendora_storefront::db::ReservationRepository;

#[tokio::test]
async fn test_health_endpoints() {
    let mut app = TestApp::new().await;

    let response = app.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text, "ok");

    assert_eq!(app.get("/health/ready").await.status, StatusCode::OK);

    let response = app.get("/api/health/db").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["ok"], true);
}

#[tokio::test]
async fn test_responses_carry_request_id_and_security_headers() {
    let mut app = TestApp::new().await;
    let response = app
        .request(axum::http::Method::GET, "/health", None, &[("x-request-id", "req-123")])
        .await;
    assert_eq!(response.headers["x-request-id"], "req-123");
    assert_eq!(response.headers["x-content-type-options"], "nosniff");
    assert_eq!(response.headers["x-frame-options"], "DENY");
}

#[tokio::test]
async fn test_product_listing_and_detail() {
    let mut app = TestApp::new().await;
    app.create_variant("LIST-1", 1_250, 8).await;

    let response = app.get("/api/products").await;
    assert_eq!(response.status, StatusCode::OK);
    let products = response.body["products"].as_array().unwrap();
    assert_eq!(products.len(), 1);
    let slug = products[0]["slug"].as_str().unwrap().to_owned();

    let response = app.get(&format!("/api/products/{slug}")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["title"], "Product LIST-1");

    assert_eq!(
        app.get("/api/products/no-such-product").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_cart_quote_uses_server_prices() {
    let mut app = TestApp::new().await;
    let variant = app.create_variant("QUOTE-1", 999, 2).await;

    let response = app
        .post(
            "/api/cart/quote",
            json!({ "items": [{ "variantId": variant, "quantity": 5 }] }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.body["total"]["amountCents"], 1_998);
}

#[tokio::test]
async fn test_checkout_rejects_empty_cart_and_short_stock() {
    let mut app = TestApp::new().await;
    let variant = app.create_variant("SHORT-1", 500, 1).await;

    let response = app
        .post("/api/checkout/create-payment-intent", json!({ "items": [] }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .post(
            "/api/checkout/create-payment-intent",
            json!({ "items": [{ "variantId": variant, "quantity": 2 }] }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["error"], "INSUFFICIENT_STOCK");
    assert_eq!(app.inventory(variant).await.reserved, 0);
}

#[tokio::test]
async fn test_processor_failure_releases_holds() {
    let mut app = TestApp::new().await;
    let variant = app.create_variant("PROC-1", 500, 3).await;

    let response = app
        .post(
            "/api/checkout/create-payment-intent",
            json!({
                "items": [{ "variantId": variant, "quantity": 2 }],
                "email": "buyer@example.com",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);

    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (3, 0));

    let holds = ReservationRepository::new(app.pool())
        .list(None, 10)
        .await
        .unwrap();
    assert_eq!(holds.len(), 1);
    assert_eq!(holds[0].status, ReservationStatus::Released);
}

#[tokio::test]
async fn test_realtime_token_unavailable_without_key() {
    let mut app = TestApp::new().await;
    assert_eq!(
        app.get("/api/ably/auth").await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_intent_without_client_secret_releases_holds_and_cancels() {
    let processor = StubProcessor::spawn(json!({
        "id": "pi_no_secret",
        "object": "payment_intent",
        "amount": 1_000,
        "currency": "usd",
        "status": "requires_payment_method",
        "client_secret": null,
        "metadata": {},
    }))
    .await;
    let mut app = TestApp::with_processor(&processor.base_url).await;
    let variant = app.create_variant("NOSECRET-1", 500, 4).await;

    let response = app
        .post(
            "/api/checkout/create-payment-intent",
            json!({
                "items": [{ "variantId": variant, "quantity": 2 }],
                "email": "buyer@example.com",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);

    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (4, 0));

    let holds = ReservationRepository::new(app.pool())
        .list(None, 10)
        .await
        .unwrap();
    assert_eq!(holds.len(), 1);
    assert_eq!(holds[0].status, ReservationStatus::Released);
    assert_eq!(processor.cancel_count(), 1);
}

#[tokio::test]
async fn test_checkout_returns_client_secret_and_keeps_holds() {
    let processor = StubProcessor::spawn(json!({
        "id": "pi_ok",
        "object": "payment_intent",
        "amount": 1_000,
        "currency": "usd",
        "status": "requires_payment_method",
        "client_secret": "pi_ok_secret_123",
        "metadata": {},
    }))
    .await;
    let mut app = TestApp::with_processor(&processor.base_url).await;
    let variant = app.create_variant("OK-1", 500, 4).await;

    let response = app
        .post(
            "/api/checkout/create-payment-intent",
            json!({ "items": [{ "variantId": variant, "quantity": 2 }] }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.body["clientSecret"], "pi_ok_secret_123");
    assert_eq!(response.body["paymentIntentId"], "pi_ok");

    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (4, 2));
    assert_eq!(processor.cancel_count(), 0);
}
