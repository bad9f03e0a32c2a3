//! Admin API access control and audit trail.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::json;

use vendora_core::{CheckoutId, Role};
use vendora_integration_tests::TestApp;
use vendora_storefront::db::ReservationRepository;
use vendora_storefront::models::HoldRequest;

#[tokio::test]
async fn test_admin_api_requires_staff_session() {
    let mut app = TestApp::new().await;
    assert_eq!(
        app.get("/api/admin/dashboard").await.status,
        StatusCode::UNAUTHORIZED
    );

    app.create_user("shopper@example.com", Role::Customer).await;
    app.login("shopper@example.com").await;
    assert_eq!(
        app.get("/api/admin/dashboard").await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_viewer_reads_but_cannot_write() {
    let mut app = TestApp::new().await;
    app.create_user("viewer@example.com", Role::Viewer).await;
    app.login("viewer@example.com").await;

    assert_eq!(app.get("/api/admin/dashboard").await.status, StatusCode::OK);
    assert_eq!(app.get("/api/admin/finance").await.status, StatusCode::OK);

    let response = app
        .post(
            "/api/admin/products",
            json!({ "title": "Mug", "sku": "MUG-1", "price": "12.00", "inStock": 3 }),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(app.get("/api/admin/settings").await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_staff_manages_stock_but_cannot_refund_or_delete() {
    let mut app = TestApp::new().await;
    let variant = app.create_variant("STAFF-1", 1_000, 4).await;
    app.create_user("staff@example.com", Role::Staff).await;
    app.login("staff@example.com").await;

    let response = app
        .put(
            &format!("/api/admin/inventory/{variant}"),
            json!({ "inStock": 9, "lowStockLevel": 2 }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(app.inventory(variant).await.in_stock, 9);

    let response = app
        .post("/api/admin/orders/1/refund", json!({ "amount": 10 }))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let products = app.get("/api/admin/products").await;
    let product_id = products.body["products"][0]["id"].as_i64().unwrap();
    let response = app.delete(&format!("/api/admin/products/{product_id}")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_stock_cannot_drop_below_held_units() {
    let mut app = TestApp::new().await;
    let variant = app.create_variant("HELD-1", 1_000, 4).await;
    ReservationRepository::new(app.pool())
        .create_reservation(
            &[HoldRequest { variant_id: variant, quantity: 3 }],
            &CheckoutId::generate(),
            Duration::from_secs(600),
        )
        .await
        .unwrap();

    app.create_user("stock@example.com", Role::Staff).await;
    app.login("stock@example.com").await;

    let response = app
        .put(&format!("/api/admin/inventory/{variant}"), json!({ "inStock": 2 }))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(app.inventory(variant).await.in_stock, 4);
}

#[tokio::test]
async fn test_admin_changes_roles_and_is_audited() {
    let mut app = TestApp::new().await;
    let admin = app.create_user("admin@example.com", Role::Admin).await;
    let customer = app.create_user("customer@example.com", Role::Customer).await;
    app.login("admin@example.com").await;

    let response = app
        .post(
            &format!("/api/admin/users/{}/role", customer.id),
            json!({ "role": "STAFF" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.body["user"]["role"], "STAFF");

    let response = app
        .post(
            &format!("/api/admin/users/{}/role", admin.id),
            json!({ "role": "VIEWER" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .post(
            &format!("/api/admin/users/{}/role", customer.id),
            json!({ "role": "OWNER" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let activity = app.get("/api/admin/activity").await;
    assert_eq!(activity.status, StatusCode::OK);
    let entries = activity.body["activity"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "CHANGE_USER_ROLE");
    assert_eq!(entries[0]["entityId"], customer.id.to_string());
    assert_eq!(entries[0]["userEmail"], "admin@example.com");
}

#[tokio::test]
async fn test_disabled_staff_lose_access_immediately() {
    let mut app = TestApp::new().await;
    app.create_user("admin@example.com", Role::Admin).await;
    let staff = app.create_user("staff@example.com", Role::Staff).await;

    app.login("staff@example.com").await;
    assert_eq!(app.get("/api/admin/dashboard").await.status, StatusCode::OK);
    let staff_session = app.take_cookie();

    app.switch_client("10.9.9.1");
    app.login("admin@example.com").await;
    let response = app
        .request(
            Method::POST,
            &format!("/api/admin/users/{}/disable", staff.id),
            Some(json!({ "reason": "Left the company" })),
            &[],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.body["user"]["disabled"], true);

    app.restore_cookie(staff_session);
    assert_eq!(
        app.get("/api/admin/dashboard").await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_settings_update_is_validated() {
    let mut app = TestApp::new().await;
    app.create_user("admin@example.com", Role::Admin).await;
    app.login("admin@example.com").await;

    let response = app
        .put(
            "/api/admin/settings",
            json!({
                "storeName": "Vendora Outlet",
                "storeLogo": "",
                "currency": "usd",
                "taxRate": 150.0,
                "lowStockThreshold": 5,
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .put(
            "/api/admin/settings",
            json!({
                "storeName": "Vendora Outlet",
                "storeLogo": "",
                "currency": "usd",
                "taxRate": 8.25,
                "lowStockThreshold": 5,
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.body["settings"]["storeName"], "Vendora Outlet");
    assert!(response.body["settings"]["storeLogo"].is_null());

    let response = app.get("/api/admin/settings").await;
    assert_eq!(response.body["settings"]["lowStockThreshold"], 5);
}
