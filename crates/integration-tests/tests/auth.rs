//! Password sign-in flows through the router.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use vendora_core::Role;
use vendora_integration_tests::{PASSWORD, TestApp};

#[tokio::test]
async fn test_register_signs_in_as_customer() {
    let mut app = TestApp::new().await;

    let response = app
        .post(
            "/api/auth/register",
            json!({ "name": "Ada", "email": "Ada@Example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
    assert!(response.headers.contains_key("set-cookie"));

    let me = app.get("/api/auth/me").await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["user"]["email"], "ada@example.com");
    assert_eq!(me.body["user"]["role"], "CUSTOMER");
    assert_eq!(me.body["user"]["emailVerified"], false);
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_weak_passwords() {
    let mut app = TestApp::new().await;
    app.create_user("taken@example.com", Role::Customer).await;

    let response = app
        .post(
            "/api/auth/register",
            json!({ "name": "Bob", "email": "taken@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = app
        .post(
            "/api/auth/register",
            json!({ "name": "Bob", "email": "bob@example.com", "password": "short" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_logout_cycle() {
    let mut app = TestApp::new().await;
    app.create_user("member@example.com", Role::Customer).await;

    let response = app
        .post(
            "/api/auth/login",
            json!({ "email": "member@example.com", "password": "not-the-password" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    app.login("member@example.com").await;
    assert_eq!(app.get("/api/auth/me").await.status, StatusCode::OK);

    let response = app.post("/api/auth/logout", json!({})).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.get("/api/auth/me").await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_email_gets_same_answer_as_wrong_password() {
    let mut app = TestApp::new().await;
    let response = app
        .post(
            "/api/auth/login",
            json!({ "email": "ghost@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_disabled_account_cannot_sign_in() {
    let mut app = TestApp::new().await;
    let user = app.create_user("banned@example.com", Role::Customer).await;
    vendora_storefront::db::UserRepository::new(app.pool())
        .disable(user.id, Some("Chargebacks"))
        .await
        .unwrap();

    let response = app
        .post(
            "/api/auth/login",
            json!({ "email": "banned@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_attempts_are_rate_limited_per_client() {
    let mut app = TestApp::new().await;
    let mut statuses = Vec::new();
    for _ in 0..8 {
        let response = app
            .post(
                "/api/auth/login",
                json!({ "email": "nobody@example.com", "password": "wrong-password" }),
            )
            .await;
        statuses.push(response.status);
    }
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));

    app.switch_client("10.200.0.1");
    let response = app
        .post(
            "/api/auth/login",
            json!({ "email": "nobody@example.com", "password": "wrong-password" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let mut app = TestApp::new().await;
    app.create_user("forgetful@example.com", Role::Customer).await;

    let response = app
        .post("/api/auth/forgot-password", json!({ "email": "nobody@example.com" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let (_, token) = app
        .state
        .auth()
        .request_password_reset("forgetful@example.com")
        .await
        .unwrap()
        .unwrap();

    let new_password = "a-brand-new-passphrase";
    let response = app
        .post(
            "/api/auth/reset-password",
            json!({ "token": token, "password": new_password }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);

    let response = app
        .post(
            "/api/auth/reset-password",
            json!({ "token": token, "password": "yet-another-passphrase" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    app.switch_client("10.201.0.1");
    let response = app
        .post(
            "/api/auth/login",
            json!({ "email": "forgetful@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app
        .post(
            "/api/auth/login",
            json!({ "email": "forgetful@example.com", "password": new_password }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_email_verification() {
    let mut app = TestApp::new().await;
    let response = app
        .post(
            "/api/auth/register",
            json!({ "name": "Vera", "email": "vera@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let user = vendora_storefront::db::UserRepository::new(app.pool())
        .get_by_email(&vendora_core::Email::parse("vera@example.com").unwrap())
        .await
        .unwrap()
        .unwrap();
    let token = app.state.auth().issue_verification_token(&user).await.unwrap();

    let response = app
        .post("/api/auth/verify-email", json!({ "token": token }))
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(app.get("/api/auth/me").await.body["user"]["emailVerified"], true);

    let response = app
        .post("/api/auth/verify-email", json!({ "token": "bogus" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
