//! Integration test harness for Vendora.
//!
//! Every test gets its own SQLite file with the storefront migrations
//! applied, and drives the real router in-process through
//! `tower::ServiceExt::oneshot`. The payment processor base URL points at
//! a closed port unless a test starts a [`StubProcessor`]. The realtime
//! publisher is unconfigured and email falls back to logging.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p vendora-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;

use vendora_core::{CurrencyCode, Price, Role, VariantId};
use vendora_storefront::config::{OAuthConfig, StorefrontConfig, StripeConfig};
use vendora_storefront::db::catalog::ProductInput;
use vendora_storefront::db::{self, CatalogRepository, InventoryRepository, MIGRATOR};
use vendora_storefront::models::{InventoryLevel, User};
use vendora_storefront::services::auth::AuthService;
use vendora_storefront::state::AppState;

/// Webhook signing secret used by [`test_config`].
pub const WEBHOOK_SECRET: &str = "whsec_integration_test_secret";

/// Password given to accounts created by [`TestApp::create_user`].
pub const PASSWORD: &str = "correct-horse-battery";

/// Processor address that refuses connections.
const CLOSED_PROCESSOR: &str = "http://127.0.0.1:1";

/// A throwaway SQLite database.
pub struct TestDb {
    pub pool: SqlitePool,
    path: PathBuf,
}

impl TestDb {
    /// Create a fresh database file and run the migrations.
    pub async fn new() -> Self {
        let path = std::env::temp_dir().join(format!("vendora-test-{}.db", uuid::Uuid::new_v4()));
        let pool = db::create_pool(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();
        MIGRATOR.run(&pool).await.unwrap();
        Self { pool, path }
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// Configuration for in-process tests. Nothing outbound is reachable.
#[must_use]
pub fn test_config(database_url: &str) -> StorefrontConfig {
    StorefrontConfig {
        database_url: database_url.to_owned(),
        host: [127, 0, 0, 1].into(),
        port: 0,
        base_url: "http://localhost:3000".to_owned(),
        session_secret: SecretString::from("x".repeat(64)),
        reservation_ttl: Duration::from_secs(900),
        sweep_interval: Duration::from_secs(60),
        admin_emails: Vec::new(),
        stripe: StripeConfig {
            secret_key: SecretString::from("sk_test_integration".to_owned()),
            publishable_key: "pk_test_integration".to_owned(),
            webhook_secret: SecretString::from(WEBHOOK_SECRET.to_owned()),
            api_base: CLOSED_PROCESSOR.to_owned(),
        },
        ably: None,
        oauth: OAuthConfig::default(),
        email: None,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// The application under test plus a cookie jar of one.
pub struct TestApp {
    pub db: TestDb,
    pub state: AppState,
    router: Router,
    cookie: Option<String>,
    client_ip: String,
}

/// A decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
    pub text: String,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_processor(CLOSED_PROCESSOR).await
    }

    /// Like [`TestApp::new`], with the payment processor at `api_base`.
    pub async fn with_processor(api_base: &str) -> Self {
        let db = TestDb::new().await;
        let mut config = test_config(&format!("sqlite://{}", db.path.display()));
        api_base.clone_into(&mut config.stripe.api_base);
        let state = AppState::new(config, db.pool.clone()).unwrap();
        let router = vendora_storefront::app(state.clone()).await.unwrap();
        Self {
            db,
            state,
            router,
            cookie: None,
            client_ip: format!("10.0.0.{}", rand_octet()),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.db.pool
    }

    /// Act as a different client: new address, empty cookie jar.
    pub fn switch_client(&mut self, ip: &str) {
        self.client_ip = ip.to_owned();
        self.cookie = None;
    }

    /// Hand the current session cookie to the caller, leaving the jar empty.
    pub fn take_cookie(&mut self) -> Option<String> {
        self.cookie.take()
    }

    pub fn restore_cookie(&mut self, cookie: Option<String>) {
        self.cookie = cookie;
    }

    pub async fn request(
        &mut self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        extra_headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut headers = extra_headers.to_vec();
        if body.is_some() {
            headers.push(("content-type", "application/json"));
        }
        self.send(method, uri, body.map(|b| b.to_string()), &headers)
            .await
    }

    /// Send a raw body, for endpoints that verify the exact bytes.
    pub async fn send(
        &mut self,
        method: Method,
        uri: &str,
        body: Option<String>,
        extra_headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", &self.client_ip);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(body.map_or_else(Body::empty, Body::from))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();

        if let Some(set_cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            && let Some(pair) = set_cookie.split(';').next()
        {
            self.cookie = Some(pair.to_owned());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }

    /// Deliver a signed webhook.
    pub async fn webhook(&mut self, payload: String, signature: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/api/stripe/webhook",
            Some(payload),
            &[("stripe-signature", signature)],
        )
        .await
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None, &[]).await
    }

    pub async fn post(&mut self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body), &[]).await
    }

    pub async fn put(&mut self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(body), &[]).await
    }

    pub async fn delete(&mut self, uri: &str) -> TestResponse {
        self.request(Method::DELETE, uri, None, &[]).await
    }

    /// Create a verified account with [`PASSWORD`].
    pub async fn create_user(&self, email: &str, role: Role) -> User {
        AuthService::new(self.pool(), &[])
            .create_user("Test User", email, PASSWORD, role)
            .await
            .unwrap()
    }

    /// Sign in through the API, keeping the session cookie.
    pub async fn login(&mut self, email: &str) {
        let response = self
            .post(
                "/api/auth/login",
                serde_json::json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.text);
    }

    /// Create a product with one variant and return the variant id.
    pub async fn create_variant(&self, sku: &str, price_cents: i64, in_stock: i64) -> VariantId {
        let product = CatalogRepository::new(self.pool())
            .create_product(&ProductInput {
                title: format!("Product {sku}"),
                description: None,
                image: None,
                category_id: None,
                sku: sku.to_owned(),
                price: Price::from_cents(price_cents, CurrencyCode::Usd),
                in_stock,
                low_stock_level: None,
            })
            .await
            .unwrap();
        product.variants.first().unwrap().id
    }

    pub async fn inventory(&self, variant_id: VariantId) -> InventoryLevel {
        InventoryRepository::new(self.pool())
            .get(variant_id)
            .await
            .unwrap()
            .unwrap()
    }
}

fn rand_octet() -> u8 {
    uuid::Uuid::new_v4().as_bytes().first().copied().unwrap_or(1)
}

/// A signed `payment_intent.*` webhook body and its signature header.
#[must_use]
pub fn payment_webhook(
    kind: &str,
    payment_intent_id: &str,
    amount: i64,
    metadata: &Value,
) -> (String, String) {
    let status = match kind {
        "payment_intent.succeeded" => "succeeded",
        "payment_intent.canceled" => "canceled",
        _ => "requires_payment_method",
    };
    let payload = serde_json::json!({
        "id": format!("evt_{}", uuid::Uuid::new_v4().simple()),
        "type": kind,
        "data": {
            "object": {
                "id": payment_intent_id,
                "object": "payment_intent",
                "amount": amount,
                "currency": "usd",
                "status": status,
                "client_secret": null,
                "metadata": metadata,
            }
        }
    })
    .to_string();
    let signature = vendora_storefront::services::stripe::webhook::sign(
        &payload,
        WEBHOOK_SECRET,
        vendora_storefront::db::unix_now(),
    );
    (payload, signature)
}

/// A local stand-in for the payment processor.
///
/// Every intent creation answers with `intent`; cancellations are counted
/// and answered with the same intent marked `canceled`.
pub struct StubProcessor {
    pub base_url: String,
    cancels: Arc<AtomicUsize>,
    server: tokio::task::JoinHandle<()>,
}

impl StubProcessor {
    pub async fn spawn(intent: Value) -> Self {
        let cancels = Arc::new(AtomicUsize::new(0));
        let mut canceled = intent.clone();
        canceled["status"] = Value::from("canceled");

        let counter = Arc::clone(&cancels);
        let router = Router::new()
            .route(
                "/v1/payment_intents",
                post(move || {
                    let intent = intent.clone();
                    async move { Json(intent) }
                }),
            )
            .route(
                "/v1/payment_intents/{id}/cancel",
                post(move || {
                    let canceled = canceled.clone();
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Json(canceled)
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self {
            base_url,
            cancels,
            server,
        }
    }

    #[must_use]
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl Drop for StubProcessor {
    fn drop(&mut self) {
        self.server.abort();
    }
}
