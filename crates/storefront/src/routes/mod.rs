//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                               - Liveness
//! GET  /health/ready                         - Readiness (database)
//! GET  /api/health/db                        - Database check as JSON
//!
//! # Catalog
//! GET  /api/products                         - Active products
//! GET  /api/products/search                  - Filtered search
//! GET  /api/products/{slug}                  - Product detail with reviews
//! GET  /api/categories                       - Categories
//! POST /api/cart/quote                       - Price a cart against live stock
//!
//! # Checkout
//! POST /api/checkout/create-payment-intent   - Reserve stock, create payment intent
//! POST /api/stripe/webhook                   - Payment processor events
//! GET  /api/orders                           - Signed-in customer's orders
//! POST /api/orders                           - Client-side order confirmation
//! GET  /api/ably/auth                        - Realtime token request
//!
//! # Reviews
//! GET  /api/reviews?productId=               - Reviews and rating summary
//! POST /api/reviews                          - Review a product (auth)
//! DELETE /api/reviews/{id}                   - Delete a review (author or staff)
//!
//! # Auth
//! POST /api/auth/register | login | logout
//! GET  /api/auth/me
//! POST /api/auth/verify-email | resend-verification
//! POST /api/auth/forgot-password | reset-password
//! GET  /auth/oauth/{provider}/login          - Redirect to provider
//! GET  /auth/oauth/{provider}/callback       - Provider callback
//!
//! # Admin
//! /api/admin/...                             - See `admin::routes`
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod oauth;
pub mod orders;
pub mod products;
pub mod realtime;
pub mod reviews;
pub mod webhooks;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Credential endpoints, behind the strict per-IP limiter.
fn credential_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .layer(auth_rate_limiter())
}

/// Create the `/api/auth` router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/verify-email", post(auth::verify_email))
        .merge(credential_routes())
}

/// Endpoints that create payment intents or orders.
fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/checkout/create-payment-intent",
            post(checkout::create_payment_intent),
        )
        .route("/orders", get(orders::index).post(orders::create))
        .layer(api_rate_limiter())
}

/// Create the public JSON API router (mounted at `/api`).
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health/db", get(health::database))
        .route("/products", get(products::index))
        .route("/products/search", get(products::search))
        .route("/products/{slug}", get(products::show))
        .route("/categories", get(products::categories))
        .route("/cart/quote", post(cart::quote))
        .route("/stripe/webhook", post(webhooks::stripe))
        .route("/reviews", get(reviews::index).post(reviews::create))
        .route("/reviews/{id}", delete(reviews::delete))
        .route("/ably/auth", get(realtime::token))
        .merge(checkout_routes())
        .nest("/auth", auth_routes())
        .nest("/admin", admin::routes())
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/auth/oauth/{provider}/login", get(oauth::login))
        .route("/auth/oauth/{provider}/callback", get(oauth::callback))
        .nest("/api", api_routes())
}
