//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Responses are JSON: `{"error": <message>}`, plus `variantId` and
//! `available` for stock shortfalls.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::db::{RepositoryError, ReservationError};
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::checkout::CheckoutError;
use crate::services::payments::PaymentError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Signed in, but the role lacks the permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// An optional integration is not configured.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        Self::Checkout(CheckoutError::Reservation(err))
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session: {err}"))
    }
}

impl AppError {
    /// Whether the error is the server's fault and worth reporting.
    fn is_server_error(&self) -> bool {
        match self {
            Self::Database(err) => !matches!(err, RepositoryError::NotFound | RepositoryError::Conflict(_)),
            Self::Auth(err) => matches!(
                err,
                AuthError::Repository(_) | AuthError::PasswordHash | AuthError::OAuth(_)
            ),
            Self::Checkout(err) => matches!(
                err,
                CheckoutError::Payment(_)
                    | CheckoutError::MissingClientSecret
                    | CheckoutError::Repository(_)
                    | CheckoutError::Cart(CartError::Repository(_))
                    | CheckoutError::Reservation(ReservationError::Repository(_))
            ),
            Self::Cart(err) => matches!(err, CartError::Repository(_)),
            Self::Payment(err) => matches!(
                err,
                PaymentError::Stripe(_) | PaymentError::Repository(_) | PaymentError::Currency(_)
            ),
            Self::Internal(_) => true,
            _ => false,
        }
    }

    fn status_and_body(&self) -> (StatusCode, Value) {
        match self {
            Self::Database(err) => repository_response(err),
            Self::Auth(err) => auth_response(err),
            Self::Cart(err) => cart_response(err),
            Self::Checkout(err) => match err {
                CheckoutError::Cart(err) => cart_response(err),
                CheckoutError::CurrencyMismatch { .. } => plain(StatusCode::BAD_REQUEST, &err.to_string()),
                CheckoutError::Reservation(err) => reservation_response(err),
                CheckoutError::Payment(_) | CheckoutError::MissingClientSecret => {
                    plain(StatusCode::BAD_GATEWAY, "Payment processor error")
                }
                CheckoutError::Repository(err) => repository_response(err),
            },
            Self::Payment(err) => match err {
                PaymentError::NotSucceeded(_) => plain(StatusCode::PAYMENT_REQUIRED, "Payment has not succeeded"),
                PaymentError::NoLines(_)
                | PaymentError::MissingEmail(_)
                | PaymentError::UnknownVariant(_)
                | PaymentError::NotRefundable
                | PaymentError::InvalidRefundAmount { .. } => {
                    plain(StatusCode::BAD_REQUEST, &err.to_string())
                }
                PaymentError::OrderNotFound => plain(StatusCode::NOT_FOUND, "Order not found"),
                PaymentError::AlreadyRefunded => plain(StatusCode::CONFLICT, "Order already refunded"),
                PaymentError::Stripe(_) => plain(StatusCode::BAD_GATEWAY, "Payment processor error"),
                PaymentError::Currency(_) | PaymentError::Repository(_) => {
                    plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                }
            },
            Self::NotFound(what) => plain(StatusCode::NOT_FOUND, &format!("{what} not found")),
            Self::Unauthorized(msg) => plain(StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => plain(StatusCode::FORBIDDEN, msg),
            Self::BadRequest(msg) => plain(StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => plain(StatusCode::CONFLICT, msg),
            Self::RateLimited => plain(StatusCode::TOO_MANY_REQUESTS, "Too many requests"),
            Self::Unavailable(msg) => plain(StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(_) => plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }
}

fn plain(status: StatusCode, message: &str) -> (StatusCode, Value) {
    (status, json!({ "error": message }))
}

fn repository_response(err: &RepositoryError) -> (StatusCode, Value) {
    match err {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "Not found" })),
        RepositoryError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
        // Don't expose internal error details to clients
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "Internal server error" }),
        ),
    }
}

fn reservation_response(err: &ReservationError) -> (StatusCode, Value) {
    match err {
        ReservationError::Empty => (StatusCode::BAD_REQUEST, json!({ "error": "No items" })),
        ReservationError::UnknownVariant(variant_id) => (
            StatusCode::BAD_REQUEST,
            json!({ "error": "Invalid item", "variantId": variant_id }),
        ),
        ReservationError::InsufficientStock {
            variant_id,
            available,
            ..
        } => (
            StatusCode::CONFLICT,
            json!({ "error": "INSUFFICIENT_STOCK", "variantId": variant_id, "available": available }),
        ),
        ReservationError::Repository(err) => repository_response(err),
    }
}

fn cart_response(err: &CartError) -> (StatusCode, Value) {
    match err {
        CartError::Empty => (StatusCode::BAD_REQUEST, json!({ "error": "No items" })),
        CartError::UnknownVariant(variant_id) => (
            StatusCode::BAD_REQUEST,
            json!({ "error": "Invalid item", "variantId": variant_id }),
        ),
        CartError::MixedCurrency => (
            StatusCode::BAD_REQUEST,
            json!({ "error": "Items must share one currency" }),
        ),
        CartError::Repository(err) => repository_response(err),
    }
}

fn auth_response(err: &AuthError) -> (StatusCode, Value) {
    let (status, message) = match err {
        AuthError::InvalidCredentials | AuthError::UserNotFound => {
            (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
        }
        AuthError::AccountDisabled => (StatusCode::FORBIDDEN, "Account disabled".to_string()),
        AuthError::UserAlreadyExists => (
            StatusCode::CONFLICT,
            "An account with this email already exists".to_string(),
        ),
        AuthError::WeakPassword(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        AuthError::InvalidEmail(_) => (StatusCode::BAD_REQUEST, "Invalid email address".to_string()),
        AuthError::InvalidName { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        AuthError::InvalidToken => (StatusCode::BAD_REQUEST, "Invalid or expired token".to_string()),
        AuthError::TokenExpired => (StatusCode::BAD_REQUEST, "Token has expired".to_string()),
        AuthError::InvalidSessionState => (
            StatusCode::UNAUTHORIZED,
            "Session expired, please try again".to_string(),
        ),
        AuthError::OAuth(_) => (StatusCode::BAD_GATEWAY, "Sign-in provider error".to_string()),
        AuthError::Repository(RepositoryError::Conflict(_)) => (
            StatusCode::CONFLICT,
            "An account with this email already exists".to_string(),
        ),
        AuthError::Repository(_) | AuthError::PasswordHash => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        ),
    };
    (status, json!({ "error": message }))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vendora_core::VariantId;

    use super::*;

    fn status_and_body(err: AppError) -> (StatusCode, Value) {
        err.status_and_body()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("Product".to_string());
        assert_eq!(err.to_string(), "Not found: Product");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(get_status(AppError::NotFound("test".to_string())), StatusCode::NOT_FOUND);
        assert_eq!(get_status(AppError::Unauthorized("test".to_string())), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(AppError::Forbidden("test".to_string())), StatusCode::FORBIDDEN);
        assert_eq!(get_status(AppError::BadRequest("test".to_string())), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(get_status(AppError::Unavailable("x".to_string())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_insufficient_stock_body() {
        let (status, body) = status_and_body(
            ReservationError::InsufficientStock {
                variant_id: VariantId::new(12),
                requested: 3,
                available: 1,
            }
            .into(),
        );
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "INSUFFICIENT_STOCK");
        assert_eq!(body["variantId"], 12);
        assert_eq!(body["available"], 1);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let (status, body) = status_and_body(AppError::Internal("db path /var/x".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");

        let (status, body) = status_and_body(AuthError::AccountDisabled.into());
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Account disabled");
    }
}
