//! Checkout: hold stock, then open a payment intent for it.

use axum::{Json, extract::State};
use serde::Deserialize;

use vendora_core::{CurrencyCode, Email};

use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::models::HoldRequest;
use crate::services::checkout::{CheckoutRequest, CheckoutSession};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentIntentRequest {
    #[serde(default)]
    pub items: Vec<HoldRequest>,
    pub email: Option<String>,
    pub currency: Option<String>,
}

/// `POST /api/checkout/create-payment-intent`
///
/// Responds 400 for empty carts or unknown variants, 409 with
/// `INSUFFICIENT_STOCK` when a line can't be held, and 502 when the payment
/// processor fails (the holds are released again in that case).
#[tracing::instrument(skip(state, user, body), fields(lines = body.items.len()))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Json(body): Json<CreatePaymentIntentRequest>,
) -> Result<Json<CheckoutSession>> {
    let email = match body.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(raw) => Some(
            Email::parse(raw).map_err(|_| AppError::BadRequest("Invalid email address".to_string()))?,
        ),
        None => user.map(|u| u.email),
    };
    let currency = body
        .currency
        .as_deref()
        .map(str::parse::<CurrencyCode>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let session = state
        .checkout()
        .start(&CheckoutRequest {
            items: body.items,
            email,
            currency,
        })
        .await?;

    Ok(Json(session))
}
