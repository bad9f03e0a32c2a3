//! Customer order endpoints.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use vendora_core::{Email, PaymentIntentId};

use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{HoldRequest, ShippingAddress};
use crate::services::payments::Confirmation;
use crate::state::AppState;

/// `GET /api/orders`
///
/// The caller's orders, matched by account or by the email used at checkout.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Value>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_customer(user.id, &user.email)
        .await?;
    Ok(Json(json!({ "orders": orders })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOrderRequest {
    pub payment_intent_id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub items: Vec<HoldRequest>,
    pub shipping_address: Option<ShippingAddress>,
}

/// `POST /api/orders`
///
/// Called by the browser once the payment is confirmed. The intent is
/// checked with the processor, so a forged id can't create an order; a
/// repeated call returns the existing order.
#[tracing::instrument(skip(state, user, body), fields(payment_intent_id = %body.payment_intent_id))]
pub async fn create(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Json(body): Json<ConfirmOrderRequest>,
) -> Result<Json<Value>> {
    if body.payment_intent_id.trim().is_empty() {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    }
    if let Some(address) = &body.shipping_address
        && !address.is_complete()
    {
        return Err(AppError::BadRequest("Incomplete shipping address".to_string()));
    }

    let email = match body.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(raw) => Some(
            Email::parse(raw).map_err(|_| AppError::BadRequest("Invalid email address".to_string()))?,
        ),
        None => user.as_ref().map(|u| u.email.clone()),
    };

    let payment_intent_id = PaymentIntentId::new(body.payment_intent_id.trim());
    let (order, created) = state
        .payments()
        .confirm_client_order(
            &payment_intent_id,
            &Confirmation {
                email: email.as_ref(),
                user_id: user.as_ref().map(|u| u.id),
                items: &body.items,
                shipping: body.shipping_address.as_ref(),
            },
        )
        .await?;

    Ok(Json(json!({ "order": order, "created": created })))
}
