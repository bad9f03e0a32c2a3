//! Server-side cart pricing.
//!
//! The cart itself lives in the browser; this endpoint re-prices it against
//! the catalog and current stock.

use axum::{Json, extract::State};
use serde::Deserialize;

use crate::error::Result;
use crate::models::HoldRequest;
use crate::services::cart::{PricedCart, price_cart};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<HoldRequest>,
}

/// `POST /api/cart/quote`
///
/// Duplicate lines are merged, quantities clamped to what is available and
/// lines with nothing left dropped.
pub async fn quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<PricedCart>> {
    let cart = price_cart(state.pool(), &request.items).await?;
    Ok(Json(cart.clamp_to_available()))
}
