//! Admin stock levels and the reservation ledger.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use vendora_core::{Permission, ReservationStatus, VariantId};

use super::{Audit, ClientIp, page_limit};
use crate::db::{InventoryRepository, RepositoryError, ReservationRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireStaff;
use crate::models::ActivityAction;
use crate::state::AppState;

/// `GET /api/admin/inventory`
pub async fn index(State(state): State<AppState>, staff: RequireStaff) -> Result<Json<Value>> {
    staff.require(Permission::ManageInventory)?;
    let settings = state.settings().await?;
    let rows = InventoryRepository::new(state.pool()).list().await?;
    Ok(Json(json!({
        "inventory": rows,
        "lowStockThreshold": settings.low_stock_threshold,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdate {
    pub in_stock: i64,
    pub low_stock_level: Option<i64>,
}

/// `PUT /api/admin/inventory/{variant_id}`
///
/// `in_stock` may not drop below the units currently held by checkouts.
#[tracing::instrument(skip(state, staff, ip, body))]
pub async fn update(
    State(state): State<AppState>,
    staff: RequireStaff,
    ip: ClientIp,
    Path(variant_id): Path<i64>,
    Json(body): Json<StockUpdate>,
) -> Result<Json<Value>> {
    let actor = staff.require(Permission::ManageInventory)?;
    if body.in_stock < 0 || body.low_stock_level.is_some_and(|l| l < 0) {
        return Err(AppError::BadRequest("Stock levels cannot be negative".to_string()));
    }
    let variant_id = VariantId::new(variant_id);

    let level = InventoryRepository::new(state.pool())
        .set_stock(variant_id, body.in_stock, body.low_stock_level)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("Variant".to_string()),
            other => other.into(),
        })?;

    state
        .realtime()
        .publish_availability(&[(variant_id, level.available())])
        .await;

    Audit::new(actor, ip)
        .record(
            &state,
            ActivityAction::UpdateInventory,
            variant_id,
            Some(format!(
                "in_stock={} low_stock_level={:?}",
                level.in_stock, level.low_stock_level
            )),
        )
        .await;

    Ok(Json(json!({ "variantId": variant_id, "inventory": level })))
}

#[derive(Debug, Deserialize)]
pub struct ReservationQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// `GET /api/admin/reservations?status=`
pub async fn reservations(
    State(state): State<AppState>,
    staff: RequireStaff,
    Query(query): Query<ReservationQuery>,
) -> Result<Json<Value>> {
    staff.require(Permission::ManageInventory)?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<ReservationStatus>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let holds = ReservationRepository::new(state.pool())
        .list(status, page_limit(query.limit))
        .await?;
    Ok(Json(json!({ "reservations": holds })))
}
