//! Admin order management: listing, status, tracking and refunds.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use vendora_core::{OrderId, OrderStatus, Permission, Price};

use super::{Audit, ClientIp, page_limit};
use crate::db::orders::OrderFilter;
use crate::db::{OrderRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::middleware::RequireStaff;
use crate::models::ActivityAction;
use crate::state::AppState;

const DEFAULT_REFUND_REASON: &str = "Requested by admin";
const MAX_TRACKING_LENGTH: usize = 100;

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
    pub q: Option<String>,
    pub limit: Option<i64>,
}

/// `GET /api/admin/orders?status=&q=`
pub async fn index(
    State(state): State<AppState>,
    staff: RequireStaff,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Value>> {
    staff.require(Permission::ManageOrders)?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let repo = OrderRepository::new(state.pool());
    let orders = repo
        .list(&OrderFilter {
            status,
            search: query.q.map(|q| q.trim().to_owned()).filter(|q| !q.is_empty()),
            limit: page_limit(query.limit),
        })
        .await?;
    let counts: Vec<Value> = repo
        .status_counts()
        .await?
        .into_iter()
        .map(|(status, count, total_cents)| {
            json!({ "status": status, "count": count, "totalCents": total_cents })
        })
        .collect();

    Ok(Json(json!({ "orders": orders, "counts": counts })))
}

/// `GET /api/admin/orders/{id}`
pub async fn show(
    State(state): State<AppState>,
    staff: RequireStaff,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    staff.require(Permission::ManageOrders)?;
    let order = OrderRepository::new(state.pool())
        .get_detail(OrderId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;
    Ok(Json(json!({ "order": order })))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

/// `POST /api/admin/orders/{id}/status`
#[tracing::instrument(skip(state, staff, ip, body))]
pub async fn update_status(
    State(state): State<AppState>,
    staff: RequireStaff,
    ip: ClientIp,
    Path(id): Path<i64>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<Value>> {
    let actor = staff.require(Permission::ManageOrders)?;
    let status: OrderStatus = body
        .status
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid status".to_string()))?;
    let id = OrderId::new(id);

    let repo = OrderRepository::new(state.pool());
    repo.set_status(id, status).await.map_err(not_found)?;

    Audit::new(actor, ip)
        .record(
            &state,
            ActivityAction::UpdateOrderStatus,
            id,
            Some(format!("Changed status to {status}")),
        )
        .await;

    Ok(Json(json!({ "success": true, "status": status })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    pub tracking_number: String,
}

/// `POST /api/admin/orders/{id}/tracking`
#[tracing::instrument(skip(state, staff, ip, body))]
pub async fn add_tracking(
    State(state): State<AppState>,
    staff: RequireStaff,
    ip: ClientIp,
    Path(id): Path<i64>,
    Json(body): Json<TrackingUpdate>,
) -> Result<Json<Value>> {
    let actor = staff.require(Permission::ManageOrders)?;
    let tracking = body.tracking_number.trim();
    if tracking.is_empty() || tracking.len() > MAX_TRACKING_LENGTH {
        return Err(AppError::BadRequest("Invalid tracking number".to_string()));
    }
    let id = OrderId::new(id);

    OrderRepository::new(state.pool())
        .set_tracking(id, tracking)
        .await
        .map_err(not_found)?;

    Audit::new(actor, ip)
        .record(
            &state,
            ActivityAction::AddTracking,
            id,
            Some(format!("Added tracking: {tracking}")),
        )
        .await;

    Ok(Json(json!({ "success": true, "trackingNumber": tracking })))
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// Amount in cents.
    pub amount: i64,
    pub reason: Option<String>,
}

/// `POST /api/admin/orders/{id}/refund`
///
/// Refunds through the processor, then marks the order cancelled and
/// refunded. An order can be refunded once.
#[tracing::instrument(skip(state, staff, ip, body))]
pub async fn refund(
    State(state): State<AppState>,
    staff: RequireStaff,
    ip: ClientIp,
    Path(id): Path<i64>,
    Json(body): Json<RefundRequest>,
) -> Result<Json<Value>> {
    let actor = staff.require(Permission::RefundOrders)?;
    let reason = body
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REFUND_REASON);
    let id = OrderId::new(id);

    let order = state.payments().refund(id, body.amount, Some(reason)).await?;

    let amount = Price::from_cents(body.amount, order.order.currency());
    Audit::new(actor, ip)
        .record(
            &state,
            ActivityAction::RefundOrder,
            id,
            Some(format!("Refunded {amount}: {reason}")),
        )
        .await;

    Ok(Json(json!({ "order": order })))
}

fn not_found(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("Order".to_string()),
        other => other.into(),
    }
}
