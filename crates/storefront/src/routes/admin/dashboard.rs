//! Admin dashboard summary.

use axum::{Json, extract::State};
use serde_json::{Value, json};

use vendora_core::Permission;

use crate::db::orders::OrderFilter;
use crate::db::{CatalogRepository, InventoryRepository, OrderRepository, UserRepository};
use crate::error::Result;
use crate::middleware::RequireStaff;
use crate::state::AppState;

const RECENT_ORDERS: i64 = 5;
const LOW_STOCK_ROWS: i64 = 10;

/// `GET /api/admin/dashboard`
#[tracing::instrument(skip_all)]
pub async fn show(State(state): State<AppState>, staff: RequireStaff) -> Result<Json<Value>> {
    staff.require(Permission::ViewDashboard)?;

    let pool = state.pool();
    let orders = OrderRepository::new(pool);
    let settings = state.settings().await?;

    let products = CatalogRepository::new(pool).count_products().await?;
    let order_count = orders.count().await?;
    let users = UserRepository::new(pool).count().await?;
    let revenue_cents = orders.revenue_cents().await?;
    let recent_orders = orders
        .list(&OrderFilter {
            limit: RECENT_ORDERS,
            ..OrderFilter::default()
        })
        .await?;
    let low_stock = InventoryRepository::new(pool)
        .low_stock(settings.low_stock_threshold, LOW_STOCK_ROWS)
        .await?;

    Ok(Json(json!({
        "stats": {
            "products": products,
            "orders": order_count,
            "users": users,
            "revenueCents": revenue_cents,
            "currency": settings.currency,
        },
        "recentOrders": recent_orders,
        "lowStock": low_stock,
    })))
}
