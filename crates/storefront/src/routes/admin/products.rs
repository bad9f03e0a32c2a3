//! Admin product management.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

use vendora_core::{CategoryId, CurrencyCode, Permission, Price, ProductId};

use super::{Audit, ClientIp};
use crate::db::CatalogRepository;
use crate::db::catalog::{ProductInput, ProductRemoval};
use crate::error::{AppError, Result};
use crate::middleware::RequireStaff;
use crate::models::ActivityAction;
use crate::services::inventory::publish_levels;
use crate::state::AppState;

/// Product form. `price` is in major units (e.g. `19.99`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductForm {
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub category_id: Option<i64>,
    pub sku: String,
    pub price: Decimal,
    pub currency: Option<String>,
    #[serde(default)]
    pub in_stock: i64,
    pub low_stock_level: Option<i64>,
}

impl ProductForm {
    fn validate(self, default_currency: CurrencyCode) -> Result<ProductInput> {
        let title = self.title.trim().to_owned();
        let sku = self.sku.trim().to_owned();
        if title.is_empty() || sku.is_empty() {
            return Err(AppError::BadRequest("Title and SKU are required".to_string()));
        }
        if self.in_stock < 0 || self.low_stock_level.is_some_and(|l| l < 0) {
            return Err(AppError::BadRequest("Stock levels cannot be negative".to_string()));
        }
        let currency = match self.currency.as_deref() {
            Some(code) => code
                .parse::<CurrencyCode>()
                .map_err(|e| AppError::BadRequest(e.to_string()))?,
            None => default_currency,
        };
        let price = Price::from_decimal(self.price, currency)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        if price.amount_cents == 0 {
            return Err(AppError::BadRequest("Price must be greater than zero".to_string()));
        }

        Ok(ProductInput {
            title,
            description: non_empty(self.description),
            image: non_empty(self.image),
            category_id: self.category_id.map(CategoryId::new),
            sku,
            price,
            in_stock: self.in_stock,
            low_stock_level: self.low_stock_level,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn category_error(err: crate::db::RepositoryError) -> AppError {
    match err {
        crate::db::RepositoryError::NotFound => AppError::BadRequest("Unknown category".to_string()),
        other => other.into(),
    }
}

/// `GET /api/admin/products`
pub async fn index(State(state): State<AppState>, staff: RequireStaff) -> Result<Json<Value>> {
    staff.require(Permission::ViewDashboard)?;
    let products = CatalogRepository::new(state.pool()).list_all_products().await?;
    Ok(Json(json!({ "products": products })))
}

/// `POST /api/admin/products`
///
/// Creates the product with a default variant and its inventory row.
#[tracing::instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    staff: RequireStaff,
    ip: ClientIp,
    Json(form): Json<ProductForm>,
) -> Result<(StatusCode, Json<Value>)> {
    let actor = staff.require(Permission::ManageProducts)?;
    let settings = state.settings().await?;
    let input = form.validate(settings.currency)?;

    let product = CatalogRepository::new(state.pool())
        .create_product(&input)
        .await
        .map_err(category_error)?;

    tracing::info!(product_id = %product.id, sku = %input.sku, "Product created");
    Audit::new(actor, ip)
        .record(
            &state,
            ActivityAction::CreateProduct,
            product.id,
            Some(format!("Created product {}", product.title)),
        )
        .await;

    Ok((StatusCode::CREATED, Json(json!({ "product": product }))))
}

/// `PUT /api/admin/products/{id}`
#[tracing::instrument(skip(state, staff, ip, form))]
pub async fn update(
    State(state): State<AppState>,
    staff: RequireStaff,
    ip: ClientIp,
    Path(id): Path<i64>,
    Json(form): Json<ProductForm>,
) -> Result<Json<Value>> {
    let actor = staff.require(Permission::ManageProducts)?;
    let settings = state.settings().await?;
    let input = form.validate(settings.currency)?;
    let id = ProductId::new(id);

    let catalog = CatalogRepository::new(state.pool());
    if catalog.get_product(id).await?.is_none() {
        return Err(AppError::NotFound("Product".to_string()));
    }
    let product = catalog
        .update_product(id, &input)
        .await
        .map_err(category_error)?;

    let variant_ids: Vec<_> = product.variants.iter().map(|v| v.id).collect();
    publish_levels(state.pool(), state.realtime(), &variant_ids).await;

    Audit::new(actor, ip)
        .record(
            &state,
            ActivityAction::UpdateProduct,
            product.id,
            Some(format!("Updated product {}", product.title)),
        )
        .await;

    Ok(Json(json!({ "product": product })))
}

/// `DELETE /api/admin/products/{id}`
///
/// Products referenced by orders or live holds are deactivated instead.
#[tracing::instrument(skip(state, staff, ip))]
pub async fn delete(
    State(state): State<AppState>,
    staff: RequireStaff,
    ip: ClientIp,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let actor = staff.require(Permission::DeleteProducts)?;
    let id = ProductId::new(id);

    let removal = CatalogRepository::new(state.pool())
        .delete_product(id)
        .await
        .map_err(|e| match e {
            crate::db::RepositoryError::NotFound => AppError::NotFound("Product".to_string()),
            other => other.into(),
        })?;

    let detail = match removal {
        ProductRemoval::Deleted => "deleted",
        ProductRemoval::Deactivated => "deactivated",
    };
    Audit::new(actor, ip)
        .record(
            &state,
            ActivityAction::DeleteProduct,
            id,
            Some(format!("Product {detail}")),
        )
        .await;

    Ok(Json(json!({ "success": true, "result": detail })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn form(price: &str) -> ProductForm {
        ProductForm {
            title: "  Mug ".to_string(),
            description: Some("   ".to_string()),
            image: None,
            category_id: None,
            sku: "MUG-1".to_string(),
            price: Decimal::from_str(price).unwrap(),
            currency: None,
            in_stock: 5,
            low_stock_level: None,
        }
    }

    #[test]
    fn test_validate_converts_price_to_cents() {
        let input = form("19.99").validate(CurrencyCode::Usd).unwrap();
        assert_eq!(input.title, "Mug");
        assert_eq!(input.price, Price::from_cents(1999, CurrencyCode::Usd));
        assert_eq!(input.description, None);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(form("0").validate(CurrencyCode::Usd).is_err());
        assert!(form("-1").validate(CurrencyCode::Usd).is_err());
        let mut negative_stock = form("5");
        negative_stock.in_stock = -1;
        assert!(negative_stock.validate(CurrencyCode::Usd).is_err());
        let mut bad_currency = form("5");
        bad_currency.currency = Some("xyz".to_string());
        assert!(bad_currency.validate(CurrencyCode::Usd).is_err());
    }
}
