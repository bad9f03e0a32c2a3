//! Public catalog endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use vendora_core::CategoryId;

use crate::db::catalog::ProductSearch;
use crate::db::{CatalogRepository, ReviewRepository};
use crate::error::{AppError, Result};
use crate::models::ProductDetail;
use crate::state::AppState;

/// `GET /api/products`
pub async fn index(State(state): State<AppState>) -> Result<Json<Value>> {
    let products = CatalogRepository::new(state.pool()).list_products().await?;
    Ok(Json(json!({ "products": products })))
}

/// `GET /api/products/{slug}`
#[tracing::instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductDetail>> {
    let catalog = CatalogRepository::new(state.pool());
    let product = catalog
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

    let category = match product.category_id {
        Some(id) => catalog.get_category(id).await?,
        None => None,
    };
    let reviews = ReviewRepository::new(state.pool()).summary(product.id).await?;

    Ok(Json(ProductDetail {
        product,
        category,
        reviews,
    }))
}

/// Query string of `GET /api/products/search`. Prices are in cents.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<i64>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub in_stock: Option<bool>,
}

impl From<SearchQuery> for ProductSearch {
    fn from(q: SearchQuery) -> Self {
        Self {
            query: q.q,
            category_id: q.category.map(CategoryId::new),
            min_price_cents: q.min_price,
            max_price_cents: q.max_price,
            in_stock_only: q.in_stock.unwrap_or(false),
        }
    }
}

/// `GET /api/products/search`
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>> {
    let products = CatalogRepository::new(state.pool())
        .search(&query.into())
        .await?;
    Ok(Json(json!({ "products": products })))
}

/// `GET /api/categories`
pub async fn categories(State(state): State<AppState>) -> Result<Json<Value>> {
    let categories = CatalogRepository::new(state.pool()).list_categories().await?;
    Ok(Json(json!({ "categories": categories })))
}
