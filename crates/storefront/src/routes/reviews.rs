//! Product reviews.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use vendora_core::{Permission, ProductId, ReviewId};

use crate::db::{RepositoryError, ReviewRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::state::AppState;

const MAX_COMMENT_LENGTH: usize = 2000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewsQuery {
    pub product_id: Option<i64>,
}

/// `GET /api/reviews?productId=`
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ReviewsQuery>,
) -> Result<Json<Value>> {
    let product_id = query
        .product_id
        .map(ProductId::new)
        .ok_or_else(|| AppError::BadRequest("Product ID required".to_string()))?;

    let repo = ReviewRepository::new(state.pool());
    let reviews = repo.list_for_product(product_id).await?;
    let summary = repo.summary(product_id).await?;

    Ok(Json(json!({
        "reviews": reviews,
        "averageRating": summary.average.unwrap_or(0.0),
        "reviewCount": summary.count,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub product_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
}

/// `POST /api/reviews`
///
/// One review per user and product; a second attempt is a 409.
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<NewReview>,
) -> Result<(StatusCode, Json<Value>)> {
    if !(1..=5).contains(&body.rating) {
        return Err(AppError::BadRequest("Rating must be between 1 and 5".to_string()));
    }
    let comment = body.comment.as_deref().map(str::trim).filter(|c| !c.is_empty());
    if comment.is_some_and(|c| c.chars().count() > MAX_COMMENT_LENGTH) {
        return Err(AppError::BadRequest(format!(
            "Comment must be at most {MAX_COMMENT_LENGTH} characters"
        )));
    }

    let review = ReviewRepository::new(state.pool())
        .create(ProductId::new(body.product_id), user.id, body.rating, comment)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("Product".to_string()),
            RepositoryError::Conflict(_) => {
                AppError::Conflict("You have already reviewed this product".to_string())
            }
            other => other.into(),
        })?;

    Ok((StatusCode::CREATED, Json(json!({ "review": review }))))
}

/// `DELETE /api/reviews/{id}`
///
/// Authors may delete their own reviews; staff who manage products may
/// delete any.
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let repo = ReviewRepository::new(state.pool());
    let review = repo
        .get(ReviewId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound("Review".to_string()))?;

    if review.user_id != user.id && !user.can(Permission::ManageProducts) {
        return Err(AppError::Forbidden("Not your review".to_string()));
    }

    repo.delete(review.id).await?;
    Ok(Json(json!({ "success": true })))
}
