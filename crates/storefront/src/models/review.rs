//! Product review types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vendora_core::{ProductId, ReviewId, UserId};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub author_name: Option<String>,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub count: i64,
    /// Mean rating rounded to one decimal, `None` when there are no reviews.
    pub average: Option<f64>,
}

impl ReviewSummary {
    #[must_use]
    pub fn new(count: i64, average: Option<f64>) -> Self {
        Self {
            count,
            average: average.map(|avg| (avg * 10.0).round() / 10.0),
        }
    }
}
