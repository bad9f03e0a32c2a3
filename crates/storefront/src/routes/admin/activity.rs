//! Admin activity log.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use vendora_core::{Permission, UserId};

use super::page_limit;
use crate::db::ActivityRepository;
use crate::error::Result;
use crate::middleware::RequireStaff;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
}

/// `GET /api/admin/activity`
pub async fn index(
    State(state): State<AppState>,
    staff: RequireStaff,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Value>> {
    staff.require(Permission::ManageUsers)?;
    let entries = ActivityRepository::new(state.pool())
        .recent(query.user_id.map(UserId::new), page_limit(query.limit))
        .await?;
    Ok(Json(json!({ "activity": entries })))
}
