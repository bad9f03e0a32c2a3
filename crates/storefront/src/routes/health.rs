//! Liveness and readiness checks.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::state::AppState;

/// Liveness check. Does not touch dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness check: 503 when the database is unreachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if ping(&state).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// `GET /api/health/db`
pub async fn database(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if ping(&state).await {
        (StatusCode::OK, Json(json!({ "ok": true })))
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": "Database unreachable" })),
        )
    }
}

async fn ping(state: &AppState) -> bool {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            false
        }
    }
}
