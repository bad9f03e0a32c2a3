//! Token endpoint for browser subscribers of inventory channels.

use axum::{Json, extract::State};
use chrono::Utc;

use crate::error::{AppError, Result};
use crate::services::realtime::{RealtimeError, TokenRequest};
use crate::state::AppState;

/// `GET /api/ably/auth`
///
/// Returns a signed, subscribe-only token request. 503 when no API key is
/// configured.
pub async fn token(State(state): State<AppState>) -> Result<Json<TokenRequest>> {
    state
        .realtime()
        .create_token_request(Utc::now().timestamp_millis())
        .map(Json)
        .map_err(|e| match e {
            RealtimeError::NotConfigured => {
                AppError::Unavailable("Realtime updates are not configured".to_string())
            }
            other => AppError::Internal(other.to_string()),
        })
}
