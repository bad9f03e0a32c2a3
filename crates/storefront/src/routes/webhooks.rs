//! Payment processor webhooks.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use serde_json::json;

use crate::db::unix_now;
use crate::services::stripe::webhook::{self, PaymentEvent};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// `POST /api/stripe/webhook`
///
/// A bad or missing signature is a 400. Once the signature checks out the
/// event is always acknowledged with `{"received": true}`, even when handling
/// fails, so the processor doesn't retry into the same error; failures are
/// logged and reported to Sentry instead.
#[tracing::instrument(skip_all)]
pub async fn stripe(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!("Webhook without signature header");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing signature" })),
        )
            .into_response();
    };

    let event = match webhook::construct_event(
        &body,
        signature,
        state.config().stripe.webhook_secret.expose_secret(),
        unix_now(),
    ) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Webhook signature verification failed");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid signature" })),
            )
                .into_response();
        }
    };

    let event_id = event.id.clone();
    let kind = event.kind.clone();
    tracing::info!(event_id = %event_id, kind = %kind, "Webhook received");

    match event.into_payment_event() {
        Ok(PaymentEvent::Ignored(kind)) => {
            tracing::debug!(kind = %kind, "Ignoring webhook event");
        }
        Ok(payment_event) => match state.payments().handle_event(payment_event).await {
            Ok(outcome) => tracing::info!(event_id = %event_id, ?outcome, "Webhook handled"),
            Err(e) => {
                let sentry_event_id = sentry::capture_error(&e);
                tracing::error!(
                    event_id = %event_id,
                    kind = %kind,
                    error = %e,
                    sentry_event_id = %sentry_event_id,
                    "Webhook handling failed"
                );
            }
        },
        Err(e) => {
            tracing::error!(event_id = %event_id, kind = %kind, error = %e, "Malformed webhook object");
        }
    }

    Json(json!({ "received": true })).into_response()
}
