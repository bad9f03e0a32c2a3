//! Admin JSON API under `/api/admin`.
//!
//! Every handler takes [`RequireStaff`](crate::middleware::RequireStaff)
//! (401 for anyone without a back-office role) and then checks the one
//! permission it needs (403). Mutations append to the activity log.

pub mod activity;
pub mod dashboard;
pub mod finance;
pub mod inventory;
pub mod orders;
pub mod products;
pub mod settings;
pub mod users;

use std::net::SocketAddr;

use axum::{
    Router,
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
    routing::{get, post, put},
};

use crate::db::ActivityRepository;
use crate::db::activity::NewActivity;
use crate::models::{ActivityAction, CurrentUser};
use crate::state::AppState;

/// Default page size for admin listings.
pub(crate) const DEFAULT_LIMIT: i64 = 50;
/// Largest page size a client may ask for.
pub(crate) const MAX_LIMIT: i64 = 500;

pub(crate) fn page_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Admin routes, nested under `/api/admin`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard::show))
        .route("/products", get(products::index).post(products::create))
        .route(
            "/products/{id}",
            put(products::update).delete(products::delete),
        )
        .route("/inventory", get(inventory::index))
        .route("/inventory/{variant_id}", put(inventory::update))
        .route("/reservations", get(inventory::reservations))
        .route("/orders", get(orders::index))
        .route("/orders/{id}", get(orders::show))
        .route("/orders/{id}/status", post(orders::update_status))
        .route("/orders/{id}/tracking", post(orders::add_tracking))
        .route("/orders/{id}/refund", post(orders::refund))
        .route("/users", get(users::index))
        .route("/users/{id}", get(users::show))
        .route("/users/{id}/role", post(users::change_role))
        .route("/users/{id}/disable", post(users::disable))
        .route("/users/{id}/enable", post(users::enable))
        .route("/settings", get(settings::show).put(settings::update))
        .route("/finance", get(finance::summary))
        .route("/finance/export", get(finance::export))
        .route("/activity", get(activity::index))
}

/// Best guess at the caller's address: proxy headers, then the peer.
pub(crate) fn client_ip(
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

/// Client address for audit entries.
pub(crate) struct ClientIp(pub Option<String>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(client_ip(
            &parts.headers,
            parts.extensions.get::<ConnectInfo<SocketAddr>>(),
        )))
    }
}

/// Who did what, for the activity log.
pub(crate) struct Audit<'a> {
    pub actor: &'a CurrentUser,
    pub ip_address: Option<String>,
}

impl<'a> Audit<'a> {
    pub(crate) fn new(actor: &'a CurrentUser, ip: ClientIp) -> Self {
        Self {
            actor,
            ip_address: ip.0,
        }
    }

    /// Append an activity log row. The mutation has already happened, so a
    /// failure here is logged rather than returned.
    pub(crate) async fn record(
        &self,
        state: &AppState,
        action: ActivityAction,
        entity_id: impl ToString,
        details: Option<String>,
    ) {
        let entry = NewActivity {
            user_id: self.actor.id,
            action,
            entity_id: Some(entity_id.to_string()),
            details,
            ip_address: self.ip_address.as_deref(),
        };
        if let Err(e) = ActivityRepository::new(state.pool()).record(&entry).await {
            tracing::error!(action = %action, error = %e, "Failed to record admin activity");
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_page_limit_bounds() {
        assert_eq!(page_limit(None), DEFAULT_LIMIT);
        assert_eq!(page_limit(Some(0)), 1);
        assert_eq!(page_limit(Some(10_000)), MAX_LIMIT);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.2"));
        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000)));
        assert_eq!(client_ip(&headers, Some(&peer)).as_deref(), Some("203.0.113.9"));
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(&peer)).as_deref(),
            Some("127.0.0.1")
        );
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
