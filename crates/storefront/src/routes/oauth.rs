//! Social sign-in via the OAuth authorization-code flow.
//!
//! - Login: stores a CSRF state in the session and redirects to the provider
//! - Callback: checks the state, exchanges the code and signs the user in

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::models::session_keys;
use crate::routes::auth::sign_in;
use crate::services::auth::generate_token;
use crate::services::auth::oauth::{OAuthClient, OAuthProvider};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginQuery {
    pub return_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Only same-site paths are accepted as post-login destinations.
fn safe_return_path(path: Option<&str>) -> &str {
    match path {
        Some(p) if p.starts_with('/') && !p.starts_with("//") && !p.contains('\\') => p,
        _ => "/",
    }
}

fn redirect_uri(state: &AppState, provider: OAuthProvider) -> String {
    format!(
        "{}/auth/oauth/{}/callback",
        state.config().base_url.trim_end_matches('/'),
        provider.as_str()
    )
}

fn login_error(code: &str) -> Response {
    Redirect::to(&format!("/login?error={code}")).into_response()
}

/// `GET /auth/oauth/{provider}/login`
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Path(provider): Path<String>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let Ok(provider) = provider.parse::<OAuthProvider>() else {
        return login_error("unknown_provider");
    };
    let Some(client) = provider.client(&state.config().oauth) else {
        tracing::warn!(provider = provider.as_str(), "OAuth provider not configured");
        return login_error("provider_unavailable");
    };

    let oauth_state = generate_token();
    let return_to = safe_return_path(query.return_to.as_deref()).to_owned();

    if let Err(e) = session.insert(session_keys::OAUTH_STATE, &oauth_state).await {
        tracing::error!(error = %e, "Failed to store OAuth state in session");
        return login_error("session");
    }
    if let Err(e) = session.insert(session_keys::OAUTH_RETURN_TO, &return_to).await {
        tracing::error!(error = %e, "Failed to store OAuth return path in session");
        return login_error("session");
    }

    let url = OAuthClient::new(state.http(), provider, client)
        .authorization_url(&redirect_uri(&state, provider), &oauth_state);
    Redirect::to(&url).into_response()
}

/// `GET /auth/oauth/{provider}/callback`
#[tracing::instrument(skip(state, session, query))]
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Ok(provider) = provider.parse::<OAuthProvider>() else {
        return login_error("unknown_provider");
    };
    let Some(client) = provider.client(&state.config().oauth) else {
        return login_error("provider_unavailable");
    };

    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::warn!(provider = provider.as_str(), %error, %description, "OAuth denied");
        return login_error("access_denied");
    }
    let Some(code) = query.code else {
        return login_error("missing_code");
    };

    let stored_state: Option<String> = session
        .remove(session_keys::OAUTH_STATE)
        .await
        .ok()
        .flatten();
    if stored_state.is_none() || stored_state != query.state {
        tracing::warn!(provider = provider.as_str(), "OAuth state mismatch");
        return login_error("invalid_state");
    }
    let return_to: Option<String> = session
        .remove(session_keys::OAUTH_RETURN_TO)
        .await
        .ok()
        .flatten();

    let profile = match OAuthClient::new(state.http(), provider, client)
        .exchange(&code, &redirect_uri(&state, provider))
        .await
    {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!(provider = provider.as_str(), error = %e, "OAuth exchange failed");
            return login_error("token_exchange");
        }
    };

    let user = match state.auth().sign_in_with_oauth(&profile).await {
        Ok(user) => user,
        Err(crate::services::auth::AuthError::AccountDisabled) => {
            return login_error("account_disabled");
        }
        Err(e) => {
            tracing::error!(provider = provider.as_str(), error = %e, "OAuth sign-in failed");
            return login_error("sign_in");
        }
    };

    if let Err(e) = sign_in(&session, &user).await {
        tracing::error!(error = %e, "Failed to store user in session");
        return login_error("session");
    }

    tracing::info!(user_id = %user.id, provider = provider.as_str(), "User signed in via OAuth");
    Redirect::to(safe_return_path(return_to.as_deref())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_return_path() {
        assert_eq!(safe_return_path(Some("/orders")), "/orders");
        assert_eq!(safe_return_path(Some("//evil.example")), "/");
        assert_eq!(safe_return_path(Some("https://evil.example")), "/");
        assert_eq!(safe_return_path(Some("/\\evil")), "/");
        assert_eq!(safe_return_path(None), "/");
    }
}
