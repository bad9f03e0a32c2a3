//! Authentication extractors.
//!
//! Sessions carry a [`CurrentUser`] snapshot. Customer-facing routes trust the
//! snapshot; admin routes use [`RequireStaff`], which reloads the account so a
//! role change or a disabled account takes effect on the next request.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use vendora_core::Permission;

use crate::db::UserRepository;
use crate::error::AppError;
use crate::models::{CurrentUser, session_keys};
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_user(parts)
            .await
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject anonymous requests.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(session_user(parts).await))
    }
}

/// Extractor for the admin API: a signed-in, enabled account with a staff role.
///
/// Rejects with 401 otherwise. Handlers then call [`RequireStaff::require`]
/// for the specific permission, which rejects with 403.
pub struct RequireStaff(pub CurrentUser);

impl RequireStaff {
    /// Check that the staff member's role grants `permission`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` when it does not.
    pub fn require(&self, permission: Permission) -> Result<&CurrentUser, AppError> {
        if self.0.can(permission) {
            Ok(&self.0)
        } else {
            tracing::debug!(user_id = %self.0.id, ?permission, "Permission denied");
            Err(AppError::Forbidden(format!("Missing permission: {permission}")))
        }
    }
}

impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || AppError::Unauthorized("Staff sign in required".to_string());
        let cached = session_user(parts).await.ok_or_else(unauthorized)?;

        let user = UserRepository::new(state.pool())
            .get_by_id(cached.id)
            .await?
            .filter(|user| !user.disabled && user.role.is_staff())
            .ok_or_else(unauthorized)?;

        Ok(Self(CurrentUser {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }))
    }
}

async fn session_user(parts: &Parts) -> Option<CurrentUser> {
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

/// Store the signed-in user in the session.
///
/// The session id is cycled first to prevent fixation.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Clear the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
