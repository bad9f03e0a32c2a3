//! Password authentication, email verification and password resets.
//!
//! Every endpoint speaks JSON. Signing in stores a [`CurrentUser`] in the
//! session; the cookie is issued by the session layer.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_sessions::Session;

use vendora_core::Email;

use crate::db::UserRepository;
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalAuth, RequireAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::state::AppState;

const RESET_SENT_MESSAGE: &str = "If an account exists, a password reset link has been sent.";
const VERIFICATION_SENT_MESSAGE: &str = "If an account exists, a verification email will be sent.";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmailRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Public view of the signed-in account.
fn account_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "image": user.image,
        "role": user.role,
        "emailVerified": user.is_verified(),
        "permissions": user.role.permissions(),
    })
}

/// Put `user` in the session and tag Sentry with it.
pub(crate) async fn sign_in(session: &Session, user: &User) -> Result<()> {
    set_current_user(
        session,
        &CurrentUser {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        },
    )
    .await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}

/// `POST /api/auth/register`
///
/// Creates a customer account (admin when the address is configured as
/// one), signs it in and sends a verification link.
#[tracing::instrument(skip(state, session, body))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let (user, token) = state
        .auth()
        .register(&body.name, &body.email, &body.password)
        .await?;

    if let Err(e) = state
        .email()
        .send_verification_email(user.email.as_str(), user.name.as_deref(), &token)
        .await
    {
        tracing::error!(user_id = %user.id, error = %e, "Failed to send verification email");
    }

    sign_in(&session, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user": account_json(&user),
            "message": "Account created. Check your email to verify your address.",
        })),
    ))
}

/// `POST /api/auth/login`
///
/// Disabled accounts get a 403, wrong credentials a 401.
#[tracing::instrument(skip(state, session, body))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>> {
    let user = state
        .auth()
        .login_with_password(&body.email, &body.password)
        .await?;
    sign_in(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User signed in");
    Ok(Json(json!({ "user": account_json(&user) })))
}

/// `POST /api/auth/logout`
pub async fn logout(session: Session) -> Result<Json<Value>> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(Json(json!({ "success": true })))
}

/// `GET /api/auth/me`
///
/// Re-reads the account so role changes show up without signing out.
pub async fn me(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
) -> Result<Json<Value>> {
    let user = UserRepository::new(state.pool())
        .get_by_id(current.id)
        .await?
        .filter(|u| !u.disabled);

    let Some(user) = user else {
        clear_current_user(&session).await?;
        return Err(AppError::Unauthorized("Sign in required".to_string()));
    };

    if user.role != current.role {
        sign_in(&session, &user).await?;
    }
    Ok(Json(json!({ "user": account_json(&user) })))
}

/// `POST /api/auth/verify-email`
pub async fn verify_email(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<Value>> {
    let user = state.auth().verify_email(body.token.trim()).await?;
    tracing::info!(user_id = %user.id, "Email verified");
    Ok(Json(json!({ "success": true, "message": "Email verified" })))
}

/// `POST /api/auth/resend-verification`
///
/// Takes an `email`, or uses the signed-in account. Unknown addresses get
/// the same response as known ones.
pub async fn resend_verification(
    State(state): State<AppState>,
    OptionalAuth(current): OptionalAuth,
    body: Option<Json<EmailRequest>>,
) -> Result<Json<Value>> {
    let requested = body.and_then(|Json(b)| b.email);
    let email = match requested.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(raw) => Email::parse(raw).ok(),
        None => current.map(|c| c.email),
    };
    let Some(email) = email else {
        return Err(AppError::BadRequest("Email is required".to_string()));
    };

    let Some(user) = UserRepository::new(state.pool()).get_by_email(&email).await? else {
        return Ok(Json(json!({ "success": true, "message": VERIFICATION_SENT_MESSAGE })));
    };
    if user.is_verified() {
        return Err(AppError::BadRequest("Email is already verified".to_string()));
    }

    let token = state.auth().issue_verification_token(&user).await?;
    state
        .email()
        .send_verification_email(user.email.as_str(), user.name.as_deref(), &token)
        .await
        .map_err(|e| AppError::Internal(format!("verification email: {e}")))?;

    Ok(Json(json!({ "success": true, "message": "Verification email sent!" })))
}

/// `POST /api/auth/forgot-password`
///
/// Always reports success so the endpoint can't be used to check for
/// accounts.
#[tracing::instrument(skip(state, body))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<Json<Value>> {
    let email = body.email.unwrap_or_default();
    if let Some((user, token)) = state.auth().request_password_reset(&email).await?
        && let Err(e) = state
            .email()
            .send_password_reset_email(user.email.as_str(), &token)
            .await
    {
        tracing::error!(user_id = %user.id, error = %e, "Failed to send password reset email");
    }
    Ok(Json(json!({ "success": true, "message": RESET_SENT_MESSAGE })))
}

/// `POST /api/auth/reset-password`
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<Value>> {
    state
        .auth()
        .reset_password(body.token.trim(), &body.password)
        .await?;
    Ok(Json(json!({ "success": true, "message": "Password updated. You can now sign in." })))
}
