//! Authentication service.
//!
//! Password accounts, email verification, password resets and sign-in via
//! OAuth providers. Sessions are handled by the route layer; this service
//! only decides who the caller is.

mod error;
pub mod oauth;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::RngCore;
use sqlx::SqlitePool;

use vendora_core::{Email, Role};

use crate::db::tokens::TokenLookup;
use crate::db::{RepositoryError, TokenRepository, UserRepository};
use crate::models::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Minimum display name length.
const MIN_NAME_LENGTH: usize = 2;

/// Identity returned by an OAuth provider.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider: &'static str,
    pub account_id: String,
    pub email: Email,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    tokens: TokenRepository<'a>,
    admin_emails: &'a [Email],
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service. Addresses in `admin_emails` are
    /// given the ADMIN role when they register or sign in.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool, admin_emails: &'a [Email]) -> Self {
        Self {
            users: UserRepository::new(pool),
            tokens: TokenRepository::new(pool),
            admin_emails,
        }
    }

    fn is_admin_email(&self, email: &Email) -> bool {
        self.admin_emails.contains(email)
    }

    /// Register a new user with name, email and password.
    ///
    /// Returns the user and an email verification token to send them.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidName`, `AuthError::InvalidEmail` or
    /// `AuthError::WeakPassword` for bad input, and
    /// `AuthError::UserAlreadyExists` if the email is already registered.
    #[tracing::instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<(User, String), AuthError> {
        let name = name.trim();
        if name.chars().count() < MIN_NAME_LENGTH {
            return Err(AuthError::InvalidName {
                min: MIN_NAME_LENGTH,
            });
        }
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let role = if self.is_admin_email(&email) {
            Role::Admin
        } else {
            Role::Customer
        };

        let user = self
            .users
            .create_with_password(&email, Some(name), &password_hash, role)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        let token = self.issue_verification_token(&user).await?;
        tracing::info!(user_id = %user.id, role = user.role.as_str(), "User registered");
        Ok((user, token))
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong
    /// and `AuthError::AccountDisabled` for disabled accounts.
    pub async fn login_with_password(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        if user.disabled {
            return Err(AuthError::AccountDisabled);
        }

        self.promote_if_admin(user).await
    }

    /// Sign in with a verified provider identity.
    ///
    /// Looks the account up by provider link, then by email (linking the
    /// provider to it), and otherwise creates a new verified account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AccountDisabled` for disabled accounts.
    #[tracing::instrument(skip(self, profile), fields(provider = profile.provider))]
    pub async fn sign_in_with_oauth(&self, profile: &OAuthProfile) -> Result<User, AuthError> {
        let user = if let Some(user) = self
            .users
            .get_by_oauth(profile.provider, &profile.account_id)
            .await?
        {
            user
        } else if let Some(user) = self.users.get_by_email(&profile.email).await? {
            self.users
                .link_oauth(user.id, profile.provider, &profile.account_id)
                .await?;
            self.users.mark_verified(user.id).await?;
            user
        } else {
            let role = if self.is_admin_email(&profile.email) {
                Role::Admin
            } else {
                Role::Customer
            };
            let user = self
                .users
                .create_verified(
                    &profile.email,
                    profile.name.as_deref(),
                    profile.image.as_deref(),
                    role,
                )
                .await?;
            self.users
                .link_oauth(user.id, profile.provider, &profile.account_id)
                .await?;
            tracing::info!(user_id = %user.id, "User created from OAuth sign-in");
            user
        };

        if user.disabled {
            return Err(AuthError::AccountDisabled);
        }

        self.promote_if_admin(user).await
    }

    /// Configured admin addresses always hold the ADMIN role.
    async fn promote_if_admin(&self, user: User) -> Result<User, AuthError> {
        if user.role != Role::Admin && self.is_admin_email(&user.email) {
            tracing::info!(user_id = %user.id, "Promoting configured admin");
            return Ok(self.users.set_role(user.id, Role::Admin).await?);
        }
        Ok(user)
    }

    /// Create a fresh verification token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the token cannot be stored.
    pub async fn issue_verification_token(&self, user: &User) -> Result<String, AuthError> {
        let token = generate_token();
        self.tokens.create_verification(user.id, &token).await?;
        Ok(token)
    }

    /// Mark the owner of `token` as verified.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` or `AuthError::TokenExpired`.
    pub async fn verify_email(&self, token: &str) -> Result<User, AuthError> {
        let user_id = match self.tokens.consume_verification(token).await? {
            TokenLookup::Valid(user_id) => user_id,
            TokenLookup::Expired => return Err(AuthError::TokenExpired),
            TokenLookup::Missing => return Err(AuthError::InvalidToken),
        };
        self.users.mark_verified(user_id).await?;
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Start a password reset. Returns `None` when no such account exists so
    /// callers can respond identically either way.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the token cannot be stored.
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<(User, String)>, AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(None);
        };
        let Some(user) = self.users.get_by_email(&email).await? else {
            return Ok(None);
        };
        if user.disabled {
            return Ok(None);
        }
        let token = generate_token();
        self.tokens.create_reset(user.id, &token).await?;
        Ok(Some((user, token)))
    }

    /// Set a new password using a reset token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword`, `AuthError::InvalidToken` or
    /// `AuthError::TokenExpired`.
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<User, AuthError> {
        validate_password(password)?;
        let user_id = match self.tokens.consume_reset(token).await? {
            TokenLookup::Valid(user_id) => user_id,
            TokenLookup::Expired => return Err(AuthError::TokenExpired),
            TokenLookup::Missing => return Err(AuthError::InvalidToken),
        };
        let hash = hash_password(password)?;
        self.users.update_password(user_id, &hash).await?;
        tracing::info!(user_id = %user_id, "Password reset");
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Create an account directly (CLI). Skips email verification.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let hash = hash_password(password)?;
        let user = self
            .users
            .create_with_password(&email, Some(name.trim()), &hash, role)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;
        self.users.mark_verified(user.id).await?;
        Ok(user)
    }
}

/// 32 random bytes, hex encoded.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_password_length() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("longenough").is_ok());
    }

    #[test]
    fn test_generate_token() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
