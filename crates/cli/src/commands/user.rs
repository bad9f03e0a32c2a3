//! Account management commands.
//!
//! # Usage
//!
//! ```bash
//! vendora user create -e admin@example.com -n "Admin Name" -r admin -p 'correct horse battery'
//! ```

use vendora_core::Role;
use vendora_storefront::services::auth::{AuthError, AuthService};

/// Errors that can occur during user operations.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid role: {0}. Valid roles: admin, staff, viewer, customer")]
    InvalidRole(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Create a verified account with a password and role.
///
/// # Errors
///
/// Returns an error for an unknown role, an invalid email or password, or
/// an address that is already registered.
pub async fn create(email: &str, name: &str, role: &str, password: &str) -> Result<(), UserError> {
    let role: Role = role
        .parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))?;

    let pool = super::connect().await?;

    tracing::info!("Creating user: {} ({})", email, role);
    let user = AuthService::new(&pool, &[])
        .create_user(name, email, password, role)
        .await?;

    tracing::info!(
        "User created successfully! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    Ok(())
}
