//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use vendora_core::{Email, Permission, Role, UserId};

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user. The
/// role is refreshed from the database on every sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
    pub name: Option<String>,
    pub role: Role,
}

impl CurrentUser {
    #[must_use]
    pub const fn can(&self, permission: Permission) -> bool {
        self.role.can(permission)
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for OAuth state (CSRF protection).
    pub const OAUTH_STATE: &str = "oauth_state";

    /// Key for the page to return to after an OAuth round trip.
    pub const OAUTH_RETURN_TO: &str = "oauth_return_to";
}
