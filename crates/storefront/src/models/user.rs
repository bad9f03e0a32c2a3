//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vendora_core::{Email, Role, UserId};

/// A storefront account (domain type).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: Option<String>,
    pub email: Email,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub role: Role,
    pub disabled: bool,
    pub disabled_reason: Option<String>,
    pub disabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}
