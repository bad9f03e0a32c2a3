//! User repository for database operations.
//!
//! Accounts, password hashes, linked OAuth identities and the admin-side
//! role and access switches.

use sqlx::SqlitePool;

use vendora_core::{Email, Role, UserId};

use super::{RepositoryError, from_unix, like_pattern, unix_now};
use crate::models::User;

const USER_COLUMNS: &str = "id, name, email, email_verified_at, image, role, disabled, \
     disabled_reason, disabled_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    name: Option<String>,
    email: Email,
    email_verified_at: Option<i64>,
    image: Option<String>,
    role: Role,
    disabled: bool,
    disabled_reason: Option<String>,
    disabled_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            email_verified_at: r.email_verified_at.map(from_unix).transpose()?,
            image: r.image,
            role: r.role,
            disabled: r.disabled,
            disabled_reason: r.disabled_reason,
            disabled_at: r.disabled_at.map(from_unix).transpose()?,
            created_at: from_unix(r.created_at)?,
            updated_at: from_unix(r.updated_at)?,
        })
    }
}

/// Filters for the admin user list.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<Role>,
    pub limit: i64,
    pub offset: i64,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    /// Create a user without a password (OAuth sign-up).
    ///
    /// The address is marked verified since the provider vouched for it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    pub async fn create_verified(
        &self,
        email: &Email,
        name: Option<&str>,
        image: Option<&str>,
        role: Role,
    ) -> Result<User, RepositoryError> {
        let now = unix_now();
        let sql = format!(
            "INSERT INTO users (email, name, image, role, email_verified_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .bind(name)
            .bind(image)
            .bind(role)
            .bind(now)
            .bind(now)
            .bind(now)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "email"))?;
        row.try_into()
    }

    /// Create a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create_with_password(
        &self,
        email: &Email,
        name: Option<&str>,
        password_hash: &str,
        role: Role,
    ) -> Result<User, RepositoryError> {
        let now = unix_now();
        let sql = format!(
            "INSERT INTO users (email, name, password_hash, role, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .bind(name)
            .bind(password_hash)
            .bind(role)
            .bind(now)
            .bind(now)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "email"))?;
        row.try_into()
    }

    /// Get a user's password hash by email.
    ///
    /// Returns `None` if the user doesn't exist or has no password set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let Some(user) = self.get_by_email(email).await? else {
            return Ok(None);
        };

        let hash: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
                .bind(user.id)
                .fetch_one(self.pool)
                .await?;

        Ok(hash.map(|h| (user, h)))
    }

    /// Replace a user's password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(unix_now())
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Mark the user's email as verified. Already-verified users keep their
    /// original timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_verified(&self, id: UserId) -> Result<(), RepositoryError> {
        let now = unix_now();
        sqlx::query(
            "UPDATE users SET email_verified_at = COALESCE(email_verified_at, ?), updated_at = ? \
             WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Change a user's role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn set_role(&self, id: UserId, role: Role) -> Result<User, RepositoryError> {
        let sql = format!(
            "UPDATE users SET role = ?, updated_at = ? WHERE id = ? RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(role)
            .bind(unix_now())
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }

    /// Block a user from signing in.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn disable(&self, id: UserId, reason: Option<&str>) -> Result<User, RepositoryError> {
        let now = unix_now();
        let sql = format!(
            "UPDATE users SET disabled = 1, disabled_reason = ?, disabled_at = ?, updated_at = ? \
             WHERE id = ? RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(reason)
            .bind(now)
            .bind(now)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }

    /// Lift a previous [`disable`](Self::disable).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn enable(&self, id: UserId) -> Result<User, RepositoryError> {
        let sql = format!(
            "UPDATE users SET disabled = 0, disabled_reason = NULL, disabled_at = NULL, \
             updated_at = ? WHERE id = ? RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(unix_now())
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }

    /// Find the user linked to a provider account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_oauth(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM users u JOIN oauth_accounts a ON a.user_id = u.id \
             WHERE a.provider = ? AND a.provider_account_id = ?",
            prefixed_columns("u")
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(provider)
            .bind(provider_account_id)
            .fetch_optional(self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    /// Link a provider account to an existing user. Linking the same pair
    /// twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn link_oauth(
        &self,
        user_id: UserId,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO oauth_accounts (user_id, provider, provider_account_id, created_at) \
             VALUES (?, ?, ?, ?) ON CONFLICT (provider, provider_account_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_account_id)
        .bind(unix_now())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// List users, newest first, with the total matching count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &UserFilter) -> Result<(Vec<User>, i64), RepositoryError> {
        let search = filter.search.as_deref().map(like_pattern);
        let where_clause = "WHERE (? IS NULL OR email LIKE ? ESCAPE '\\' OR name LIKE ? ESCAPE '\\') \
                            AND (? IS NULL OR role = ?)";

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users {where_clause} \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(search.as_deref())
            .bind(search.as_deref())
            .bind(search.as_deref())
            .bind(filter.role)
            .bind(filter.role)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM users {where_clause}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(search.as_deref())
            .bind(search.as_deref())
            .bind(search.as_deref())
            .bind(filter.role)
            .bind(filter.role)
            .fetch_one(self.pool)
            .await?;

        let users = rows
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((users, total))
    }

    /// Account counts per role, for the admin user list header.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn role_counts(&self) -> Result<Vec<(Role, i64)>, RepositoryError> {
        Ok(
            sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role ORDER BY role")
                .fetch_all(self.pool)
                .await?,
        )
    }

    /// Total number of accounts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await?)
    }

    /// Count accounts holding `role`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_by_role(&self, role: Role) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(role)
            .fetch_one(self.pool)
            .await?)
    }
}

fn prefixed_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(", ")
        .map(|c| {
            let c = c.trim();
            format!("{alias}.{c} AS {c}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_columns() {
        let cols = prefixed_columns("u");
        assert!(cols.starts_with("u.id AS id, u.name AS name, u.email AS email"));
        assert!(cols.ends_with("u.updated_at AS updated_at"));
        assert!(!cols.contains('\\'));
    }
}
