//! One-time email verification and password reset tokens.

use std::time::Duration;

use sqlx::SqlitePool;

use vendora_core::UserId;

use super::{RepositoryError, unix_now};

/// Lifetime of an email verification link.
pub const VERIFICATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifetime of a password reset link.
pub const RESET_TTL: Duration = Duration::from_secs(60 * 60);

/// Outcome of redeeming a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLookup {
    Valid(UserId),
    Expired,
    Missing,
}

pub struct TokenRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TokenRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a new verification token, replacing any earlier ones for the user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create_verification(
        &self,
        user_id: UserId,
        token: &str,
    ) -> Result<(), RepositoryError> {
        let now = unix_now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM email_verification_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO email_verification_tokens (user_id, token, expires_at, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(token)
        .bind(now + ttl_secs(VERIFICATION_TTL))
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Consume a verification token. The token is deleted whether or not it
    /// has expired.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn consume_verification(&self, token: &str) -> Result<TokenLookup, RepositoryError> {
        let row: Option<(UserId, i64)> = sqlx::query_as(
            "DELETE FROM email_verification_tokens WHERE token = ? RETURNING user_id, expires_at",
        )
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        Ok(classify(row, unix_now()))
    }

    /// Store a new password reset token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create_reset(&self, user_id: UserId, token: &str) -> Result<(), RepositoryError> {
        let now = unix_now();
        sqlx::query(
            "INSERT INTO password_reset_tokens (user_id, token, expires_at, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(token)
        .bind(now + ttl_secs(RESET_TTL))
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Mark a reset token used and return its owner. A token can only be
    /// redeemed once.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn consume_reset(&self, token: &str) -> Result<TokenLookup, RepositoryError> {
        let row: Option<(UserId, i64)> = sqlx::query_as(
            "UPDATE password_reset_tokens SET used = 1 WHERE token = ? AND used = 0 \
             RETURNING user_id, expires_at",
        )
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        Ok(classify(row, unix_now()))
    }

    /// Drop expired and used tokens.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purge_stale(&self) -> Result<u64, RepositoryError> {
        let now = unix_now();
        let a = sqlx::query("DELETE FROM email_verification_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(self.pool)
            .await?;
        let b = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= ? OR used = 1")
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(a.rows_affected() + b.rows_affected())
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

fn classify(row: Option<(UserId, i64)>, now: i64) -> TokenLookup {
    match row {
        None => TokenLookup::Missing,
        Some((_, expires_at)) if expires_at <= now => TokenLookup::Expired,
        Some((user_id, _)) => TokenLookup::Valid(user_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let user = UserId::new(7);
        assert_eq!(classify(None, 100), TokenLookup::Missing);
        assert_eq!(classify(Some((user, 100)), 100), TokenLookup::Expired);
        assert_eq!(classify(Some((user, 101)), 100), TokenLookup::Valid(user));
    }

    #[test]
    fn test_ttls() {
        assert_eq!(ttl_secs(VERIFICATION_TTL), 86_400);
        assert_eq!(ttl_secs(RESET_TTL), 3_600);
    }
}
