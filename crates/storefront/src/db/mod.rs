//! Database operations for the storefront SQLite file.
//!
//! ## Tables
//!
//! - `users`, `oauth_accounts` - Accounts and linked social logins
//! - `email_verification_tokens`, `password_reset_tokens` - One-time tokens
//! - `categories`, `products`, `product_variants`, `inventory` - Catalog and stock counters
//! - `reservations` - Stock holds taken during checkout
//! - `orders`, `order_items`, `shipping_addresses` - Paid orders
//! - `reviews`, `store_settings`, `activity_logs`
//! - `tower_sessions` - Created by the session store on startup
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p vendora-cli -- migrate
//! ```

pub mod activity;
pub mod catalog;
pub mod inventory;
pub mod orders;
pub mod reservations;
pub mod reviews;
pub mod settings;
pub mod tokens;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use thiserror::Error;

pub use activity::ActivityRepository;
pub use catalog::CatalogRepository;
pub use inventory::InventoryRepository;
pub use orders::OrderRepository;
pub use reservations::{ReservationError, ReservationRepository};
pub use reviews::ReviewRepository;
pub use settings::SettingsRepository;
pub use tokens::TokenRepository;
pub use users::UserRepository;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique-constraint violations to `Conflict`, everything else to `Database`.
    pub(crate) fn from_unique(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Create a SQLite connection pool.
///
/// The file is created if missing. WAL journaling lets readers proceed while
/// a checkout holds the write lock, and the busy timeout makes concurrent
/// writers queue instead of failing with `SQLITE_BUSY`.
///
/// # Errors
///
/// Returns `sqlx::Error` if the URL is invalid or the file cannot be opened.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10));

    SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Current time as unix seconds, the storage format for every timestamp column.
#[must_use]
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Decode a stored unix timestamp.
pub(crate) fn from_unix(secs: i64) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| RepositoryError::DataCorruption(format!("invalid timestamp: {secs}")))
}

/// Escape `%` and `_` for use in a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("mug"), "%mug%");
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
    }

    #[test]
    fn test_from_unix() {
        let dt = from_unix(1_700_000_000).unwrap_or_default();
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }
}
