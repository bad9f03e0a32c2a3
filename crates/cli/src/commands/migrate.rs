//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! vendora migrate
//! ```
//!
//! # Environment Variables
//!
//! - `VENDORA_DATABASE_URL` / `DATABASE_URL` - SQLite URL
//!   (default: `sqlite://data/ecommerce.db`, created if missing)
//!
//! Migration files live in `crates/storefront/migrations/` and are embedded
//! at build time. The server also applies them on startup.

use vendora_storefront::db::MIGRATOR;

/// Errors that can occur while migrating.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Apply all pending migrations.
///
/// # Errors
///
/// Returns an error if the database can't be opened or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let pool = super::connect().await?;

    tracing::info!("Running storefront migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
