//! CLI subcommands.

pub mod migrate;
pub mod reservations;
pub mod seed;
pub mod user;

use sqlx::SqlitePool;

use vendora_storefront::config::database_url_from_env;
use vendora_storefront::db;

/// Connect to the database named by `VENDORA_DATABASE_URL`/`DATABASE_URL`.
async fn connect() -> Result<SqlitePool, sqlx::Error> {
    let database_url = database_url_from_env();
    tracing::info!(%database_url, "Connecting to database...");
    db::create_pool(&database_url).await
}
