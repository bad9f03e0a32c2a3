//! The single-row store settings table.

use sqlx::SqlitePool;

use vendora_core::CurrencyCode;

use super::{RepositoryError, from_unix, unix_now};
use crate::models::StoreSettings;

#[derive(sqlx::FromRow)]
struct SettingsRow {
    store_name: String,
    store_logo: Option<String>,
    currency: CurrencyCode,
    tax_rate: f64,
    low_stock_threshold: i64,
    updated_at: i64,
}

impl TryFrom<SettingsRow> for StoreSettings {
    type Error = RepositoryError;

    fn try_from(r: SettingsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            store_name: r.store_name,
            store_logo: r.store_logo,
            currency: r.currency,
            tax_rate: r.tax_rate,
            low_stock_threshold: r.low_stock_threshold,
            updated_at: from_unix(r.updated_at)?,
        })
    }
}

/// Validated settings update.
#[derive(Debug, Clone)]
pub struct SettingsUpdate {
    pub store_name: String,
    pub store_logo: Option<String>,
    pub currency: CurrencyCode,
    pub tax_rate: f64,
    pub low_stock_threshold: i64,
}

pub struct SettingsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SettingsRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the seeded row is missing.
    pub async fn get(&self) -> Result<StoreSettings, RepositoryError> {
        sqlx::query_as::<_, SettingsRow>(
            "SELECT store_name, store_logo, currency, tax_rate, low_stock_threshold, updated_at \
             FROM store_settings WHERE id = 1",
        )
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn update(&self, update: &SettingsUpdate) -> Result<StoreSettings, RepositoryError> {
        let now = unix_now();
        sqlx::query_as::<_, SettingsRow>(
            "INSERT INTO store_settings (id, store_name, store_logo, currency, tax_rate, low_stock_threshold, created_at, updated_at) \
             VALUES (1, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET store_name = excluded.store_name, \
                 store_logo = excluded.store_logo, currency = excluded.currency, \
                 tax_rate = excluded.tax_rate, low_stock_threshold = excluded.low_stock_threshold, \
                 updated_at = excluded.updated_at \
             RETURNING store_name, store_logo, currency, tax_rate, low_stock_threshold, updated_at",
        )
        .bind(&update.store_name)
        .bind(&update.store_logo)
        .bind(update.currency)
        .bind(update.tax_rate)
        .bind(update.low_stock_threshold)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await?
        .try_into()
    }
}
