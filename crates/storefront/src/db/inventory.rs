//! Per-variant stock counters outside the reservation flow.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use vendora_core::{ProductId, VariantId};

use super::{RepositoryError, unix_now};
use crate::models::InventoryLevel;

/// Inventory row as listed in the admin console.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRow {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub product_title: String,
    pub variant_title: String,
    pub sku: String,
    #[serde(flatten)]
    pub level: InventoryLevel,
}

#[derive(sqlx::FromRow)]
struct InventoryRecord {
    variant_id: VariantId,
    product_id: ProductId,
    product_title: String,
    variant_title: String,
    sku: String,
    in_stock: i64,
    reserved: i64,
    low_stock_level: Option<i64>,
}

impl From<InventoryRecord> for InventoryRow {
    fn from(r: InventoryRecord) -> Self {
        Self {
            variant_id: r.variant_id,
            product_id: r.product_id,
            product_title: r.product_title,
            variant_title: r.variant_title,
            sku: r.sku,
            level: InventoryLevel {
                in_stock: r.in_stock,
                reserved: r.reserved,
                low_stock_level: r.low_stock_level,
            },
        }
    }
}

const INVENTORY_SELECT: &str = "SELECT i.variant_id AS variant_id, p.id AS product_id, \
     p.title AS product_title, v.title AS variant_title, v.sku AS sku, i.in_stock AS in_stock, \
     i.reserved AS reserved, i.low_stock_level AS low_stock_level \
     FROM inventory i \
     JOIN product_variants v ON v.id = i.variant_id \
     JOIN products p ON p.id = v.product_id";

pub struct InventoryRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> InventoryRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Every inventory row, lowest availability first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<InventoryRow>, RepositoryError> {
        let sql = format!("{INVENTORY_SELECT} ORDER BY (i.in_stock - i.reserved), p.title, v.id");
        let rows = sqlx::query_as::<_, InventoryRecord>(&sql)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(InventoryRow::from).collect())
    }

    /// Rows whose availability is at or below their own low-stock level, or
    /// `threshold` when they have none.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn low_stock(
        &self,
        threshold: i64,
        limit: i64,
    ) -> Result<Vec<InventoryRow>, RepositoryError> {
        let sql = format!(
            "{INVENTORY_SELECT} WHERE v.active = 1 AND p.active = 1 \
             AND (i.in_stock - i.reserved) <= COALESCE(i.low_stock_level, ?) \
             ORDER BY (i.in_stock - i.reserved), v.id LIMIT ?"
        );
        let rows = sqlx::query_as::<_, InventoryRecord>(&sql)
            .bind(threshold)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(InventoryRow::from).collect())
    }

    /// Counters for one variant.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, variant_id: VariantId) -> Result<Option<InventoryLevel>, RepositoryError> {
        let row: Option<(i64, i64, Option<i64>)> = sqlx::query_as(
            "SELECT in_stock, reserved, low_stock_level FROM inventory WHERE variant_id = ?",
        )
        .bind(variant_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(|(in_stock, reserved, low_stock_level)| InventoryLevel {
            in_stock,
            reserved,
            low_stock_level,
        }))
    }

    /// Current `available` for each of `variant_ids` that has an inventory row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn availability(
        &self,
        variant_ids: &[VariantId],
    ) -> Result<Vec<(VariantId, i64)>, RepositoryError> {
        if variant_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT variant_id, in_stock - reserved FROM inventory WHERE variant_id IN (",
        );
        let mut ids = qb.separated(", ");
        for id in variant_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY variant_id");

        Ok(qb.build_query_as().fetch_all(self.pool).await?)
    }

    /// Set the on-hand count and low-stock level of a variant.
    ///
    /// The row is only updated when `in_stock` stays at or above what is
    /// reserved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the variant has no inventory row
    /// and `RepositoryError::Conflict` if `in_stock` is below `reserved`.
    pub async fn set_stock(
        &self,
        variant_id: VariantId,
        in_stock: i64,
        low_stock_level: Option<i64>,
    ) -> Result<InventoryLevel, RepositoryError> {
        let row: Option<(i64, i64, Option<i64>)> = sqlx::query_as(
            "UPDATE inventory SET in_stock = ?, low_stock_level = ?, updated_at = ? \
             WHERE variant_id = ? AND reserved <= ? \
             RETURNING in_stock, reserved, low_stock_level",
        )
        .bind(in_stock)
        .bind(low_stock_level)
        .bind(unix_now())
        .bind(variant_id)
        .bind(in_stock)
        .fetch_optional(self.pool)
        .await?;

        if let Some((in_stock, reserved, low_stock_level)) = row {
            return Ok(InventoryLevel {
                in_stock,
                reserved,
                low_stock_level,
            });
        }

        match self.get(variant_id).await? {
            Some(level) => Err(RepositoryError::Conflict(format!(
                "in_stock {in_stock} is below the {} units currently reserved",
                level.reserved
            ))),
            None => Err(RepositoryError::NotFound),
        }
    }
}
