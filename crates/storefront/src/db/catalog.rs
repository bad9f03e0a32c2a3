//! Categories, products and variants.
//!
//! Variants are always loaded joined to their inventory row so callers see
//! current availability.

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use vendora_core::{CategoryId, CurrencyCode, Price, ProductId, VariantId};

use super::{RepositoryError, from_unix, like_pattern, unix_now};
use crate::models::{Category, InventoryLevel, Product, Variant};

const PRODUCT_COLUMNS: &str = "p.id AS id, p.slug AS slug, p.title AS title, \
     p.description AS description, p.thumbnail AS thumbnail, p.active AS active, \
     p.category_id AS category_id, p.created_at AS created_at, p.updated_at AS updated_at";

const VARIANT_SELECT: &str = "SELECT v.id AS id, v.product_id AS product_id, v.sku AS sku, \
     v.title AS title, v.price_cents AS price_cents, v.currency AS currency, v.image AS image, \
     v.attributes AS attributes, v.active AS active, COALESCE(i.in_stock, 0) AS in_stock, \
     COALESCE(i.reserved, 0) AS reserved, i.low_stock_level AS low_stock_level \
     FROM product_variants v LEFT JOIN inventory i ON i.variant_id = v.id";

/// Low-stock level applied when an admin ticks "notify on low stock".
pub const DEFAULT_LOW_STOCK_LEVEL: i64 = 10;

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: CategoryId,
    slug: String,
    name: String,
    parent_id: Option<CategoryId>,
}

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Self {
            id: r.id,
            slug: r.slug,
            name: r.name,
            parent_id: r.parent_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    slug: String,
    title: String,
    description: Option<String>,
    thumbnail: Option<String>,
    active: bool,
    category_id: Option<CategoryId>,
    created_at: i64,
    updated_at: i64,
}

impl ProductRow {
    fn into_product(self, variants: Vec<Variant>) -> Result<Product, RepositoryError> {
        Ok(Product {
            id: self.id,
            slug: self.slug,
            title: self.title,
            description: self.description,
            thumbnail: self.thumbnail,
            active: self.active,
            category_id: self.category_id,
            created_at: from_unix(self.created_at)?,
            updated_at: from_unix(self.updated_at)?,
            variants,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: VariantId,
    product_id: ProductId,
    sku: String,
    title: String,
    price_cents: i64,
    currency: CurrencyCode,
    image: Option<String>,
    attributes: Option<String>,
    active: bool,
    in_stock: i64,
    reserved: i64,
    low_stock_level: Option<i64>,
}

impl TryFrom<VariantRow> for Variant {
    type Error = RepositoryError;

    fn try_from(r: VariantRow) -> Result<Self, Self::Error> {
        let attributes = r
            .attributes
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid attributes on variant {}: {e}", r.id))
            })?;

        Ok(Self {
            id: r.id,
            product_id: r.product_id,
            sku: r.sku,
            title: r.title,
            price: Price::from_cents(r.price_cents, r.currency),
            image: r.image,
            attributes,
            active: r.active,
            inventory: InventoryLevel {
                in_stock: r.in_stock,
                reserved: r.reserved,
                low_stock_level: r.low_stock_level,
            },
        })
    }
}

/// Public search parameters.
#[derive(Debug, Clone, Default)]
pub struct ProductSearch {
    pub query: Option<String>,
    pub category_id: Option<CategoryId>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub in_stock_only: bool,
}

/// Admin product form with a single default variant.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub category_id: Option<CategoryId>,
    pub sku: String,
    pub price: Price,
    pub in_stock: i64,
    pub low_stock_level: Option<i64>,
}

/// What happened to a product on delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductRemoval {
    Deleted,
    /// Orders reference its variants, so it was hidden instead.
    Deactivated,
}

pub struct CatalogRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// All categories by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, slug, name, parent_id FROM categories ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        Ok(sqlx::query_as::<_, CategoryRow>(
            "SELECT id, slug, name, parent_id FROM categories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .map(Category::from))
    }

    /// Insert a category, or return the existing one with the same slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_category(&self, slug: &str, name: &str) -> Result<Category, RepositoryError> {
        let now = unix_now();
        let row = sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO categories (slug, name, created_at, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT (slug) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at \
             RETURNING id, slug, name, parent_id",
        )
        .bind(slug)
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await?;
        Ok(row.into())
    }

    /// Active products with their active variants, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.active = 1 \
             ORDER BY p.created_at DESC, p.id DESC"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .fetch_all(self.pool)
            .await?;
        self.attach_variants(rows, true).await
    }

    /// Every product regardless of status, for the admin console.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products p ORDER BY p.created_at DESC, p.id DESC");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .fetch_all(self.pool)
            .await?;
        self.attach_variants(rows, false).await
    }

    /// An active product by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.slug = ? AND p.active = 1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(slug)
            .fetch_optional(self.pool)
            .await?;
        Ok(self
            .attach_variants(row.into_iter().collect(), true)
            .await?
            .into_iter()
            .next())
    }

    /// A product by id, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = ?");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(self
            .attach_variants(row.into_iter().collect(), false)
            .await?
            .into_iter()
            .next())
    }

    /// Filter active products. A product matches when any of its active
    /// variants satisfies the price and stock filters.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search(&self, params: &ProductSearch) -> Result<Vec<Product>, RepositoryError> {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT DISTINCT {PRODUCT_COLUMNS} FROM products p \
             LEFT JOIN product_variants v ON v.product_id = p.id AND v.active = 1 \
             LEFT JOIN inventory i ON i.variant_id = v.id \
             WHERE p.active = 1"
        ));

        if let Some(term) = params.query.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = like_pattern(term);
            qb.push(" AND (p.title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR p.description LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR v.title LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(category_id) = params.category_id {
            qb.push(" AND p.category_id = ").push_bind(category_id);
        }
        if let Some(min) = params.min_price_cents {
            qb.push(" AND v.price_cents >= ").push_bind(min);
        }
        if let Some(max) = params.max_price_cents {
            qb.push(" AND v.price_cents <= ").push_bind(max);
        }
        if params.in_stock_only {
            qb.push(" AND (i.in_stock - i.reserved) > 0");
        }
        qb.push(" ORDER BY p.created_at DESC, p.id DESC");

        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool)
            .await?;
        self.attach_variants(rows, true).await
    }

    /// Load variants for a set of products and assemble them.
    async fn attach_variants(
        &self,
        rows: Vec<ProductRow>,
        active_only: bool,
    ) -> Result<Vec<Product>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(VARIANT_SELECT);
        qb.push(" WHERE v.product_id IN (");
        let mut ids = qb.separated(", ");
        for row in &rows {
            ids.push_bind(row.id);
        }
        ids.push_unseparated(")");
        if active_only {
            qb.push(" AND v.active = 1");
        }
        qb.push(" ORDER BY v.price_cents, v.id");

        let mut by_product: HashMap<ProductId, Vec<Variant>> = HashMap::new();
        for row in qb.build_query_as::<VariantRow>().fetch_all(self.pool).await? {
            let variant = Variant::try_from(row)?;
            by_product.entry(variant.product_id).or_default().push(variant);
        }

        rows.into_iter()
            .map(|row| {
                let variants = by_product.remove(&row.id).unwrap_or_default();
                row.into_product(variants)
            })
            .collect()
    }

    /// One variant with its inventory.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_variant(&self, id: VariantId) -> Result<Option<Variant>, RepositoryError> {
        let sql = format!("{VARIANT_SELECT} WHERE v.id = ?");
        sqlx::query_as::<_, VariantRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .map(Variant::try_from)
            .transpose()
    }

    /// Purchasable variants among `ids`: the variant and its product are both
    /// active. Unknown or inactive ids are simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purchasable_variants(
        &self,
        ids: &[VariantId],
    ) -> Result<Vec<Variant>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(VARIANT_SELECT);
        qb.push(" JOIN products p ON p.id = v.product_id WHERE v.active = 1 AND p.active = 1 AND v.id IN (");
        let mut list = qb.separated(", ");
        for id in ids {
            list.push_bind(*id);
        }
        list.push_unseparated(")");

        qb.build_query_as::<VariantRow>()
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(Variant::try_from)
            .collect()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_products(&self) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(self.pool)
            .await?)
    }

    /// Create a product with a default variant and its inventory row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` when the SKU is taken and
    /// `RepositoryError::NotFound` when the category doesn't exist.
    pub async fn create_product(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let now = unix_now();
        let slug = format!("{}-{}", slugify(&input.title), short_suffix());
        let mut tx = self.pool.begin().await?;

        let product_id: ProductId = sqlx::query_scalar(
            "INSERT INTO products (slug, title, description, thumbnail, active, category_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 1, ?, ?, ?) RETURNING id",
        )
        .bind(&slug)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.image)
        .bind(input.category_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        let variant_id: VariantId = sqlx::query_scalar(
            "INSERT INTO product_variants (product_id, sku, title, price_cents, currency, image, active, created_at, updated_at) \
             VALUES (?, ?, 'Default', ?, ?, ?, 1, ?, ?) RETURNING id",
        )
        .bind(product_id)
        .bind(&input.sku)
        .bind(input.price.amount_cents)
        .bind(input.price.currency)
        .bind(&input.image)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        sqlx::query(
            "INSERT INTO inventory (variant_id, in_stock, reserved, low_stock_level, updated_at) \
             VALUES (?, ?, 0, ?, ?)",
        )
        .bind(variant_id)
        .bind(input.in_stock.max(0))
        .bind(input.low_stock_level)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_product(product_id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Add a variant (with inventory) to an existing product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` when the SKU is taken.
    pub async fn add_variant(
        &self,
        product_id: ProductId,
        sku: &str,
        title: &str,
        price: Price,
        in_stock: i64,
        attributes: Option<&serde_json::Value>,
    ) -> Result<VariantId, RepositoryError> {
        let now = unix_now();
        let attributes = attributes.map(serde_json::Value::to_string);
        let mut tx = self.pool.begin().await?;

        let variant_id: VariantId = sqlx::query_scalar(
            "INSERT INTO product_variants (product_id, sku, title, price_cents, currency, attributes, active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?) RETURNING id",
        )
        .bind(product_id)
        .bind(sku)
        .bind(title)
        .bind(price.amount_cents)
        .bind(price.currency)
        .bind(attributes)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        sqlx::query(
            "INSERT INTO inventory (variant_id, in_stock, reserved, updated_at) VALUES (?, ?, 0, ?)",
        )
        .bind(variant_id)
        .bind(in_stock.max(0))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(variant_id)
    }

    /// Insert a product row only (used by seeding).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` when the slug is taken.
    pub async fn insert_product(
        &self,
        slug: &str,
        title: &str,
        description: Option<&str>,
        thumbnail: Option<&str>,
        category_id: Option<CategoryId>,
    ) -> Result<ProductId, RepositoryError> {
        let now = unix_now();
        sqlx::query_scalar(
            "INSERT INTO products (slug, title, description, thumbnail, active, category_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 1, ?, ?, ?) RETURNING id",
        )
        .bind(slug)
        .bind(title)
        .bind(description)
        .bind(thumbnail)
        .bind(category_id)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(map_write_error)
    }

    /// Update a product and its default (first) variant.
    ///
    /// Stock can't drop below what is currently held by checkouts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown product,
    /// `RepositoryError::Conflict` for a taken SKU or a stock level below the
    /// reserved count.
    pub async fn update_product(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let now = unix_now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE products SET title = ?, description = ?, thumbnail = ?, category_id = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.image)
        .bind(input.category_id)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        let variant_id: Option<VariantId> = sqlx::query_scalar(
            "SELECT id FROM product_variants WHERE product_id = ? ORDER BY id LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(variant_id) = variant_id {
            sqlx::query(
                "UPDATE product_variants SET sku = ?, price_cents = ?, currency = ?, image = ?, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(&input.sku)
            .bind(input.price.amount_cents)
            .bind(input.price.currency)
            .bind(&input.image)
            .bind(now)
            .bind(variant_id)
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;

            let stocked = sqlx::query(
                "UPDATE inventory SET in_stock = ?, low_stock_level = ?, updated_at = ? \
                 WHERE variant_id = ? AND reserved <= ?",
            )
            .bind(input.in_stock)
            .bind(input.low_stock_level)
            .bind(now)
            .bind(variant_id)
            .bind(input.in_stock)
            .execute(&mut *tx)
            .await?;
            if stocked.rows_affected() == 0 {
                return Err(RepositoryError::Conflict(
                    "stock cannot be set below the reserved quantity".to_owned(),
                ));
            }
        }

        tx.commit().await?;
        self.get_product(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Delete a product, or deactivate it when orders reference its variants.
    ///
    /// Products with active holds are always deactivated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown product.
    pub async fn delete_product(&self, id: ProductId) -> Result<ProductRemoval, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let deactivated = sqlx::query(
            "UPDATE products SET active = 0, updated_at = ? WHERE id = ? AND EXISTS ( \
                 SELECT 1 FROM product_variants v WHERE v.product_id = products.id AND ( \
                     EXISTS (SELECT 1 FROM order_items oi WHERE oi.variant_id = v.id) \
                     OR EXISTS (SELECT 1 FROM reservations r WHERE r.variant_id = v.id AND r.status = 'ACTIVE')))",
        )
        .bind(unix_now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let outcome = if deactivated.rows_affected() > 0 {
            ProductRemoval::Deactivated
        } else {
            let deleted = sqlx::query("DELETE FROM products WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if deleted.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
            ProductRemoval::Deleted
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

fn map_write_error(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict("a product with this SKU already exists".to_owned());
        }
        if db_err.is_foreign_key_violation() {
            return RepositoryError::NotFound;
        }
    }
    RepositoryError::Database(err)
}

/// Lowercase, hyphen-separated ASCII slug.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        "product".to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn short_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string().chars().take(4).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Classic Tee"), "classic-tee");
        assert_eq!(slugify("  Mug -- 12oz! "), "mug-12oz");
        assert_eq!(slugify("???"), "product");
    }

    #[test]
    fn test_short_suffix_length() {
        assert_eq!(short_suffix().len(), 4);
    }
}
