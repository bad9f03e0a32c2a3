//! Product reviews.

use sqlx::SqlitePool;

use vendora_core::{ProductId, ReviewId, UserId};

use super::{RepositoryError, from_unix, unix_now};
use crate::models::{Review, ReviewSummary};

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: ReviewId,
    product_id: ProductId,
    user_id: UserId,
    author_name: Option<String>,
    rating: i64,
    comment: Option<String>,
    created_at: i64,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(r: ReviewRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            product_id: r.product_id,
            user_id: r.user_id,
            author_name: r.author_name,
            rating: r.rating,
            comment: r.comment,
            created_at: from_unix(r.created_at)?,
        })
    }
}

const REVIEW_SELECT: &str = "SELECT r.id AS id, r.product_id AS product_id, r.user_id AS user_id, \
     u.name AS author_name, r.rating AS rating, r.comment AS comment, r.created_at AS created_at \
     FROM reviews r LEFT JOIN users u ON u.id = r.user_id";

pub struct ReviewRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ReviewRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Reviews of a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_product(&self, product_id: ProductId) -> Result<Vec<Review>, RepositoryError> {
        let sql = format!("{REVIEW_SELECT} WHERE r.product_id = ? ORDER BY r.created_at DESC, r.id DESC");
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(product_id)
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(Review::try_from)
            .collect()
    }

    /// Reviews written by a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Review>, RepositoryError> {
        let sql = format!("{REVIEW_SELECT} WHERE r.user_id = ? ORDER BY r.created_at DESC, r.id DESC");
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(Review::try_from)
            .collect()
    }

    /// Count and average rating of a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn summary(&self, product_id: ProductId) -> Result<ReviewSummary, RepositoryError> {
        let (count, average): (i64, Option<f64>) =
            sqlx::query_as("SELECT COUNT(*), AVG(rating) FROM reviews WHERE product_id = ?")
                .bind(product_id)
                .fetch_one(self.pool)
                .await?;
        Ok(ReviewSummary::new(count, average))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` when the user already reviewed the
    /// product and `RepositoryError::NotFound` when the product doesn't exist.
    pub async fn create(
        &self,
        product_id: ProductId,
        user_id: UserId,
        rating: i64,
        comment: Option<&str>,
    ) -> Result<Review, RepositoryError> {
        let now = unix_now();
        let id: ReviewId = sqlx::query_scalar(
            "INSERT INTO reviews (product_id, user_id, rating, comment, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(product_id)
        .bind(user_id)
        .bind(rating)
        .bind(comment)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::from_unique(e, "review for this product")
        })?;

        self.get(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        let sql = format!("{REVIEW_SELECT} WHERE r.id = ?");
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .map(Review::try_from)
            .transpose()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review doesn't exist.
    pub async fn delete(&self, id: ReviewId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
