//! Admin activity log.

use sqlx::SqlitePool;

use vendora_core::{ActivityLogId, UserId};

use super::{RepositoryError, from_unix, unix_now};
use crate::models::{ActivityAction, ActivityEntry};

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: ActivityLogId,
    user_id: UserId,
    user_email: Option<String>,
    action: String,
    entity_type: Option<String>,
    entity_id: Option<String>,
    details: Option<String>,
    ip_address: Option<String>,
    created_at: i64,
}

/// One entry to append.
#[derive(Debug, Clone)]
pub struct NewActivity<'n> {
    pub user_id: UserId,
    pub action: ActivityAction,
    pub entity_id: Option<String>,
    pub details: Option<String>,
    pub ip_address: Option<&'n str>,
}

pub struct ActivityRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ActivityRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record(&self, entry: &NewActivity<'_>) -> Result<ActivityLogId, RepositoryError> {
        Ok(sqlx::query_scalar(
            "INSERT INTO activity_logs (user_id, action, entity_type, entity_id, details, ip_address, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.action.entity_type())
        .bind(&entry.entity_id)
        .bind(&entry.details)
        .bind(entry.ip_address)
        .bind(unix_now())
        .fetch_one(self.pool)
        .await?)
    }

    /// Most recent entries first, optionally for one acting user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recent(
        &self,
        user_id: Option<UserId>,
        limit: i64,
    ) -> Result<Vec<ActivityEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT a.id AS id, a.user_id AS user_id, u.email AS user_email, a.action AS action, \
             a.entity_type AS entity_type, a.entity_id AS entity_id, a.details AS details, \
             a.ip_address AS ip_address, a.created_at AS created_at \
             FROM activity_logs a LEFT JOIN users u ON u.id = a.user_id \
             WHERE (? IS NULL OR a.user_id = ?) \
             ORDER BY a.created_at DESC, a.id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(ActivityEntry {
                    id: r.id,
                    user_id: r.user_id,
                    user_email: r.user_email,
                    action: r.action,
                    entity_type: r.entity_type,
                    entity_id: r.entity_id,
                    details: r.details,
                    ip_address: r.ip_address,
                    created_at: from_unix(r.created_at)?,
                })
            })
            .collect()
    }
}
