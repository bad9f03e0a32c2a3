//! Stock holds and the counters they move.
//!
//! A hold is `ACTIVE` from checkout until its payment resolves. Capturing
//! consumes the held units (`in_stock` and `reserved` both drop); releasing
//! returns them (`reserved` drops). Every transition is a conditional
//! `UPDATE ... WHERE status = 'ACTIVE' RETURNING`, so a hold changes state at
//! most once no matter how many webhooks, sweeps or client calls race for it.
//!
//! Each transaction starts with a write. `SQLite` takes the database write
//! lock on the first write, and starting with one means a transaction never
//! has to upgrade from a read snapshot that another writer has invalidated.

use std::time::Duration;

use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use vendora_core::{CheckoutId, PaymentIntentId, ReservationId, ReservationStatus, VariantId};

use super::{RepositoryError, from_unix, unix_now};
use crate::models::{HoldRequest, Reservation};

const RESERVATION_COLUMNS: &str =
    "id, variant_id, quantity, status, checkout_id, payment_intent_id, expires_at, created_at";

/// Errors from taking stock holds.
#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("no items requested")]
    Empty,

    #[error("variant {0} does not exist or is not for sale")]
    UnknownVariant(VariantId),

    #[error("insufficient stock for variant {variant_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variant_id: VariantId,
        requested: i64,
        available: i64,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for ReservationError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: ReservationId,
    variant_id: VariantId,
    quantity: i64,
    status: ReservationStatus,
    checkout_id: CheckoutId,
    payment_intent_id: Option<PaymentIntentId>,
    expires_at: i64,
    created_at: i64,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = RepositoryError;

    fn try_from(r: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            variant_id: r.variant_id,
            quantity: r.quantity,
            status: r.status,
            checkout_id: r.checkout_id,
            payment_intent_id: r.payment_intent_id,
            expires_at: from_unix(r.expires_at)?,
            created_at: from_unix(r.created_at)?,
        })
    }
}

fn into_reservations(rows: Vec<ReservationRow>) -> Result<Vec<Reservation>, RepositoryError> {
    rows.into_iter().map(Reservation::try_from).collect()
}

/// Which holds a transition applies to.
#[derive(Clone, Copy)]
enum Selector<'s> {
    PaymentIntent(&'s PaymentIntentId),
    Checkout(&'s CheckoutId),
    ExpiredAt(i64),
}

pub struct ReservationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ReservationRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Hold stock for every line of a checkout.
    ///
    /// Duplicate variants are merged and non-positive quantities dropped.
    /// Either every line is held or none is: the first line that names an
    /// unknown variant or lacks stock rolls the whole transaction back.
    ///
    /// # Errors
    ///
    /// Returns `ReservationError::Empty` when no positive line remains,
    /// `UnknownVariant` for missing or inactive variants, and
    /// `InsufficientStock` when `in_stock - reserved < quantity`.
    #[tracing::instrument(skip(self, items), fields(checkout_id = %checkout_id, lines = items.len()))]
    pub async fn create_reservation(
        &self,
        items: &[HoldRequest],
        checkout_id: &CheckoutId,
        ttl: Duration,
    ) -> Result<Vec<Reservation>, ReservationError> {
        let lines = HoldRequest::normalize(items);
        if lines.is_empty() {
            return Err(ReservationError::Empty);
        }

        let now = unix_now();
        let expires_at = now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));

        let mut tx = self.pool.begin().await?;
        let mut held = Vec::with_capacity(lines.len());

        for line in &lines {
            let updated = sqlx::query(
                "UPDATE inventory SET reserved = reserved + ?, updated_at = ? \
                 WHERE variant_id = ? AND in_stock - reserved >= ? \
                   AND EXISTS (SELECT 1 FROM product_variants v JOIN products p ON p.id = v.product_id \
                               WHERE v.id = inventory.variant_id AND v.active = 1 AND p.active = 1)",
            )
            .bind(line.quantity)
            .bind(now)
            .bind(line.variant_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                let err = Self::explain_shortfall(&mut tx, line).await?;
                tx.rollback().await?;
                tracing::info!(variant_id = %line.variant_id, error = %err, "Stock hold refused");
                return Err(err);
            }

            let sql = format!(
                "INSERT INTO reservations (variant_id, quantity, status, checkout_id, expires_at, created_at) \
                 VALUES (?, ?, 'ACTIVE', ?, ?, ?) RETURNING {RESERVATION_COLUMNS}"
            );
            let row = sqlx::query_as::<_, ReservationRow>(&sql)
                .bind(line.variant_id)
                .bind(line.quantity)
                .bind(checkout_id)
                .bind(expires_at)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
            held.push(Reservation::try_from(row)?);
        }

        tx.commit().await?;
        tracing::debug!(holds = held.len(), "Stock held");
        Ok(held)
    }

    /// Work out why a conditional hold update matched nothing.
    async fn explain_shortfall(
        tx: &mut Transaction<'_, Sqlite>,
        line: &HoldRequest,
    ) -> Result<ReservationError, ReservationError> {
        let row: Option<(i64, i64, bool)> = sqlx::query_as(
            "SELECT COALESCE(i.in_stock, 0), COALESCE(i.reserved, 0), (v.active = 1 AND p.active = 1) \
             FROM product_variants v \
             JOIN products p ON p.id = v.product_id \
             LEFT JOIN inventory i ON i.variant_id = v.id \
             WHERE v.id = ?",
        )
        .bind(line.variant_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(match row {
            Some((in_stock, reserved, true)) => ReservationError::InsufficientStock {
                variant_id: line.variant_id,
                requested: line.quantity,
                available: in_stock - reserved,
            },
            _ => ReservationError::UnknownVariant(line.variant_id),
        })
    }

    /// Link a checkout's active holds to the payment intent created for it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn attach_payment_intent(
        &self,
        checkout_id: &CheckoutId,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE reservations SET payment_intent_id = ? \
             WHERE checkout_id = ? AND status = 'ACTIVE'",
        )
        .bind(payment_intent_id)
        .bind(checkout_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Capture every active hold of a payment intent and return the holds
    /// that changed state in this call.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[tracing::instrument(skip(self), fields(payment_intent_id = %payment_intent_id))]
    async fn capture_holds(
        &self,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<Vec<Reservation>, RepositoryError> {
        self.transition(
            Selector::PaymentIntent(payment_intent_id),
            ReservationStatus::Captured,
        )
        .await
    }

    /// Release every active hold of a payment intent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[tracing::instrument(skip(self), fields(payment_intent_id = %payment_intent_id))]
    pub async fn release_holds(
        &self,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<Vec<Reservation>, RepositoryError> {
        self.transition(
            Selector::PaymentIntent(payment_intent_id),
            ReservationStatus::Released,
        )
        .await
    }

    /// Capture the holds of a payment intent.
    ///
    /// Returns the first hold captured by this call, or the first existing
    /// hold when nothing was active (a replay), or `None` when the intent
    /// has no holds at all.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn capture_reservation(
        &self,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let captured = self.capture_holds(payment_intent_id).await?;
        self.first_or_existing(captured, payment_intent_id).await
    }

    /// Capture all active holds of a payment intent, returning how many moved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn capture_all_reservations(
        &self,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<usize, RepositoryError> {
        Ok(self.capture_holds(payment_intent_id).await?.len())
    }

    /// Release the holds of a payment intent. Same return contract as
    /// [`capture_reservation`](Self::capture_reservation).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn release_reservation(
        &self,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let released = self.release_holds(payment_intent_id).await?;
        self.first_or_existing(released, payment_intent_id).await
    }

    /// Release the active holds of a checkout that never got a payment intent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[tracing::instrument(skip(self), fields(checkout_id = %checkout_id))]
    pub async fn release_checkout(
        &self,
        checkout_id: &CheckoutId,
    ) -> Result<Vec<Reservation>, RepositoryError> {
        self.transition(Selector::Checkout(checkout_id), ReservationStatus::Released)
            .await
    }

    /// Release every active hold whose `expires_at` is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn release_expired_reservations(
        &self,
        now: i64,
    ) -> Result<Vec<Reservation>, RepositoryError> {
        self.transition(Selector::ExpiredAt(now), ReservationStatus::Released)
            .await
    }

    async fn first_or_existing(
        &self,
        changed: Vec<Reservation>,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<Option<Reservation>, RepositoryError> {
        if let Some(first) = changed.into_iter().next() {
            return Ok(Some(first));
        }
        Ok(self
            .list_by_payment_intent(payment_intent_id)
            .await?
            .into_iter()
            .next())
    }

    /// Flip the selected active holds to `target` and move the counters.
    async fn transition(
        &self,
        selector: Selector<'_>,
        target: ReservationStatus,
    ) -> Result<Vec<Reservation>, RepositoryError> {
        let (filter, bind_text, bind_int) = match selector {
            Selector::PaymentIntent(id) => ("payment_intent_id = ?", Some(id.as_str()), None),
            Selector::Checkout(id) => ("checkout_id = ?", Some(id.as_str()), None),
            Selector::ExpiredAt(now) => ("expires_at <= ?", None, Some(now)),
        };

        let now = unix_now();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE reservations SET status = ? WHERE status = 'ACTIVE' AND {filter} \
             RETURNING {RESERVATION_COLUMNS}"
        );
        let query = sqlx::query_as::<_, ReservationRow>(&sql).bind(target);
        let query = match (bind_text, bind_int) {
            (Some(text), _) => query.bind(text),
            (None, Some(int)) => query.bind(int),
            (None, None) => query,
        };
        let mut rows = query.fetch_all(&mut *tx).await?;
        rows.sort_by_key(|row| row.id);

        for row in &rows {
            let query = if target == ReservationStatus::Captured {
                sqlx::query(
                    "UPDATE inventory SET in_stock = in_stock - ?, reserved = reserved - ?, \
                     updated_at = ? WHERE variant_id = ?",
                )
                .bind(row.quantity)
                .bind(row.quantity)
            } else {
                sqlx::query(
                    "UPDATE inventory SET reserved = reserved - ?, updated_at = ? WHERE variant_id = ?",
                )
                .bind(row.quantity)
            };
            query
                .bind(now)
                .bind(row.variant_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let changed = into_reservations(rows)?;
        if !changed.is_empty() {
            tracing::info!(
                status = target.as_str(),
                holds = changed.len(),
                units = changed.iter().map(|r| r.quantity).sum::<i64>(),
                "Reservations transitioned"
            );
        }
        Ok(changed)
    }

    /// All holds linked to a payment intent, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_payment_intent(
        &self,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<Vec<Reservation>, RepositoryError> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE payment_intent_id = ? ORDER BY id"
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(payment_intent_id)
            .fetch_all(self.pool)
            .await?;
        into_reservations(rows)
    }

    /// Admin listing, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        status: Option<ReservationStatus>,
        limit: i64,
    ) -> Result<Vec<Reservation>, RepositoryError> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE (? IS NULL OR status = ?) \
             ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(status)
            .bind(status)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        into_reservations(rows)
    }

    /// Total units currently held for a variant.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active_units(&self, variant_id: VariantId) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM reservations \
             WHERE variant_id = ? AND status = 'ACTIVE'",
        )
        .bind(variant_id)
        .fetch_one(self.pool)
        .await?)
    }
}
