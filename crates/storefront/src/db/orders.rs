//! Orders, their line snapshots and shipping addresses.

use sqlx::{Sqlite, SqlitePool, Transaction};

use vendora_core::{
    CurrencyCode, Email, OrderId, OrderItemId, OrderStatus, PaymentIntentId, PaymentStatus, Price,
    UserId, VariantId,
};

use super::{RepositoryError, from_unix, like_pattern, unix_now};
use crate::models::{Order, OrderDetail, OrderItem, OrderWithItems, ShippingAddress};

const ORDER_COLUMNS: &str = "id, user_id, email, status, payment_status, total_cents, currency, \
     payment_intent_id, tracking_number, refund_id, refund_amount_cents, refund_reason, \
     refunded_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: Option<UserId>,
    email: Email,
    status: OrderStatus,
    payment_status: PaymentStatus,
    total_cents: i64,
    currency: CurrencyCode,
    payment_intent_id: Option<PaymentIntentId>,
    tracking_number: Option<String>,
    refund_id: Option<String>,
    refund_amount_cents: Option<i64>,
    refund_reason: Option<String>,
    refunded_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            email: r.email,
            status: r.status,
            payment_status: r.payment_status,
            total: Price::from_cents(r.total_cents, r.currency),
            payment_intent_id: r.payment_intent_id,
            tracking_number: r.tracking_number,
            refund_id: r.refund_id,
            refund_amount_cents: r.refund_amount_cents,
            refund_reason: r.refund_reason,
            refunded_at: r.refunded_at.map(from_unix).transpose()?,
            created_at: from_unix(r.created_at)?,
            updated_at: from_unix(r.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    variant_id: VariantId,
    sku: Option<String>,
    title: Option<String>,
    quantity: i64,
    unit_price_cents: i64,
    currency: CurrencyCode,
}

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        Self {
            id: r.id,
            variant_id: r.variant_id,
            sku: r.sku,
            title: r.title,
            quantity: r.quantity,
            unit_price: Price::from_cents(r.unit_price_cents, r.currency),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ShippingRow {
    name: String,
    line1: String,
    line2: Option<String>,
    city: String,
    state: Option<String>,
    postal: String,
    country: String,
}

/// One priced line of an order about to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderLine {
    pub variant_id: VariantId,
    pub quantity: i64,
    pub unit_price: Price,
}

/// Everything needed to record a paid order.
#[derive(Debug, Clone)]
pub struct NewOrder<'n> {
    pub email: &'n Email,
    pub user_id: Option<UserId>,
    pub payment_intent_id: &'n PaymentIntentId,
    pub currency: CurrencyCode,
    pub lines: &'n [NewOrderLine],
    pub shipping: Option<&'n ShippingAddress>,
}

impl NewOrder<'_> {
    /// Sum of the line totals.
    #[must_use]
    pub fn total(&self) -> Price {
        let cents = self
            .lines
            .iter()
            .map(|l| l.unit_price.times(l.quantity).amount_cents)
            .fold(0_i64, i64::saturating_add);
        Price::from_cents(cents, self.currency)
    }
}

/// Admin order list filters.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub limit: i64,
}

pub struct OrderRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a completed, paid order.
    ///
    /// At most one order exists per payment intent. When one already does,
    /// it is returned unchanged with `created = false`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[tracing::instrument(skip(self, order), fields(payment_intent_id = %order.payment_intent_id))]
    pub async fn create_paid(
        &self,
        order: &NewOrder<'_>,
    ) -> Result<(OrderWithItems, bool), RepositoryError> {
        let now = unix_now();
        let total = order.total();
        let mut tx = self.pool.begin().await?;

        let inserted: Option<OrderId> = sqlx::query_scalar(
            "INSERT INTO orders (user_id, email, status, payment_status, total_cents, currency, \
             payment_intent_id, created_at, updated_at) \
             VALUES (?, ?, 'COMPLETED', 'succeeded', ?, ?, ?, ?, ?) \
             ON CONFLICT (payment_intent_id) DO NOTHING RETURNING id",
        )
        .bind(order.user_id)
        .bind(order.email)
        .bind(total.amount_cents)
        .bind(total.currency)
        .bind(order.payment_intent_id)
        .bind(now)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order_id) = inserted else {
            tx.rollback().await?;
            let existing = self
                .get_by_payment_intent(order.payment_intent_id)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            return Ok((existing, false));
        };

        for line in order.lines {
            sqlx::query(
                "INSERT INTO order_items (order_id, variant_id, quantity, unit_price_cents, currency) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(line.variant_id)
            .bind(line.quantity)
            .bind(line.unit_price.amount_cents)
            .bind(line.unit_price.currency)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(address) = order.shipping {
            Self::insert_shipping(&mut tx, order_id, address).await?;
        }

        tx.commit().await?;
        tracing::info!(order_id = %order_id, total = %total, "Order recorded");

        let created = self.get(order_id).await?.ok_or(RepositoryError::NotFound)?;
        Ok((created, true))
    }

    async fn insert_shipping(
        tx: &mut Transaction<'_, Sqlite>,
        order_id: OrderId,
        address: &ShippingAddress,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO shipping_addresses (order_id, name, line1, line2, city, state, postal, country) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT (order_id) DO NOTHING",
        )
        .bind(order_id)
        .bind(&address.name)
        .bind(&address.line1)
        .bind(&address.line2)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.postal)
        .bind(&address.country)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Attach a shipping address to an order that has none.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_shipping_address(
        &self,
        order_id: OrderId,
        address: &ShippingAddress,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        Self::insert_shipping(&mut tx, order_id, address).await?;
        tx.commit().await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<OrderWithItems>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
        let Some(row) = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
        else {
            return Ok(None);
        };
        let mut orders = self.with_items(vec![row.try_into()?]).await?;
        Ok(orders.pop())
    }

    /// Order with items and shipping address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_detail(&self, id: OrderId) -> Result<Option<OrderDetail>, RepositoryError> {
        let Some(order) = self.get(id).await? else {
            return Ok(None);
        };
        let shipping = sqlx::query_as::<_, ShippingRow>(
            "SELECT name, line1, line2, city, state, postal, country \
             FROM shipping_addresses WHERE order_id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .map(|r| ShippingAddress {
            name: r.name,
            line1: r.line1,
            line2: r.line2,
            city: r.city,
            state: r.state,
            postal: r.postal,
            country: r.country,
        });
        Ok(Some(OrderDetail {
            order,
            shipping_address: shipping,
        }))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_payment_intent(
        &self,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let id: Option<OrderId> =
            sqlx::query_scalar("SELECT id FROM orders WHERE payment_intent_id = ?")
                .bind(payment_intent_id)
                .fetch_optional(self.pool)
                .await?;
        match id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    /// A customer's orders, newest first. Matches the account id or, for
    /// guest checkouts, the email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_customer(
        &self,
        user_id: UserId,
        email: &Email,
    ) -> Result<Vec<OrderWithItems>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ? OR email = ? \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id)
            .bind(email)
            .fetch_all(self.pool)
            .await?;
        let orders = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        self.with_items(orders).await
    }

    async fn with_items(&self, orders: Vec<Order>) -> Result<Vec<OrderWithItems>, RepositoryError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = sqlx::QueryBuilder::<Sqlite>::new(
            "SELECT oi.id AS id, oi.order_id AS order_id, oi.variant_id AS variant_id, \
             v.sku AS sku, p.title AS title, oi.quantity AS quantity, \
             oi.unit_price_cents AS unit_price_cents, oi.currency AS currency \
             FROM order_items oi \
             LEFT JOIN product_variants v ON v.id = oi.variant_id \
             LEFT JOIN products p ON p.id = v.product_id \
             WHERE oi.order_id IN (",
        );
        let mut ids = qb.separated(", ");
        for order in &orders {
            ids.push_bind(order.id);
        }
        ids.push_unseparated(") ORDER BY oi.id");

        let mut items: Vec<OrderItemRow> = qb.build_query_as().fetch_all(self.pool).await?;

        Ok(orders
            .into_iter()
            .map(|order| {
                let (mine, rest): (Vec<_>, Vec<_>) =
                    std::mem::take(&mut items).into_iter().partition(|i| i.order_id == order.id);
                items = rest;
                OrderWithItems {
                    order,
                    items: mine.into_iter().map(OrderItem::from).collect(),
                }
            })
            .collect())
    }

    /// Admin listing, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let search = filter.search.as_deref().map(like_pattern);
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE (? IS NULL OR status = ?) \
               AND (? IS NULL OR CAST(id AS TEXT) LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\') \
             ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(filter.status)
            .bind(filter.status)
            .bind(search.as_deref())
            .bind(search.as_deref())
            .bind(search.as_deref())
            .bind(filter.limit)
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    /// Orders created at or after `since`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_since(&self, since: i64) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE created_at >= ? ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(since)
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    /// Count and summed total per order status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn status_counts(&self) -> Result<Vec<(OrderStatus, i64, i64)>, RepositoryError> {
        Ok(sqlx::query_as(
            "SELECT status, COUNT(*), COALESCE(SUM(total_cents), 0) FROM orders \
             GROUP BY status ORDER BY status",
        )
        .fetch_all(self.pool)
        .await?)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(self.pool)
            .await?)
    }

    /// Revenue from completed, succeeded orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn revenue_cents(&self) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_cents), 0) FROM orders \
             WHERE status = 'COMPLETED' AND payment_status = 'succeeded'",
        )
        .fetch_one(self.pool)
        .await?)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(unix_now())
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn set_tracking(&self, id: OrderId, tracking: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE orders SET tracking_number = ?, updated_at = ? WHERE id = ?")
            .bind(tracking)
            .bind(unix_now())
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Update the payment status of the order paid by `payment_intent_id`,
    /// if any. Refunded orders keep their status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_payment_status(
        &self,
        payment_intent_id: &PaymentIntentId,
        status: PaymentStatus,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE orders SET payment_status = ?, updated_at = ? \
             WHERE payment_intent_id = ? AND payment_status != 'refunded'",
        )
        .bind(status)
        .bind(unix_now())
        .bind(payment_intent_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record a processor refund. Only the first refund of an order sticks.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order was already refunded
    /// and `RepositoryError::NotFound` if it doesn't exist.
    pub async fn record_refund(
        &self,
        id: OrderId,
        refund_id: &str,
        amount_cents: i64,
        reason: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let now = unix_now();
        let result = sqlx::query(
            "UPDATE orders SET refund_id = ?, refund_amount_cents = ?, refund_reason = ?, \
             refunded_at = ?, status = 'CANCELLED', payment_status = 'refunded', updated_at = ? \
             WHERE id = ? AND refund_id IS NULL",
        )
        .bind(refund_id)
        .bind(amount_cents)
        .bind(reason)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(_) => Err(RepositoryError::Conflict("order already refunded".to_owned())),
                None => Err(RepositoryError::NotFound),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_order_total() {
        let email = Email::parse("a@b.co").unwrap();
        let pi = PaymentIntentId::new("pi_1");
        let lines = [
            NewOrderLine {
                variant_id: VariantId::new(1),
                quantity: 2,
                unit_price: Price::from_cents(1999, CurrencyCode::Usd),
            },
            NewOrderLine {
                variant_id: VariantId::new(2),
                quantity: 1,
                unit_price: Price::from_cents(500, CurrencyCode::Usd),
            },
        ];
        let order = NewOrder {
            email: &email,
            user_id: None,
            payment_intent_id: &pi,
            currency: CurrencyCode::Usd,
            lines: &lines,
            shipping: None,
        };
        assert_eq!(order.total().amount_cents, 4498);
    }

    #[test]
    fn test_new_order_total_saturates() {
        let email = Email::parse("a@b.co").unwrap();
        let pi = PaymentIntentId::new("pi_1");
        let line = NewOrderLine {
            variant_id: VariantId::new(1),
            quantity: i64::MAX / 2,
            unit_price: Price::from_cents(1000, CurrencyCode::Usd),
        };
        let lines = [line, line];
        let order = NewOrder {
            email: &email,
            user_id: None,
            payment_intent_id: &pi,
            currency: CurrencyCode::Usd,
            lines: &lines,
            shipping: None,
        };
        assert_eq!(order.total().amount_cents, i64::MAX);
    }
}
