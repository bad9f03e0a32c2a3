//! Revenue summary and transaction export.

use std::fmt::Write as _;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use vendora_core::{OrderStatus, PaymentStatus, Permission, Price};

use crate::db::{OrderRepository, unix_now};
use crate::error::Result;
use crate::middleware::RequireStaff;
use crate::models::Order;
use crate::state::AppState;

const DEFAULT_PERIOD_DAYS: i64 = 30;
const MAX_PERIOD_DAYS: i64 = 3650;

const CSV_HEADER: &str = "Date,Order ID,Customer Email,Amount (USD),Currency,Payment Status,\
Order Status,Payment Intent ID,Refund ID,Refund Amount";

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    /// Days to look back.
    pub period: Option<i64>,
}

impl PeriodQuery {
    fn days(&self) -> i64 {
        self.period
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_PERIOD_DAYS)
            .min(MAX_PERIOD_DAYS)
    }

    fn since(&self) -> i64 {
        unix_now() - self.days() * 86_400
    }
}

/// Totals over a set of orders, in cents of the store currency.
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    gross_cents: i64,
    refunded_cents: i64,
    order_count: usize,
    paid_count: usize,
    refund_count: usize,
    cancelled_count: usize,
}

impl Summary {
    fn of(orders: &[Order]) -> Self {
        orders.iter().fold(Self::default(), |mut acc, order| {
            acc.order_count += 1;
            if matches!(
                order.payment_status,
                PaymentStatus::Succeeded | PaymentStatus::Refunded
            ) {
                acc.paid_count += 1;
                acc.gross_cents += order.total.amount_cents;
            }
            if let Some(refund) = order.refund_amount_cents {
                acc.refund_count += 1;
                acc.refunded_cents += refund;
            }
            if order.status == OrderStatus::Cancelled {
                acc.cancelled_count += 1;
            }
            acc
        })
    }

    const fn net_cents(&self) -> i64 {
        self.gross_cents - self.refunded_cents
    }
}

/// `GET /api/admin/finance?period=30`
pub async fn summary(
    State(state): State<AppState>,
    staff: RequireStaff,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Value>> {
    staff.require(Permission::ViewFinance)?;
    let orders = OrderRepository::new(state.pool())
        .list_since(query.since())
        .await?;
    let summary = Summary::of(&orders);
    let currency = state.settings().await?.currency;

    let average_cents = i64::try_from(summary.paid_count)
        .ok()
        .filter(|n| *n > 0)
        .map_or(0, |n| summary.gross_cents / n);

    Ok(Json(json!({
        "periodDays": query.days(),
        "currency": currency,
        "grossCents": summary.gross_cents,
        "refundedCents": summary.refunded_cents,
        "netCents": summary.net_cents(),
        "averageOrderCents": average_cents,
        "orderCount": summary.order_count,
        "paidCount": summary.paid_count,
        "refundCount": summary.refund_count,
        "cancelledCount": summary.cancelled_count,
        "recent": orders.iter().take(20).collect::<Vec<_>>(),
    })))
}

/// `GET /api/admin/finance/export?period=30`
///
/// Every order in the period as CSV, newest first.
#[tracing::instrument(skip(state, staff))]
pub async fn export(
    State(state): State<AppState>,
    staff: RequireStaff,
    Query(query): Query<PeriodQuery>,
) -> Result<Response> {
    let actor = staff.require(Permission::ExportData)?;
    let orders = OrderRepository::new(state.pool())
        .list_since(query.since())
        .await?;
    tracing::info!(user_id = %actor.id, rows = orders.len(), "Exporting transactions");

    let filename = format!("transactions-{}.csv", Utc::now().format("%Y-%m-%d"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/csv")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        transactions_csv(&orders),
    )
        .into_response())
}

fn transactions_csv(orders: &[Order]) -> String {
    let mut csv = String::from(CSV_HEADER);
    for order in orders {
        let refund_amount = order
            .refund_amount_cents
            .map(|cents| Price::from_cents(cents, order.currency()).to_decimal().to_string())
            .unwrap_or_default();
        let cells = [
            order.created_at.to_rfc3339(),
            order.id.to_string(),
            order.email.to_string(),
            order.total.to_decimal().to_string(),
            order.currency().to_string(),
            order.payment_status.to_string(),
            order.status.to_string(),
            order
                .payment_intent_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            order.refund_id.clone().unwrap_or_default(),
            refund_amount,
        ];
        csv.push('\n');
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                csv.push(',');
            }
            let _ = write!(csv, "\"{}\"", cell.replace('"', "\"\""));
        }
    }
    csv
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use vendora_core::{CurrencyCode, Email, OrderId, PaymentIntentId};

    fn order(id: i64, cents: i64, payment_status: PaymentStatus) -> Order {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Order {
            id: OrderId::new(id),
            user_id: None,
            email: Email::parse("buyer@example.com").unwrap(),
            status: OrderStatus::Completed,
            payment_status,
            total: Price::from_cents(cents, CurrencyCode::Usd),
            payment_intent_id: Some(PaymentIntentId::new(format!("pi_{id}"))),
            tracking_number: None,
            refund_id: None,
            refund_amount_cents: None,
            refund_reason: None,
            refunded_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_summary_counts_paid_and_refunded() {
        let mut refunded = order(2, 500, PaymentStatus::Refunded);
        refunded.status = OrderStatus::Cancelled;
        refunded.refund_id = Some("re_1".to_string());
        refunded.refund_amount_cents = Some(500);

        let orders = [
            order(1, 1999, PaymentStatus::Succeeded),
            refunded,
            order(3, 700, PaymentStatus::Pending),
        ];
        let summary = Summary::of(&orders);
        assert_eq!(summary.order_count, 3);
        assert_eq!(summary.paid_count, 2);
        assert_eq!(summary.gross_cents, 2499);
        assert_eq!(summary.refunded_cents, 500);
        assert_eq!(summary.net_cents(), 1999);
        assert_eq!(summary.refund_count, 1);
        assert_eq!(summary.cancelled_count, 1);
    }

    #[test]
    fn test_transactions_csv() {
        let mut refunded = order(7, 1999, PaymentStatus::Refunded);
        refunded.refund_id = Some("re_\"x\"".to_string());
        refunded.refund_amount_cents = Some(1000);

        let csv = transactions_csv(&[refunded]);
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER);
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"2023-11-14T22:13:20+00:00\",\"7\",\"buyer@example.com\",\"19.99\",\"usd\",\"refunded\""));
        assert!(row.contains("\"pi_7\""));
        assert!(row.contains("\"re_\"\"x\"\"\""));
        assert!(row.ends_with("\"10.00\""));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_period_days() {
        assert_eq!(PeriodQuery { period: None }.days(), 30);
        assert_eq!(PeriodQuery { period: Some(-4) }.days(), 30);
        assert_eq!(PeriodQuery { period: Some(7) }.days(), 7);
        assert_eq!(PeriodQuery { period: Some(100_000) }.days(), MAX_PERIOD_DAYS);
    }
}
