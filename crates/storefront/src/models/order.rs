//! Order domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vendora_core::{
    CurrencyCode, Email, OrderId, OrderItemId, OrderStatus, PaymentIntentId, PaymentStatus, Price,
    UserId, VariantId,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub email: Email,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: Price,
    pub payment_intent_id: Option<PaymentIntentId>,
    pub tracking_number: Option<String>,
    pub refund_id: Option<String>,
    pub refund_amount_cents: Option<i64>,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub const fn is_refunded(&self) -> bool {
        self.refund_id.is_some()
    }

    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.total.currency
    }
}

/// Line snapshot taken at purchase time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub variant_id: VariantId,
    pub sku: Option<String>,
    pub title: Option<String>,
    pub quantity: i64,
    pub unit_price: Price,
}

impl OrderItem {
    #[must_use]
    pub const fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Delivery address captured with a client-confirmed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal: String,
    pub country: String,
}

impl ShippingAddress {
    /// Whether every required field has content.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [&self.name, &self.line1, &self.city, &self.postal, &self.country]
            .iter()
            .all(|f| !f.trim().is_empty())
    }
}

/// Admin order page payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderWithItems,
    pub shipping_address: Option<ShippingAddress>,
}
