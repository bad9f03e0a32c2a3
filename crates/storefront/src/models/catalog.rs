//! Catalog domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vendora_core::{CategoryId, CurrencyCode, Price, ProductId, VariantId};

use super::ReviewSummary;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub slug: String,
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub active: bool,
    pub category_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub variants: Vec<Variant>,
}

impl Product {
    /// Lowest variant price, used for listing cards.
    #[must_use]
    pub fn from_price(&self) -> Option<Price> {
        self.variants
            .iter()
            .map(|v| v.price)
            .min_by_key(|p| p.amount_cents)
    }
}

/// A purchasable SKU with its stock position.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub title: String,
    pub price: Price,
    pub image: Option<String>,
    /// Free-form JSON attributes (size, color, ...)
    pub attributes: Option<serde_json::Value>,
    pub active: bool,
    pub inventory: InventoryLevel,
}

impl Variant {
    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.price.currency
    }
}

/// Stock counters for one variant.
///
/// Serialized with the derived `available` count alongside the raw counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryLevel {
    pub in_stock: i64,
    pub reserved: i64,
    pub low_stock_level: Option<i64>,
}

impl InventoryLevel {
    /// Units that can still be reserved.
    #[must_use]
    pub const fn available(&self) -> i64 {
        self.in_stock - self.reserved
    }

    /// Whether availability is at or below the variant's own level, or
    /// `threshold` when the variant has none.
    #[must_use]
    pub fn is_low(&self, threshold: i64) -> bool {
        self.available() <= self.low_stock_level.unwrap_or(threshold)
    }
}

impl Serialize for InventoryLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("InventoryLevel", 4)?;
        state.serialize_field("inStock", &self.in_stock)?;
        state.serialize_field("reserved", &self.reserved)?;
        state.serialize_field("available", &self.available())?;
        state.serialize_field("lowStockLevel", &self.low_stock_level)?;
        state.end()
    }
}

/// Product page payload: product, variants and review summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub category: Option<Category>,
    pub reviews: ReviewSummary,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_level_available_and_low() {
        let level = InventoryLevel {
            in_stock: 10,
            reserved: 7,
            low_stock_level: None,
        };
        assert_eq!(level.available(), 3);
        assert!(level.is_low(5));
        assert!(!level.is_low(2));

        let custom = InventoryLevel {
            low_stock_level: Some(1),
            ..level
        };
        assert!(!custom.is_low(5));
    }

    #[test]
    fn test_inventory_level_serializes_available() {
        let level = InventoryLevel {
            in_stock: 4,
            reserved: 1,
            low_stock_level: Some(2),
        };
        let json = serde_json::to_value(level).unwrap();
        assert_eq!(json["available"], 3);
        assert_eq!(json["inStock"], 4);
        assert_eq!(json["lowStockLevel"], 2);
    }
}
