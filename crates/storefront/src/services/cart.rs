//! Server-side cart pricing.
//!
//! The cart lives in the browser; every price it shows is recomputed here
//! from the catalog before a quote or a checkout.

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use vendora_core::{CurrencyCode, Price, ProductId, VariantId};

use crate::db::{CatalogRepository, RepositoryError};
use crate::models::{HoldRequest, Variant};

#[derive(Debug, Error)]
pub enum CartError {
    #[error("cart is empty")]
    Empty,

    #[error("variant {0} does not exist or is not for sale")]
    UnknownVariant(VariantId),

    #[error("cart mixes currencies")]
    MixedCurrency,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A cart line priced from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub title: String,
    pub image: Option<String>,
    pub unit_price: Price,
    pub quantity: i64,
    /// Units that could be reserved when the cart was priced.
    pub available: i64,
    pub line_total: Price,
}

impl CartLine {
    fn new(variant: &Variant, quantity: i64) -> Self {
        Self {
            variant_id: variant.id,
            product_id: variant.product_id,
            sku: variant.sku.clone(),
            title: variant.title.clone(),
            image: variant.image.clone(),
            unit_price: variant.price,
            quantity,
            available: variant.inventory.available(),
            line_total: variant.price.times(quantity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedCart {
    pub lines: Vec<CartLine>,
    pub currency: CurrencyCode,
    pub total: Price,
}

impl PricedCart {
    fn from_lines(lines: Vec<CartLine>, currency: CurrencyCode) -> Self {
        let cents = lines
            .iter()
            .fold(0_i64, |acc, l| acc.saturating_add(l.line_total.amount_cents));
        Self {
            lines,
            currency,
            total: Price::from_cents(cents, currency),
        }
    }

    /// The stock holds a checkout of this cart needs.
    #[must_use]
    pub fn hold_requests(&self) -> Vec<HoldRequest> {
        self.lines
            .iter()
            .map(|l| HoldRequest {
                variant_id: l.variant_id,
                quantity: l.quantity,
            })
            .collect()
    }

    /// Clamp every quantity to what is available, dropping lines with none.
    #[must_use]
    pub fn clamp_to_available(self) -> Self {
        let currency = self.currency;
        let lines = self
            .lines
            .into_iter()
            .filter_map(|line| {
                let quantity = line.quantity.min(line.available);
                (quantity > 0).then(|| CartLine {
                    quantity,
                    line_total: line.unit_price.times(quantity),
                    ..line
                })
            })
            .collect();
        Self::from_lines(lines, currency)
    }
}

/// Price `items` against purchasable variants.
///
/// Duplicate variants are merged and non-positive quantities dropped first.
///
/// # Errors
///
/// Returns `CartError::Empty` when nothing positive remains,
/// `UnknownVariant` for a missing or inactive variant, and `MixedCurrency`
/// when the variants are priced in different currencies.
pub async fn price_cart(pool: &SqlitePool, items: &[HoldRequest]) -> Result<PricedCart, CartError> {
    let requested = HoldRequest::normalize(items);
    if requested.is_empty() {
        return Err(CartError::Empty);
    }

    let ids: Vec<VariantId> = requested.iter().map(|r| r.variant_id).collect();
    let variants = CatalogRepository::new(pool).purchasable_variants(&ids).await?;

    let lines = requested
        .iter()
        .map(|req| {
            variants
                .iter()
                .find(|v| v.id == req.variant_id)
                .map(|v| CartLine::new(v, req.quantity))
                .ok_or(CartError::UnknownVariant(req.variant_id))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let currency = single_currency(&lines)?;
    Ok(PricedCart::from_lines(lines, currency))
}

fn single_currency(lines: &[CartLine]) -> Result<CurrencyCode, CartError> {
    let mut currencies = lines.iter().map(|l| l.unit_price.currency);
    let first = currencies.next().ok_or(CartError::Empty)?;
    if currencies.all(|c| c == first) {
        Ok(first)
    } else {
        Err(CartError::MixedCurrency)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(variant: i64, cents: i64, quantity: i64, available: i64) -> CartLine {
        let unit_price = Price::from_cents(cents, CurrencyCode::Usd);
        CartLine {
            variant_id: VariantId::new(variant),
            product_id: ProductId::new(1),
            sku: format!("SKU-{variant}"),
            title: "Default".to_owned(),
            image: None,
            unit_price,
            quantity,
            available,
            line_total: unit_price.times(quantity),
        }
    }

    #[test]
    fn test_total_and_hold_requests() {
        let cart = PricedCart::from_lines(vec![line(1, 1250, 2, 5), line(2, 300, 1, 1)], CurrencyCode::Usd);
        assert_eq!(cart.total.amount_cents, 2800);
        let holds = cart.hold_requests();
        assert_eq!(holds.len(), 2);
        assert_eq!(holds[0].quantity, 2);
    }

    #[test]
    fn test_huge_quantities_saturate_the_total() {
        let cart = PricedCart::from_lines(
            vec![line(1, 1000, i64::MAX / 2, 0), line(2, 1000, i64::MAX / 2, 0)],
            CurrencyCode::Usd,
        );
        assert_eq!(cart.total.amount_cents, i64::MAX);

        let clamped = cart.clamp_to_available();
        assert!(clamped.lines.is_empty());
        assert_eq!(clamped.total.amount_cents, 0);
    }

    #[test]
    fn test_clamp_to_available() {
        let cart = PricedCart::from_lines(
            vec![line(1, 1000, 5, 3), line(2, 500, 1, 0), line(3, 200, 2, 9)],
            CurrencyCode::Usd,
        )
        .clamp_to_available();
        assert_eq!(cart.lines.len(), 2);
        assert_eq!(cart.lines[0].quantity, 3);
        assert_eq!(cart.lines[0].line_total.amount_cents, 3000);
        assert_eq!(cart.total.amount_cents, 3400);
    }

    #[test]
    fn test_single_currency() {
        let mut eur = line(2, 100, 1, 1);
        eur.unit_price = Price::from_cents(100, CurrencyCode::Eur);
        assert!(matches!(
            single_currency(&[line(1, 100, 1, 1), eur]),
            Err(CartError::MixedCurrency)
        ));
        assert_eq!(single_currency(&[line(1, 100, 1, 1)]).unwrap(), CurrencyCode::Usd);
    }
}
