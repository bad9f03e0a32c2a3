//! Prices stored as integer minor units with a currency.
//!
//! The database and the payment processor both speak in cents; the decimal
//! form only appears at the edges (admin forms, CSV exports, email bodies).

use core::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Errors that can occur when converting a decimal amount into a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("price cannot be negative")]
    Negative,
    #[error("price is too large")]
    Overflow,
    #[error("unsupported currency: {0}")]
    UnknownCurrency(String),
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    /// Amount in the currency's minor unit (e.g., cents).
    pub amount_cents: i64,
    pub currency: CurrencyCode,
}

impl Price {
    #[must_use]
    pub const fn from_cents(amount_cents: i64, currency: CurrencyCode) -> Self {
        Self {
            amount_cents,
            currency,
        }
    }

    /// Convert a major-unit amount (e.g., `19.99`) into cents, rounding
    /// half-away-from-zero to two places.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative or does not fit in `i64` cents.
    pub fn from_decimal(amount: Decimal, currency: CurrencyCode) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        let cents = amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(PriceError::Overflow)?
            .round_dp(0)
            .to_i64()
            .ok_or(PriceError::Overflow)?;
        Ok(Self::from_cents(cents, currency))
    }

    /// Amount in major units (e.g., dollars).
    #[must_use]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.amount_cents, 2)
    }

    /// Multiply by a line quantity, saturating on overflow.
    #[must_use]
    pub const fn times(&self, quantity: i64) -> Self {
        Self::from_cents(self.amount_cents.saturating_mul(quantity), self.currency)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:.2}", self.currency.symbol(), self.to_decimal())
    }
}

/// ISO 4217 currency codes accepted by the store.
///
/// Stored and sent to the payment processor in lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlite", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlite", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum CurrencyCode {
    #[default]
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
}

impl CurrencyCode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
            Self::Cad => "cad",
            Self::Aud => "aud",
        }
    }

    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Usd | Self::Cad | Self::Aud => "$",
            Self::Eur => "€",
            Self::Gbp => "£",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            "cad" => Ok(Self::Cad),
            "aud" => Ok(Self::Aud),
            _ => Err(PriceError::UnknownCurrency(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_display_formats_major_units() {
        assert_eq!(Price::from_cents(1999, CurrencyCode::Usd).to_string(), "$19.99");
        assert_eq!(Price::from_cents(5, CurrencyCode::Gbp).to_string(), "£0.05");
        assert_eq!(Price::from_cents(120_000, CurrencyCode::Eur).to_string(), "€1200.00");
    }

    #[test]
    fn test_from_decimal_rounds_to_cents() {
        let price = Price::from_decimal(Decimal::from_str("19.995").unwrap(), CurrencyCode::Usd);
        assert_eq!(price.unwrap().amount_cents, 2000);

        let price = Price::from_decimal(Decimal::from_str("7").unwrap(), CurrencyCode::Usd);
        assert_eq!(price.unwrap().amount_cents, 700);
    }

    #[test]
    fn test_from_decimal_rejects_negative() {
        let result = Price::from_decimal(Decimal::from_str("-0.01").unwrap(), CurrencyCode::Usd);
        assert_eq!(result, Err(PriceError::Negative));
    }

    #[test]
    fn test_times() {
        let line = Price::from_cents(250, CurrencyCode::Usd).times(3);
        assert_eq!(line.amount_cents, 750);
    }

    #[test]
    fn test_currency_parse_is_case_insensitive() {
        assert_eq!(CurrencyCode::from_str("USD").unwrap(), CurrencyCode::Usd);
        assert_eq!(CurrencyCode::from_str(" eur ").unwrap(), CurrencyCode::Eur);
        assert!(CurrencyCode::from_str("xyz").is_err());
        assert_eq!(
            serde_json::to_string(&CurrencyCode::Cad).unwrap(),
            "\"cad\""
        );
    }
}
