//! Opaque references shared with the payment processor.

use serde::{Deserialize, Serialize};

/// A processor-issued payment intent identifier (`pi_...`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlite", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlite", sqlx(transparent))]
#[serde(transparent)]
pub struct PaymentIntentId(String);

impl PaymentIntentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PaymentIntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Groups the stock holds created by one checkout attempt.
///
/// Holds are taken before the payment intent exists, so they are keyed by
/// this locally generated id first and linked to the intent afterwards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlite", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlite", sqlx(transparent))]
#[serde(transparent)]
pub struct CheckoutId(String);

impl CheckoutId {
    /// Generate a fresh random checkout id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("chk_{}", uuid::Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CheckoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_checkout_ids_are_unique_and_prefixed() {
        let a = CheckoutId::generate();
        let b = CheckoutId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("chk_"));
        assert_eq!(a.as_str().len(), 4 + 32);
    }
}
