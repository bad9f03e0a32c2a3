//! Stock hold types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vendora_core::{CheckoutId, PaymentIntentId, ReservationId, ReservationStatus, VariantId};

/// A time-boxed hold on `quantity` units of one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub checkout_id: CheckoutId,
    pub payment_intent_id: Option<PaymentIntentId>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One line of a checkout asking for stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldRequest {
    pub variant_id: VariantId,
    pub quantity: i64,
}

impl HoldRequest {
    /// Merge duplicate variants and drop non-positive quantities, preserving
    /// first-seen order.
    #[must_use]
    pub fn normalize(lines: &[Self]) -> Vec<Self> {
        let mut merged: Vec<Self> = Vec::with_capacity(lines.len());
        for line in lines.iter().filter(|l| l.quantity > 0) {
            match merged.iter_mut().find(|m| m.variant_id == line.variant_id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
                None => merged.push(*line),
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_merges_and_drops() {
        let lines = [
            HoldRequest { variant_id: VariantId::new(1), quantity: 2 },
            HoldRequest { variant_id: VariantId::new(2), quantity: 0 },
            HoldRequest { variant_id: VariantId::new(1), quantity: 3 },
            HoldRequest { variant_id: VariantId::new(3), quantity: -1 },
            HoldRequest { variant_id: VariantId::new(4), quantity: 1 },
        ];
        let normalized = HoldRequest::normalize(&lines);
        assert_eq!(
            normalized,
            vec![
                HoldRequest { variant_id: VariantId::new(1), quantity: 5 },
                HoldRequest { variant_id: VariantId::new(4), quantity: 1 },
            ]
        );
    }
}
