//! Availability notifications and the expired-hold sweeper.

use std::collections::BTreeSet;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::watch;

use vendora_core::{PaymentIntentId, VariantId};

use crate::db::{InventoryRepository, RepositoryError, ReservationRepository, unix_now};
use crate::models::Reservation;
use crate::services::realtime::RealtimePublisher;
use crate::services::stripe::StripeClient;

/// Distinct variants touched by a set of holds, in id order.
#[must_use]
pub fn variants_of(holds: &[Reservation]) -> Vec<VariantId> {
    holds
        .iter()
        .map(|r| r.variant_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Read the current availability of `variant_ids` and publish it.
///
/// Read failures are logged; notifications never fail the caller.
pub async fn publish_levels(pool: &SqlitePool, realtime: &RealtimePublisher, variant_ids: &[VariantId]) {
    if variant_ids.is_empty() {
        return;
    }
    match InventoryRepository::new(pool).availability(variant_ids).await {
        Ok(levels) => realtime.publish_availability(&levels).await,
        Err(e) => tracing::warn!(error = %e, "Failed to read availability for publishing"),
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub released_holds: usize,
    pub released_units: i64,
    pub variants: Vec<VariantId>,
    pub payment_intents: Vec<PaymentIntentId>,
}

/// Release every hold that expired at or before `now`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the release transaction fails.
pub async fn release_expired(pool: &SqlitePool, now: i64) -> Result<SweepReport, RepositoryError> {
    let released = ReservationRepository::new(pool)
        .release_expired_reservations(now)
        .await?;

    let payment_intents: Vec<PaymentIntentId> = released
        .iter()
        .filter_map(|r| r.payment_intent_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    Ok(SweepReport {
        released_holds: released.len(),
        released_units: released.iter().map(|r| r.quantity).sum(),
        variants: variants_of(&released),
        payment_intents,
    })
}

/// Everything a sweep needs, cloned out of the application state.
#[derive(Clone)]
pub struct Sweeper {
    pub pool: SqlitePool,
    pub stripe: StripeClient,
    pub realtime: RealtimePublisher,
}

impl Sweeper {
    /// Release expired holds, publish the freed stock and cancel the
    /// abandoned payment intents.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the release transaction fails.
    /// Publishing and cancellation failures are only logged.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<SweepReport, RepositoryError> {
        let report = release_expired(&self.pool, unix_now()).await?;
        if report.released_holds == 0 {
            return Ok(report);
        }

        tracing::info!(
            holds = report.released_holds,
            units = report.released_units,
            "Released expired reservations"
        );

        publish_levels(&self.pool, &self.realtime, &report.variants).await;

        // A customer who pays after this point is handled by the late
        // success path in the payment service.
        for id in &report.payment_intents {
            if let Err(e) = self.stripe.cancel_payment_intent(id).await {
                tracing::warn!(payment_intent_id = %id, error = %e, "Failed to cancel expired payment intent");
            }
        }

        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` flips to `true`.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(interval_secs = interval.as_secs(), "Reservation sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Reservation sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Reservation sweeper stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use vendora_core::{CheckoutId, ReservationId, ReservationStatus};

    use super::*;

    fn hold(id: i64, variant: i64) -> Reservation {
        Reservation {
            id: ReservationId::new(id),
            variant_id: VariantId::new(variant),
            quantity: 1,
            status: ReservationStatus::Released,
            checkout_id: CheckoutId::new("chk_1"),
            payment_intent_id: None,
            expires_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_variants_of_dedupes_and_sorts() {
        let holds = [hold(1, 9), hold(2, 3), hold(3, 9)];
        assert_eq!(variants_of(&holds), vec![VariantId::new(3), VariantId::new(9)]);
    }
}
