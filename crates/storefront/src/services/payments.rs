//! Payment outcomes: turning processor events into captured stock and
//! orders, releasing stock on failure, and refunds.
//!
//! Every entry point is safe to repeat. Holds only leave `ACTIVE` once and
//! at most one order exists per payment intent, so webhook retries and a
//! client confirmation racing the webhook converge on the same state.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use vendora_core::{
    CheckoutId, CurrencyCode, Email, OrderId, PaymentIntentId, PaymentStatus, PriceError,
    ReservationStatus, UserId, VariantId,
};

use crate::db::orders::{NewOrder, NewOrderLine};
use crate::db::{CatalogRepository, OrderRepository, RepositoryError, ReservationRepository, UserRepository};
use crate::models::{HoldRequest, OrderWithItems, Reservation, ShippingAddress};
use crate::services::checkout::{CHECKOUT_ID_KEY, EMAIL_KEY};
use crate::services::email::EmailService;
use crate::services::inventory::{publish_levels, variants_of};
use crate::services::realtime::RealtimePublisher;
use crate::services::stripe::webhook::PaymentEvent;
use crate::services::stripe::{PaymentIntent, PaymentIntentStatus, StripeClient, StripeError};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment {0} has not succeeded")]
    NotSucceeded(PaymentIntentId),

    #[error("payment {0} has no stock holds and no items were supplied")]
    NoLines(PaymentIntentId),

    #[error("no email address for payment {0}")]
    MissingEmail(PaymentIntentId),

    #[error("variant {0} no longer exists")]
    UnknownVariant(VariantId),

    #[error(transparent)]
    Currency(#[from] PriceError),

    #[error("order not found")]
    OrderNotFound,

    #[error("order has no payment to refund")]
    NotRefundable,

    #[error("order already refunded")]
    AlreadyRefunded,

    #[error("refund amount must be between 1 and {max} cents")]
    InvalidRefundAmount { max: i64 },

    #[error("payment processor error: {0}")]
    Stripe(#[from] StripeError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// How a webhook event was handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum EventOutcome {
    OrderCreated { order_id: OrderId },
    OrderExists { order_id: OrderId },
    /// Stock captured but the order waits for the client to supply an email.
    Captured { holds: usize },
    Released { holds: usize },
    Ignored,
}

/// Client-supplied details for a client-confirmed order.
#[derive(Debug, Clone, Default)]
pub struct Confirmation<'c> {
    pub email: Option<&'c Email>,
    pub user_id: Option<UserId>,
    pub items: &'c [HoldRequest],
    pub shipping: Option<&'c ShippingAddress>,
}

pub struct PaymentService<'a> {
    pool: &'a SqlitePool,
    stripe: &'a StripeClient,
    realtime: &'a RealtimePublisher,
    email: &'a EmailService,
}

impl<'a> PaymentService<'a> {
    #[must_use]
    pub const fn new(
        pool: &'a SqlitePool,
        stripe: &'a StripeClient,
        realtime: &'a RealtimePublisher,
        email: &'a EmailService,
    ) -> Self {
        Self {
            pool,
            stripe,
            realtime,
            email,
        }
    }

    /// Apply a verified webhook event.
    ///
    /// # Errors
    ///
    /// Returns a `PaymentError` when the database or processor fails.
    #[tracing::instrument(skip(self, event))]
    pub async fn handle_event(&self, event: PaymentEvent) -> Result<EventOutcome, PaymentError> {
        match event {
            PaymentEvent::Succeeded(intent) => {
                tracing::info!(payment_intent_id = %intent.id, "Payment succeeded");
                match self.finalize(&intent, &Confirmation::default()).await {
                    Ok((order, true)) => Ok(EventOutcome::OrderCreated { order_id: order.order.id }),
                    Ok((order, false)) => Ok(EventOutcome::OrderExists { order_id: order.order.id }),
                    Err(PaymentError::MissingEmail(id)) => {
                        let holds = self.captured_holds(&id).await?.len();
                        tracing::info!(payment_intent_id = %id, holds, "Stock captured, order awaits client confirmation");
                        Ok(EventOutcome::Captured { holds })
                    }
                    Err(e) => Err(e),
                }
            }
            PaymentEvent::Canceled(intent) | PaymentEvent::Failed(intent) => {
                tracing::info!(payment_intent_id = %intent.id, status = ?intent.status, "Payment did not complete");
                let holds = self.payment_failed(&intent).await?;
                Ok(EventOutcome::Released { holds })
            }
            PaymentEvent::Ignored(kind) => {
                tracing::debug!(event_type = %kind, "Ignoring webhook event");
                Ok(EventOutcome::Ignored)
            }
        }
    }

    /// Record an order for a payment the browser reports as confirmed.
    ///
    /// The intent is fetched from the processor and must have succeeded.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotSucceeded` for any other intent status.
    #[tracing::instrument(skip(self, confirmation), fields(payment_intent_id = %payment_intent_id))]
    pub async fn confirm_client_order(
        &self,
        payment_intent_id: &PaymentIntentId,
        confirmation: &Confirmation<'_>,
    ) -> Result<(OrderWithItems, bool), PaymentError> {
        let intent = self.stripe.retrieve_payment_intent(payment_intent_id).await?;
        if intent.status != PaymentIntentStatus::Succeeded {
            return Err(PaymentError::NotSucceeded(intent.id));
        }
        self.finalize(&intent, confirmation).await
    }

    /// Capture the holds of a succeeded intent and record its order.
    async fn finalize(
        &self,
        intent: &PaymentIntent,
        confirmation: &Confirmation<'_>,
    ) -> Result<(OrderWithItems, bool), PaymentError> {
        let orders = OrderRepository::new(self.pool);
        let reservations = ReservationRepository::new(self.pool);

        // Holds may not be linked yet if the checkout died between creating
        // the intent and attaching it.
        if let Some(checkout_id) = intent.metadata_value(CHECKOUT_ID_KEY) {
            reservations
                .attach_payment_intent(&CheckoutId::new(checkout_id), &intent.id)
                .await?;
        }

        let captured = reservations.capture_all_reservations(&intent.id).await?;
        let holds = reservations.list_by_payment_intent(&intent.id).await?;
        if captured > 0 {
            publish_levels(self.pool, self.realtime, &variants_of(&holds)).await;
        }

        if let Some(existing) = orders.get_by_payment_intent(&intent.id).await? {
            if let Some(address) = confirmation.shipping {
                orders.set_shipping_address(existing.order.id, address).await?;
            }
            return Ok((existing, false));
        }

        let email = match (confirmation.email, intent.metadata_value(EMAIL_KEY)) {
            (Some(email), _) => email.clone(),
            (None, Some(raw)) => Email::parse(raw).map_err(|_| PaymentError::MissingEmail(intent.id.clone()))?,
            (None, None) => return Err(PaymentError::MissingEmail(intent.id.clone())),
        };

        let requested = Self::order_quantities(intent, &holds, confirmation.items)?;
        let lines = self.price_lines(&requested).await?;

        let user_id = match confirmation.user_id {
            Some(id) => Some(id),
            None => UserRepository::new(self.pool)
                .get_by_email(&email)
                .await?
                .map(|u| u.id),
        };

        let currency: CurrencyCode = intent.currency.parse()?;
        let (order, created) = orders
            .create_paid(&NewOrder {
                email: &email,
                user_id,
                payment_intent_id: &intent.id,
                currency,
                lines: &lines,
                shipping: confirmation.shipping,
            })
            .await?;

        if created {
            if order.order.total.amount_cents != intent.amount {
                tracing::warn!(
                    order_id = %order.order.id,
                    order_total = order.order.total.amount_cents,
                    charged = intent.amount,
                    "Order total differs from the amount charged"
                );
            }
            if let Err(e) = self.email.send_order_confirmation(&order).await {
                tracing::warn!(order_id = %order.order.id, error = %e, "Failed to send order confirmation");
            }
        }

        Ok((order, created))
    }

    /// Quantities per variant the order should contain.
    ///
    /// Captured holds are authoritative. A payment that succeeded after its
    /// holds were swept still becomes an order from the released holds, and
    /// is logged loudly because that stock was never consumed.
    fn order_quantities(
        intent: &PaymentIntent,
        holds: &[Reservation],
        fallback: &[HoldRequest],
    ) -> Result<Vec<HoldRequest>, PaymentError> {
        let captured: Vec<&Reservation> = holds
            .iter()
            .filter(|h| h.status == ReservationStatus::Captured)
            .collect();

        let source: Vec<&Reservation> = if captured.is_empty() {
            if !holds.is_empty() {
                tracing::error!(
                    payment_intent_id = %intent.id,
                    holds = holds.len(),
                    "Payment succeeded after its stock holds were released; stock was not decremented"
                );
            }
            holds.iter().collect()
        } else {
            captured
        };

        if source.is_empty() {
            let lines = HoldRequest::normalize(fallback);
            if lines.is_empty() {
                return Err(PaymentError::NoLines(intent.id.clone()));
            }
            tracing::warn!(payment_intent_id = %intent.id, "Building order from client-supplied items");
            return Ok(lines);
        }

        let mut merged: BTreeMap<VariantId, i64> = BTreeMap::new();
        for hold in source {
            let quantity = merged.entry(hold.variant_id).or_default();
            *quantity = quantity.saturating_add(hold.quantity);
        }
        Ok(merged
            .into_iter()
            .map(|(variant_id, quantity)| HoldRequest {
                variant_id,
                quantity,
            })
            .collect())
    }

    /// Snapshot the current price of each line.
    async fn price_lines(&self, requested: &[HoldRequest]) -> Result<Vec<NewOrderLine>, PaymentError> {
        let catalog = CatalogRepository::new(self.pool);
        let mut lines = Vec::with_capacity(requested.len());
        for req in requested {
            let variant = catalog
                .get_variant(req.variant_id)
                .await?
                .ok_or(PaymentError::UnknownVariant(req.variant_id))?;
            lines.push(NewOrderLine {
                variant_id: variant.id,
                quantity: req.quantity,
                unit_price: variant.price,
            });
        }
        Ok(lines)
    }

    async fn captured_holds(&self, id: &PaymentIntentId) -> Result<Vec<Reservation>, PaymentError> {
        Ok(ReservationRepository::new(self.pool)
            .list_by_payment_intent(id)
            .await?
            .into_iter()
            .filter(|h| h.status == ReservationStatus::Captured)
            .collect())
    }

    /// Release the holds of an intent that was canceled or failed.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Repository` if the release fails.
    pub async fn payment_failed(&self, intent: &PaymentIntent) -> Result<usize, PaymentError> {
        let reservations = ReservationRepository::new(self.pool);
        let mut released = reservations.release_holds(&intent.id).await?;
        if let Some(checkout_id) = intent.metadata_value(CHECKOUT_ID_KEY) {
            released.extend(reservations.release_checkout(&CheckoutId::new(checkout_id)).await?);
        }

        OrderRepository::new(self.pool)
            .set_payment_status(&intent.id, PaymentStatus::Failed)
            .await?;

        publish_levels(self.pool, self.realtime, &variants_of(&released)).await;
        Ok(released.len())
    }

    /// Refund part or all of an order through the processor.
    ///
    /// # Errors
    ///
    /// Returns `OrderNotFound`, `NotRefundable` for orders without a payment,
    /// `AlreadyRefunded`, or `InvalidRefundAmount` when `amount_cents` is
    /// outside `1..=total`.
    #[tracing::instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn refund(
        &self,
        order_id: OrderId,
        amount_cents: i64,
        reason: Option<&str>,
    ) -> Result<OrderWithItems, PaymentError> {
        let orders = OrderRepository::new(self.pool);
        let order = orders.get(order_id).await?.ok_or(PaymentError::OrderNotFound)?;

        if order.order.is_refunded() {
            return Err(PaymentError::AlreadyRefunded);
        }
        let max = order.order.total.amount_cents;
        if amount_cents <= 0 || amount_cents > max {
            return Err(PaymentError::InvalidRefundAmount { max });
        }
        let payment_intent_id = order
            .order
            .payment_intent_id
            .as_ref()
            .ok_or(PaymentError::NotRefundable)?;

        let refund = self.stripe.create_refund(payment_intent_id, amount_cents).await?;
        match orders
            .record_refund(order_id, &refund.id, refund.amount, reason)
            .await
        {
            Ok(()) => {}
            Err(RepositoryError::Conflict(_)) => return Err(PaymentError::AlreadyRefunded),
            Err(e) => return Err(e.into()),
        }

        orders.get(order_id).await?.ok_or(PaymentError::OrderNotFound)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use vendora_core::ReservationId;

    use super::*;

    fn intent() -> PaymentIntent {
        PaymentIntent {
            id: PaymentIntentId::new("pi_1"),
            amount: 1000,
            currency: "usd".to_owned(),
            status: PaymentIntentStatus::Succeeded,
            client_secret: None,
            metadata: HashMap::new(),
        }
    }

    fn hold(variant: i64, quantity: i64, status: ReservationStatus) -> Reservation {
        Reservation {
            id: ReservationId::new(variant),
            variant_id: VariantId::new(variant),
            quantity,
            status,
            checkout_id: CheckoutId::new("chk_1"),
            payment_intent_id: Some(PaymentIntentId::new("pi_1")),
            expires_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_order_quantities_prefers_captured_holds() {
        let holds = [
            hold(1, 2, ReservationStatus::Captured),
            hold(2, 1, ReservationStatus::Released),
            hold(1, 1, ReservationStatus::Captured),
        ];
        let lines = PaymentService::order_quantities(&intent(), &holds, &[]).unwrap();
        assert_eq!(lines, vec![HoldRequest { variant_id: VariantId::new(1), quantity: 3 }]);
    }

    #[test]
    fn test_order_quantities_falls_back() {
        let released = [hold(3, 4, ReservationStatus::Released)];
        let lines = PaymentService::order_quantities(&intent(), &released, &[]).unwrap();
        assert_eq!(lines[0].quantity, 4);

        let items = [HoldRequest { variant_id: VariantId::new(5), quantity: 1 }];
        let lines = PaymentService::order_quantities(&intent(), &[], &items).unwrap();
        assert_eq!(lines, items.to_vec());

        assert!(matches!(
            PaymentService::order_quantities(&intent(), &[], &[]),
            Err(PaymentError::NoLines(_))
        ));
    }
}
