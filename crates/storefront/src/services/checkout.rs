//! Checkout: hold stock, then open a payment intent for it.
//!
//! Holds are taken first under a fresh [`CheckoutId`]. Only when every line
//! is held is the payment intent created, and the holds are then linked to
//! it. A processor failure releases the holds before returning.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use vendora_core::{CheckoutId, CurrencyCode, Email, PaymentIntentId, Price};

use crate::db::{RepositoryError, ReservationError, ReservationRepository};
use crate::models::HoldRequest;
use crate::services::cart::{CartError, price_cart};
use crate::services::inventory::{publish_levels, variants_of};
use crate::services::realtime::RealtimePublisher;
use crate::services::stripe::{NewPaymentIntent, StripeClient, StripeError};

/// Metadata key linking a payment intent back to its holds.
pub const CHECKOUT_ID_KEY: &str = "checkout_id";
/// Metadata key carrying the buyer's email, when known at checkout.
pub const EMAIL_KEY: &str = "email";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("requested currency {requested} but the cart is priced in {priced}")]
    CurrencyMismatch {
        requested: CurrencyCode,
        priced: CurrencyCode,
    },

    #[error(transparent)]
    Reservation(#[from] ReservationError),

    #[error("payment processor error: {0}")]
    Payment(#[from] StripeError),

    #[error("payment processor returned no client secret")]
    MissingClientSecret,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub items: Vec<HoldRequest>,
    pub email: Option<Email>,
    pub currency: Option<CurrencyCode>,
}

/// What the browser needs to confirm the payment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub client_secret: String,
    pub payment_intent_id: PaymentIntentId,
    pub checkout_id: CheckoutId,
    pub amount: Price,
    pub expires_at: DateTime<Utc>,
}

pub struct CheckoutService<'a> {
    pool: &'a SqlitePool,
    stripe: &'a StripeClient,
    realtime: &'a RealtimePublisher,
    hold_ttl: Duration,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        pool: &'a SqlitePool,
        stripe: &'a StripeClient,
        realtime: &'a RealtimePublisher,
        hold_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            stripe,
            realtime,
            hold_ttl,
        }
    }

    /// Price the cart, hold its stock and create the payment intent.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Cart` for empty carts or unknown variants,
    /// `Reservation` when stock is short, and `Payment` when the processor
    /// fails (after the holds are released again).
    #[tracing::instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn start(&self, request: &CheckoutRequest) -> Result<CheckoutSession, CheckoutError> {
        let cart = price_cart(self.pool, &request.items).await?;
        if let Some(requested) = request.currency
            && requested != cart.currency
        {
            return Err(CheckoutError::CurrencyMismatch {
                requested,
                priced: cart.currency,
            });
        }

        let reservations = ReservationRepository::new(self.pool);
        let checkout_id = CheckoutId::generate();
        let holds = reservations
            .create_reservation(&cart.hold_requests(), &checkout_id, self.hold_ttl)
            .await?;
        let variants = variants_of(&holds);
        publish_levels(self.pool, self.realtime, &variants).await;

        let email = request.email.as_ref().map(Email::as_str).unwrap_or_default();
        let metadata = [(CHECKOUT_ID_KEY, checkout_id.as_str()), (EMAIL_KEY, email)];
        let created = self
            .stripe
            .create_payment_intent(&NewPaymentIntent {
                amount_cents: cart.total.amount_cents,
                currency: cart.currency,
                metadata: &metadata,
                idempotency_key: checkout_id.as_str(),
            })
            .await;

        let intent = match created {
            Ok(intent) => intent,
            Err(e) => {
                tracing::error!(checkout_id = %checkout_id, error = %e, "Payment intent creation failed, releasing holds");
                self.abandon(&checkout_id).await;
                return Err(e.into());
            }
        };

        if let Err(e) = reservations
            .attach_payment_intent(&checkout_id, &intent.id)
            .await
        {
            tracing::error!(checkout_id = %checkout_id, payment_intent_id = %intent.id, error = %e, "Failed to link holds to payment intent");
            self.discard(&checkout_id, &intent.id).await;
            return Err(e.into());
        }

        let Some(client_secret) = intent.client_secret else {
            tracing::error!(checkout_id = %checkout_id, payment_intent_id = %intent.id, "Payment intent has no client secret, releasing holds");
            self.discard(&checkout_id, &intent.id).await;
            return Err(CheckoutError::MissingClientSecret);
        };
        let expires_at = holds
            .iter()
            .map(|h| h.expires_at)
            .min()
            .unwrap_or_else(Utc::now);

        tracing::info!(
            checkout_id = %checkout_id,
            payment_intent_id = %intent.id,
            amount = cart.total.amount_cents,
            "Checkout started"
        );

        Ok(CheckoutSession {
            client_secret,
            payment_intent_id: intent.id,
            checkout_id,
            amount: cart.total,
            expires_at,
        })
    }

    /// Release the holds and cancel the intent of a checkout that can't
    /// continue after its payment intent was created.
    async fn discard(&self, checkout_id: &CheckoutId, payment_intent_id: &PaymentIntentId) {
        self.abandon(checkout_id).await;
        if let Err(e) = self.stripe.cancel_payment_intent(payment_intent_id).await {
            tracing::warn!(payment_intent_id = %payment_intent_id, error = %e, "Failed to cancel orphaned payment intent");
        }
    }

    /// Release a checkout's holds after a failure, logging any error.
    async fn abandon(&self, checkout_id: &CheckoutId) {
        match ReservationRepository::new(self.pool)
            .release_checkout(checkout_id)
            .await
        {
            Ok(released) => publish_levels(self.pool, self.realtime, &variants_of(&released)).await,
            Err(e) => tracing::error!(checkout_id = %checkout_id, error = %e, "Failed to release checkout holds"),
        }
    }
}
