//! Stripe REST client.
//!
//! Form-encoded requests against the payment intents and refunds endpoints,
//! plus webhook signature verification in [`webhook`].

pub mod webhook;

use std::collections::HashMap;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;

use vendora_core::{CurrencyCode, PaymentIntentId};

use crate::config::StripeConfig;

/// Errors that can occur when talking to Stripe.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response or build the request.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Lifecycle states of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

/// The subset of a payment intent this application reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentIntentStatus,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    pub status: Option<String>,
}

/// Parameters for a new payment intent.
#[derive(Debug, Clone)]
pub struct NewPaymentIntent<'p> {
    pub amount_cents: i64,
    pub currency: CurrencyCode,
    pub metadata: &'p [(&'p str, &'p str)],
    /// Sent as `Idempotency-Key` so a retried create returns the same intent.
    pub idempotency_key: &'p str,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
}

impl StripeClient {
    /// Create a new client using the secret key from `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        let mut auth = HeaderValue::from_str(&auth_value)
            .map_err(|e| StripeError::Parse(format!("Invalid API key format: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        })
    }

    /// Create a payment intent with automatic payment methods.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[tracing::instrument(skip(self, params), fields(amount = params.amount_cents, currency = params.currency.as_str()))]
    pub async fn create_payment_intent(
        &self,
        params: &NewPaymentIntent<'_>,
    ) -> Result<PaymentIntent, StripeError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_owned(), params.amount_cents.to_string()),
            ("currency".to_owned(), params.currency.as_str().to_owned()),
            (
                "automatic_payment_methods[enabled]".to_owned(),
                "true".to_owned(),
            ),
        ];
        form.extend(
            params
                .metadata
                .iter()
                .map(|(k, v)| (format!("metadata[{k}]"), (*v).to_owned())),
        );

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .header("Idempotency-Key", params.idempotency_key)
            .form(&form)
            .send()
            .await?;

        let intent: PaymentIntent = parse_response(response).await?;
        tracing::info!(payment_intent_id = %intent.id, "Payment intent created");
        Ok(intent)
    }

    /// Fetch a payment intent.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the intent doesn't exist.
    pub async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, StripeError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/payment_intents/{}",
                self.api_base,
                urlencoding::encode(id.as_str())
            ))
            .send()
            .await?;
        parse_response(response).await
    }

    /// Cancel a payment intent that has not completed.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the intent can't be canceled.
    #[tracing::instrument(skip(self), fields(payment_intent_id = %id))]
    pub async fn cancel_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, StripeError> {
        let response = self
            .client
            .post(format!(
                "{}/v1/payment_intents/{}/cancel",
                self.api_base,
                urlencoding::encode(id.as_str())
            ))
            .form(&[("cancellation_reason", "abandoned")])
            .send()
            .await?;
        parse_response(response).await
    }

    /// Refund part or all of a succeeded payment.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects the refund.
    #[tracing::instrument(skip(self), fields(payment_intent_id = %payment_intent_id))]
    pub async fn create_refund(
        &self,
        payment_intent_id: &PaymentIntentId,
        amount_cents: i64,
    ) -> Result<Refund, StripeError> {
        let response = self
            .client
            .post(format!("{}/v1/refunds", self.api_base))
            .form(&[
                ("payment_intent", payment_intent_id.as_str().to_owned()),
                ("amount", amount_cents.to_string()),
                ("reason", "requested_by_customer".to_owned()),
            ])
            .send()
            .await?;

        let refund: Refund = parse_response(response).await?;
        tracing::info!(refund_id = %refund.id, amount = refund.amount, "Refund created");
        Ok(refund)
    }
}

async fn parse_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, StripeError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or(body);
        return Err(StripeError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| StripeError::Parse(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_intent_deserialize() {
        let json = r#"{
            "id": "pi_123",
            "object": "payment_intent",
            "amount": 3998,
            "currency": "usd",
            "status": "requires_payment_method",
            "client_secret": "pi_123_secret_abc",
            "metadata": {"checkout_id": "chk_1", "email": ""}
        }"#;
        let intent: PaymentIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.id.as_str(), "pi_123");
        assert_eq!(intent.status, PaymentIntentStatus::RequiresPaymentMethod);
        assert_eq!(intent.metadata_value("checkout_id"), Some("chk_1"));
        assert_eq!(intent.metadata_value("email"), None);
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let json = r#"{"id":"pi_1","amount":1,"currency":"usd","status":"something_new"}"#;
        let intent: PaymentIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.status, PaymentIntentStatus::Unknown);
        assert!(intent.metadata.is_empty());
    }
}
