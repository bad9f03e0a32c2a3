//! Stripe webhook verification and event decoding.
//!
//! The `Stripe-Signature` header carries `t=<unix seconds>` and one or more
//! `v1=<hex>` entries. Each `v1` is HMAC-SHA256 over `"<t>.<raw body>"`
//! keyed with the endpoint secret.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use super::PaymentIntent;

/// Maximum age of a signed payload.
pub const TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing or malformed signature header")]
    MalformedHeader,

    #[error("timestamp outside the tolerance window")]
    StaleTimestamp,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("invalid payload: {0}")]
    Payload(String),
}

/// A decoded webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// The events this application acts on.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    Succeeded(PaymentIntent),
    Canceled(PaymentIntent),
    Failed(PaymentIntent),
    Ignored(String),
}

impl Event {
    /// Classify the event, decoding the payment intent when relevant.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Payload` if a payment intent event carries an
    /// object that doesn't decode.
    pub fn into_payment_event(self) -> Result<PaymentEvent, WebhookError> {
        let wrap: fn(PaymentIntent) -> PaymentEvent = match self.kind.as_str() {
            "payment_intent.succeeded" => PaymentEvent::Succeeded,
            "payment_intent.canceled" => PaymentEvent::Canceled,
            "payment_intent.payment_failed" => PaymentEvent::Failed,
            _ => return Ok(PaymentEvent::Ignored(self.kind)),
        };
        let intent: PaymentIntent = serde_json::from_value(self.data.object)
            .map_err(|e| WebhookError::Payload(e.to_string()))?;
        Ok(wrap(intent))
    }
}

/// Verify `header` against `payload` and decode the event.
///
/// # Errors
///
/// Returns a `WebhookError` when the header is malformed, stale, doesn't
/// match, or the body isn't an event.
pub fn construct_event(
    payload: &str,
    header: &str,
    secret: &str,
    now: i64,
) -> Result<Event, WebhookError> {
    verify_signature(payload, header, secret, now)?;
    serde_json::from_str(payload).map_err(|e| WebhookError::Payload(e.to_string()))
}

/// Check a `Stripe-Signature` header.
///
/// # Errors
///
/// See [`construct_event`].
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }
    let skew = now
        .checked_sub(timestamp)
        .map(i64::unsigned_abs)
        .ok_or(WebhookError::StaleTimestamp)?;
    if skew > TOLERANCE_SECS.unsigned_abs() {
        return Err(WebhookError::StaleTimestamp);
    }

    let expected = compute_signature(payload, secret, timestamp);
    if signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        tracing::debug!("Stripe signature verified");
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// Build a header value the way Stripe does, for the given timestamp.
#[must_use]
pub fn sign(payload: &str, secret: &str, timestamp: i64) -> String {
    format!(
        "t={timestamp},v1={}",
        compute_signature(payload, secret, timestamp)
    )
}

fn compute_signature(payload: &str, secret: &str, timestamp: i64) -> String {
    // HMAC accepts keys of any length
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const BODY: &str = r#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1","amount":500,"currency":"usd","status":"succeeded","metadata":{"checkout_id":"chk_1"}}}}"#;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "hellp"));
        assert!(!constant_time_compare("hello", "hell"));
    }

    #[test]
    fn test_signed_payload_verifies() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        assert!(verify_signature(BODY, &header, SECRET, 1_700_000_100).is_ok());
    }

    #[test]
    fn test_any_v1_entry_may_match() {
        let good = sign(BODY, SECRET, 1_700_000_000);
        let v1 = good.split_once(",v1=").unwrap().1;
        let header = format!("t=1700000000,v1=deadbeef,v0=abc,v1={v1}");
        assert!(verify_signature(BODY, &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_rejects_tampering_and_staleness() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        assert_eq!(
            verify_signature(&BODY.replace("500", "5"), &header, SECRET, 1_700_000_000),
            Err(WebhookError::SignatureMismatch)
        );
        assert_eq!(
            verify_signature(BODY, &header, "whsec_other", 1_700_000_000),
            Err(WebhookError::SignatureMismatch)
        );
        assert_eq!(
            verify_signature(BODY, &header, SECRET, 1_700_000_000 + TOLERANCE_SECS + 1),
            Err(WebhookError::StaleTimestamp)
        );
        assert_eq!(
            verify_signature(BODY, "v1=abc", SECRET, 0),
            Err(WebhookError::MalformedHeader)
        );
        assert_eq!(
            verify_signature(BODY, "t=1", SECRET, 1),
            Err(WebhookError::MalformedHeader)
        );
    }

    #[test]
    fn test_extreme_timestamps_are_stale() {
        assert_eq!(
            verify_signature("{}", "t=-9223372036854775808,v1=aa", "whsec_x", 1_700_000_000),
            Err(WebhookError::StaleTimestamp)
        );
        assert_eq!(
            verify_signature("{}", "t=9223372036854775807,v1=aa", "whsec_x", -1_700_000_000),
            Err(WebhookError::StaleTimestamp)
        );
        assert_eq!(
            verify_signature("{}", "t=9223372036854775807,v1=aa", "whsec_x", 1_700_000_000),
            Err(WebhookError::StaleTimestamp)
        );
    }

    #[test]
    fn test_construct_event_classifies() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        let event = construct_event(BODY, &header, SECRET, 1_700_000_000).unwrap();
        assert_eq!(event.kind, "payment_intent.succeeded");
        match event.into_payment_event().unwrap() {
            PaymentEvent::Succeeded(pi) => {
                assert_eq!(pi.id.as_str(), "pi_1");
                assert_eq!(pi.metadata_value("checkout_id"), Some("chk_1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_other_events_are_ignored() {
        let body = r#"{"id":"evt_2","type":"charge.refunded","data":{"object":{"id":"ch_1"}}}"#;
        let event: Event = serde_json::from_str(body).unwrap();
        assert!(matches!(
            event.into_payment_event().unwrap(),
            PaymentEvent::Ignored(kind) if kind == "charge.refunded"
        ));
    }
}
