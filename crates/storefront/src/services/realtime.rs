//! Realtime inventory notifications over Ably.
//!
//! Publishes `{variantId, available}` on `inventory:<variantId>` with event
//! name `update`, and signs token requests so browsers can subscribe without
//! seeing the API key. Without an API key every publish is a logged no-op.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::ExposeSecret;
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

use vendora_core::VariantId;

use crate::config::AblyConfig;

/// Token lifetime handed to browsers (one hour, in milliseconds).
pub const TOKEN_TTL_MS: i64 = 60 * 60 * 1000;

const SUBSCRIBER_CLIENT_ID: &str = "anonymous";
const SUBSCRIBER_CAPABILITY: &str = r#"{"inventory:*":["subscribe"]}"#;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("realtime is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// A signed token request, serialized exactly as the Ably client SDK expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub key_name: String,
    pub ttl: i64,
    pub capability: String,
    pub client_id: String,
    pub timestamp: i64,
    pub nonce: String,
    pub mac: String,
}

#[derive(Serialize)]
struct Message<'m> {
    name: &'m str,
    data: InventoryUpdate,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct InventoryUpdate {
    variant_id: VariantId,
    available: i64,
}

/// Channel name for a variant's stock updates.
#[must_use]
pub fn inventory_channel(variant_id: VariantId) -> String {
    format!("inventory:{variant_id}")
}

/// Ably REST publisher and token signer.
#[derive(Clone)]
pub struct RealtimePublisher {
    http: reqwest::Client,
    config: Option<AblyConfig>,
}

impl RealtimePublisher {
    #[must_use]
    pub const fn new(http: reqwest::Client, config: Option<AblyConfig>) -> Self {
        Self { http, config }
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Publish the current availability of one variant.
    ///
    /// # Errors
    ///
    /// Returns error if the publish request fails. An unconfigured publisher
    /// logs and succeeds.
    #[tracing::instrument(skip(self), fields(variant_id = %variant_id))]
    pub async fn publish_inventory(
        &self,
        variant_id: VariantId,
        available: i64,
    ) -> Result<(), RealtimeError> {
        let Some(config) = &self.config else {
            tracing::debug!(available, "Realtime not configured, skipping publish");
            return Ok(());
        };

        let channel = inventory_channel(variant_id);
        let response = self
            .http
            .post(format!(
                "{}/channels/{}/messages",
                config.rest_base,
                urlencoding::encode(&channel)
            ))
            .basic_auth(&config.key_name, Some(config.key_secret.expose_secret()))
            .json(&Message {
                name: "update",
                data: InventoryUpdate {
                    variant_id,
                    available,
                },
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RealtimeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(available, "Inventory update published");
        Ok(())
    }

    /// Publish several variants, logging failures instead of returning them.
    ///
    /// Stock changes are already committed when this runs; a lost
    /// notification only delays the browser until its next refresh.
    pub async fn publish_availability(&self, levels: &[(VariantId, i64)]) {
        for &(variant_id, available) in levels {
            if let Err(e) = self.publish_inventory(variant_id, available).await {
                tracing::warn!(variant_id = %variant_id, error = %e, "Failed to publish inventory update");
            }
        }
    }

    /// Sign a subscribe-only token request for `inventory:*`.
    ///
    /// # Errors
    ///
    /// Returns `RealtimeError::NotConfigured` without an API key.
    pub fn create_token_request(&self, now_ms: i64) -> Result<TokenRequest, RealtimeError> {
        let config = self.config.as_ref().ok_or(RealtimeError::NotConfigured)?;

        let mut nonce = [0u8; 16];
        rand::rng().fill_bytes(&mut nonce);

        Ok(sign_token_request(
            &config.key_name,
            config.key_secret.expose_secret(),
            now_ms,
            hex::encode(nonce),
        ))
    }
}

fn sign_token_request(key_name: &str, key_secret: &str, timestamp: i64, nonce: String) -> TokenRequest {
    let signed_text = format!(
        "{key_name}\n{TOKEN_TTL_MS}\n{SUBSCRIBER_CAPABILITY}\n{SUBSCRIBER_CLIENT_ID}\n{timestamp}\n{nonce}\n"
    );
    let mac = Hmac::<Sha256>::new_from_slice(key_secret.as_bytes())
        .map(|mut mac| {
            mac.update(signed_text.as_bytes());
            BASE64.encode(mac.finalize().into_bytes())
        })
        .unwrap_or_default();

    TokenRequest {
        key_name: key_name.to_owned(),
        ttl: TOKEN_TTL_MS,
        capability: SUBSCRIBER_CAPABILITY.to_owned(),
        client_id: SUBSCRIBER_CLIENT_ID.to_owned(),
        timestamp,
        nonce,
        mac,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn configured() -> RealtimePublisher {
        RealtimePublisher::new(
            reqwest::Client::new(),
            Some(AblyConfig {
                key_name: "app.key".to_owned(),
                key_secret: SecretString::from("s3cr3t".to_owned()),
                rest_base: "http://127.0.0.1:9".to_owned(),
            }),
        )
    }

    #[test]
    fn test_inventory_channel() {
        assert_eq!(inventory_channel(VariantId::new(42)), "inventory:42");
    }

    #[test]
    fn test_token_request_is_deterministic_for_inputs() {
        let a = sign_token_request("app.key", "s3cr3t", 1_700_000_000_000, "abc".to_owned());
        let b = sign_token_request("app.key", "s3cr3t", 1_700_000_000_000, "abc".to_owned());
        let c = sign_token_request("app.key", "other", 1_700_000_000_000, "abc".to_owned());
        assert_eq!(a, b);
        assert_ne!(a.mac, c.mac);
        assert_eq!(a.capability, r#"{"inventory:*":["subscribe"]}"#);
        assert_eq!(a.client_id, "anonymous");
        assert_eq!(BASE64.decode(&a.mac).unwrap().len(), 32);
    }

    #[test]
    fn test_token_request_wire_format() {
        let request = configured().create_token_request(1_700_000_000_000).unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["keyName"], "app.key");
        assert_eq!(json["ttl"], TOKEN_TTL_MS);
        assert_eq!(json["clientId"], "anonymous");
        assert_eq!(request.nonce.len(), 32);
    }

    #[test]
    fn test_unconfigured_token_request_fails() {
        let publisher = RealtimePublisher::new(reqwest::Client::new(), None);
        assert!(!publisher.is_configured());
        assert!(matches!(
            publisher.create_token_request(0),
            Err(RealtimeError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_publish_is_noop() {
        let publisher = RealtimePublisher::new(reqwest::Client::new(), None);
        assert!(publisher.publish_inventory(VariantId::new(1), 3).await.is_ok());
    }
}
