//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `VENDORA_BASE_URL` - Public URL for the storefront
//! - `VENDORA_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `STRIPE_SECRET_KEY` - Payment processor secret API key
//! - `STRIPE_PUBLISHABLE_KEY` - Payment processor publishable key (sent to browsers)
//! - `STRIPE_WEBHOOK_SECRET` - Webhook endpoint signing secret
//!
//! ## Optional
//! - `VENDORA_DATABASE_URL` / `DATABASE_URL` - SQLite URL (default: `sqlite://data/ecommerce.db`)
//! - `VENDORA_HOST` - Bind address (default: 127.0.0.1)
//! - `VENDORA_PORT` - Listen port (default: 3000)
//! - `VENDORA_RESERVATION_TTL_SECS` - Stock hold lifetime (default: 900)
//! - `VENDORA_SWEEP_INTERVAL_SECS` - Expired hold sweep period (default: 60)
//! - `ADMIN_EMAILS` - Comma-separated emails promoted to ADMIN on sign-in
//! - `STRIPE_API_BASE` - Payment API base URL (default: `https://api.stripe.com`)
//! - `ABLY_API_KEY` - Realtime pub/sub key (`keyName:keySecret`)
//! - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` - Google OAuth app
//! - `GITHUB_CLIENT_ID` / `GITHUB_CLIENT_SECRET` - GitHub OAuth app
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM` - Outgoing mail
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT` - Error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use vendora_core::Email;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/ecommerce.db";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_ABLY_REST_BASE: &str = "https://rest.ably.io";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// SQLite connection URL
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    /// Public base URL, used for OAuth redirects and links in emails
    pub base_url: String,
    pub session_secret: SecretString,
    /// How long a checkout may hold stock before the sweeper releases it
    pub reservation_ttl: Duration,
    pub sweep_interval: Duration,
    /// Accounts with these emails are promoted to ADMIN when they sign in
    pub admin_emails: Vec<Email>,
    pub stripe: StripeConfig,
    pub ably: Option<AblyConfig>,
    pub oauth: OAuthConfig,
    pub email: Option<EmailConfig>,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

/// Payment processor configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub publishable_key: String,
    pub webhook_secret: SecretString,
    pub api_base: String,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("publishable_key", &self.publishable_key)
            .field("webhook_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Realtime pub/sub configuration, parsed from a `keyName:keySecret` API key.
#[derive(Clone)]
pub struct AblyConfig {
    pub key_name: String,
    pub key_secret: SecretString,
    pub rest_base: String,
}

impl std::fmt::Debug for AblyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AblyConfig")
            .field("key_name", &self.key_name)
            .field("key_secret", &"[REDACTED]")
            .field("rest_base", &self.rest_base)
            .finish()
    }
}

impl AblyConfig {
    /// Parse an API key of the form `appId.keyId:secret`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the key has no `:` separator.
    pub fn from_api_key(api_key: &str) -> Result<Self, ConfigError> {
        let (key_name, key_secret) = api_key
            .split_once(':')
            .filter(|(name, secret)| !name.is_empty() && !secret.is_empty())
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "ABLY_API_KEY".to_string(),
                    "expected keyName:keySecret".to_string(),
                )
            })?;
        Ok(Self {
            key_name: key_name.to_owned(),
            key_secret: SecretString::from(key_secret.to_owned()),
            rest_base: DEFAULT_ABLY_REST_BASE.to_string(),
        })
    }
}

/// Credentials for the optional social sign-in providers.
#[derive(Debug, Clone, Default)]
pub struct OAuthConfig {
    pub google: Option<OAuthClientConfig>,
    pub github: Option<OAuthClientConfig>,
}

#[derive(Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl std::fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// SMTP configuration. When absent, outgoing mail is written to the log.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Database URL alone, for tools that don't need the rest of the config.
///
/// Reads `.env` like [`StorefrontConfig::from_env`].
#[must_use]
pub fn database_url_from_env() -> String {
    let _ = dotenvy::dotenv();
    get_optional_env("VENDORA_DATABASE_URL")
        .or_else(|| get_optional_env("DATABASE_URL"))
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = database_url_from_env();
        let host = parse_env("VENDORA_HOST", "127.0.0.1")?;
        let port = parse_env("VENDORA_PORT", "3000")?;
        let base_url = get_required_env("VENDORA_BASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let session_secret = get_validated_secret("VENDORA_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "VENDORA_SESSION_SECRET")?;

        let reservation_ttl = Duration::from_secs(parse_env("VENDORA_RESERVATION_TTL_SECS", "900")?);
        let sweep_interval = Duration::from_secs(parse_env("VENDORA_SWEEP_INTERVAL_SECS", "60")?);
        let admin_emails = parse_admin_emails(&get_env_or_default("ADMIN_EMAILS", ""))?;

        let stripe = StripeConfig::from_env()?;
        let ably = get_optional_env("ABLY_API_KEY")
            .map(|key| AblyConfig::from_api_key(&key))
            .transpose()?;
        let oauth = OAuthConfig::from_env();
        let email = EmailConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            reservation_ttl,
            sweep_interval,
            admin_emails,
            stripe,
            ably,
            oauth,
            email,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether `email` is listed in `ADMIN_EMAILS`.
    #[must_use]
    pub fn is_admin_email(&self, email: &Email) -> bool {
        self.admin_emails.iter().any(|admin| admin == email)
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            publishable_key: get_required_env("STRIPE_PUBLISHABLE_KEY")?,
            webhook_secret: get_validated_secret("STRIPE_WEBHOOK_SECRET")?,
            api_base: get_env_or_default("STRIPE_API_BASE", DEFAULT_STRIPE_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

impl OAuthConfig {
    fn from_env() -> Self {
        Self {
            google: oauth_client_from_env("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
            github: oauth_client_from_env("GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET"),
        }
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_env_or_default("SMTP_FROM", "Vendora <noreply@vendora.shop>"),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn oauth_client_from_env(id_key: &str, secret_key: &str) -> Option<OAuthClientConfig> {
    let client_id = get_optional_env(id_key)?;
    let client_secret = get_optional_env(secret_key)?;
    Some(OAuthClientConfig {
        client_id,
        client_secret: SecretString::from(client_secret),
    })
}

fn parse_admin_emails(raw: &str) -> Result<Vec<Email>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Email::parse(s)
                .map_err(|e| ConfigError::InvalidEnvVar("ADMIN_EMAILS".to_string(), e.to_string()))
        })
        .collect()
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config() -> StorefrontConfig {
        StorefrontConfig {
            database_url: "sqlite::memory:".to_string(),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            session_secret: SecretString::from("x".repeat(32)),
            reservation_ttl: Duration::from_secs(900),
            sweep_interval: Duration::from_secs(60),
            admin_emails: vec![Email::parse("owner@vendora.shop").unwrap()],
            stripe: StripeConfig {
                secret_key: SecretString::from("sk_test_51abcDEF"),
                publishable_key: "pk_test_51abcDEF".to_string(),
                webhook_secret: SecretString::from("whsec_9f8e7d"),
                api_base: DEFAULT_STRIPE_API_BASE.to_string(),
            },
            ably: None,
            oauth: OAuthConfig::default(),
            email: None,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_accepts_processor_keys() {
        assert!(validate_secret_strength("sk_test_51NvQ8aLkd93JfQ2mZpX7", "STRIPE_SECRET_KEY").is_ok());
        assert!(validate_secret_strength("whsec_Kq83nVd0Lp2xYtR7", "STRIPE_WEBHOOK_SECRET").is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }

    #[test]
    fn test_socket_addr() {
        let addr = test_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_parse_admin_emails() {
        let emails = parse_admin_emails(" A@Shop.io, ,b@shop.io").unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].as_str(), "a@shop.io");
        assert!(parse_admin_emails("not-an-email").is_err());
        assert!(parse_admin_emails("").unwrap().is_empty());
    }

    #[test]
    fn test_is_admin_email() {
        let config = test_config();
        assert!(config.is_admin_email(&Email::parse("OWNER@vendora.shop").unwrap()));
        assert!(!config.is_admin_email(&Email::parse("guest@vendora.shop").unwrap()));
    }

    #[test]
    fn test_ably_key_parsing() {
        let ably = AblyConfig::from_api_key("app.key1:s3cr3t").unwrap();
        assert_eq!(ably.key_name, "app.key1");
        assert_eq!(ably.key_secret.expose_secret(), "s3cr3t");
        assert!(AblyConfig::from_api_key("missing-separator").is_err());
        assert!(AblyConfig::from_api_key(":secret").is_err());
    }

    #[test]
    fn test_config_debug_redacts_secrets() {
        let debug_output = format!("{:?}", test_config().stripe);
        assert!(debug_output.contains("pk_test_51abcDEF"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk_test_51abcDEF"));
        assert!(!debug_output.contains("whsec_9f8e7d"));
    }
}
