//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::SqlitePool;

use crate::config::StorefrontConfig;
use crate::db::{RepositoryError, SettingsRepository};
use crate::models::StoreSettings;
use crate::services::auth::AuthService;
use crate::services::checkout::CheckoutService;
use crate::services::email::EmailService;
use crate::services::inventory::Sweeper;
use crate::services::payments::PaymentService;
use crate::services::realtime::RealtimePublisher;
use crate::services::stripe::{StripeClient, StripeError};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment client: {0}")]
    Stripe(#[from] StripeError),
    #[error("email transport: {0}")]
    Email(#[from] lettre::transport::smtp::Error),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: SqlitePool,
    http: reqwest::Client,
    stripe: StripeClient,
    realtime: RealtimePublisher,
    email: EmailService,
    settings: Cache<(), StoreSettings>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the outbound clients can't be built.
    pub fn new(config: StorefrontConfig, pool: SqlitePool) -> Result<Self, StateError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("vendora/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let stripe = StripeClient::new(&config.stripe)?;
        let realtime = RealtimePublisher::new(http.clone(), config.ably.clone());
        let email = EmailService::new(config.email.as_ref(), &config.base_url)?;
        let settings = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(60))
            .build();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                http,
                stripe,
                realtime,
                email,
                settings,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Shared client for OAuth provider calls.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    #[must_use]
    pub fn stripe(&self) -> &StripeClient {
        &self.inner.stripe
    }

    #[must_use]
    pub fn realtime(&self) -> &RealtimePublisher {
        &self.inner.realtime
    }

    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self.pool(), &self.inner.config.admin_emails)
    }

    #[must_use]
    pub fn checkout(&self) -> CheckoutService<'_> {
        CheckoutService::new(
            self.pool(),
            self.stripe(),
            self.realtime(),
            self.inner.config.reservation_ttl,
        )
    }

    #[must_use]
    pub fn payments(&self) -> PaymentService<'_> {
        PaymentService::new(self.pool(), self.stripe(), self.realtime(), self.email())
    }

    #[must_use]
    pub fn sweeper(&self) -> Sweeper {
        Sweeper {
            pool: self.pool().clone(),
            stripe: self.stripe().clone(),
            realtime: self.realtime().clone(),
        }
    }

    /// Store settings, cached for a minute.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the settings row can't be read.
    pub async fn settings(&self) -> Result<StoreSettings, RepositoryError> {
        if let Some(settings) = self.inner.settings.get(&()).await {
            return Ok(settings);
        }
        let settings = SettingsRepository::new(self.pool()).get().await?;
        self.inner.settings.insert((), settings.clone()).await;
        Ok(settings)
    }

    /// Drop the cached settings after an update.
    pub async fn invalidate_settings(&self) {
        self.inner.settings.invalidate(&()).await;
    }
}
