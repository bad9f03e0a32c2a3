//! Stock hold maintenance.
//!
//! `vendora reservations sweep` runs one pass of the same sweeper the
//! server runs on a timer: expired holds are released, the freed stock is
//! published and the abandoned payment intents are cancelled. It needs the
//! full server configuration for the payment and realtime clients.

use vendora_storefront::config::StorefrontConfig;
use vendora_storefront::db;
use vendora_storefront::state::AppState;

/// Release every expired hold once.
///
/// # Errors
///
/// Returns an error if the configuration is incomplete or the release
/// transaction fails.
pub async fn sweep() -> Result<(), Box<dyn std::error::Error>> {
    let config = StorefrontConfig::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;
    let state = AppState::new(config, pool)?;

    let report = state.sweeper().sweep_once().await?;
    tracing::info!(
        holds = report.released_holds,
        units = report.released_units,
        payment_intents = report.payment_intents.len(),
        "Sweep complete"
    );
    Ok(())
}
