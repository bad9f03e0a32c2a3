//! Store-wide settings.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use vendora_core::{CurrencyCode, Permission};

use super::{Audit, ClientIp};
use crate::db::SettingsRepository;
use crate::db::settings::SettingsUpdate;
use crate::error::{AppError, Result};
use crate::middleware::RequireStaff;
use crate::models::ActivityAction;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsForm {
    pub store_name: String,
    pub store_logo: Option<String>,
    pub currency: String,
    pub tax_rate: f64,
    pub low_stock_threshold: i64,
}

impl SettingsForm {
    fn validate(self) -> Result<SettingsUpdate> {
        let store_name = self.store_name.trim().to_owned();
        if store_name.is_empty() {
            return Err(AppError::BadRequest("Store name is required".to_string()));
        }
        if self.currency.trim().is_empty() {
            return Err(AppError::BadRequest("Currency is required".to_string()));
        }
        let currency: CurrencyCode = self
            .currency
            .parse()
            .map_err(|e: vendora_core::PriceError| AppError::BadRequest(e.to_string()))?;
        if !(0.0..=100.0).contains(&self.tax_rate) {
            return Err(AppError::BadRequest("Invalid tax rate".to_string()));
        }
        if self.low_stock_threshold < 0 {
            return Err(AppError::BadRequest("Invalid low stock threshold".to_string()));
        }
        Ok(SettingsUpdate {
            store_name,
            store_logo: self
                .store_logo
                .map(|l| l.trim().to_owned())
                .filter(|l| !l.is_empty()),
            currency,
            tax_rate: self.tax_rate,
            low_stock_threshold: self.low_stock_threshold,
        })
    }
}

/// `GET /api/admin/settings`
pub async fn show(State(state): State<AppState>, staff: RequireStaff) -> Result<Json<Value>> {
    staff.require(Permission::ManageSettings)?;
    let settings = state.settings().await?;
    Ok(Json(json!({ "settings": settings })))
}

/// `PUT /api/admin/settings`
#[tracing::instrument(skip(state, staff, ip, form))]
pub async fn update(
    State(state): State<AppState>,
    staff: RequireStaff,
    ip: ClientIp,
    Json(form): Json<SettingsForm>,
) -> Result<Json<Value>> {
    let actor = staff.require(Permission::ManageSettings)?;
    let update = form.validate()?;

    let settings = SettingsRepository::new(state.pool()).update(&update).await?;
    state.invalidate_settings().await;

    Audit::new(actor, ip)
        .record(
            &state,
            ActivityAction::UpdateSettings,
            "settings",
            Some("Updated store settings".to_string()),
        )
        .await;

    Ok(Json(json!({ "settings": settings })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form() -> SettingsForm {
        SettingsForm {
            store_name: " Vendora ".to_string(),
            store_logo: Some(String::new()),
            currency: "EUR".to_string(),
            tax_rate: 8.5,
            low_stock_threshold: 3,
        }
    }

    #[test]
    fn test_validate_normalizes() {
        let update = form().validate().unwrap();
        assert_eq!(update.store_name, "Vendora");
        assert_eq!(update.store_logo, None);
        assert_eq!(update.currency, CurrencyCode::Eur);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut f = form();
        f.store_name = "  ".to_string();
        assert!(f.validate().is_err());

        let mut f = form();
        f.tax_rate = 100.5;
        assert!(f.validate().is_err());

        let mut f = form();
        f.tax_rate = f64::NAN;
        assert!(f.validate().is_err());

        let mut f = form();
        f.low_stock_threshold = -1;
        assert!(f.validate().is_err());

        let mut f = form();
        f.currency = "xyz".to_string();
        assert!(f.validate().is_err());
    }
}
