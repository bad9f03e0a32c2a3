//! Store-wide settings.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vendora_core::CurrencyCode;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettings {
    pub store_name: String,
    pub store_logo: Option<String>,
    pub currency: CurrencyCode,
    /// Percentage, 0 to 100
    pub tax_rate: f64,
    pub low_stock_threshold: i64,
    pub updated_at: DateTime<Utc>,
}
