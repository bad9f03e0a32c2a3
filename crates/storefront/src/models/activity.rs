//! Admin audit trail entries.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vendora_core::{ActivityLogId, UserId};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: ActivityLogId,
    pub user_id: UserId,
    pub user_email: Option<String>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Admin mutations recorded in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityAction {
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    UpdateInventory,
    UpdateOrderStatus,
    AddTracking,
    RefundOrder,
    ChangeUserRole,
    DisableUser,
    EnableUser,
    UpdateSettings,
}

impl ActivityAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateProduct => "CREATE_PRODUCT",
            Self::UpdateProduct => "UPDATE_PRODUCT",
            Self::DeleteProduct => "DELETE_PRODUCT",
            Self::UpdateInventory => "UPDATE_INVENTORY",
            Self::UpdateOrderStatus => "UPDATE_ORDER_STATUS",
            Self::AddTracking => "ADD_TRACKING",
            Self::RefundOrder => "REFUND_ORDER",
            Self::ChangeUserRole => "CHANGE_USER_ROLE",
            Self::DisableUser => "DISABLE_USER",
            Self::EnableUser => "ENABLE_USER",
            Self::UpdateSettings => "UPDATE_SETTINGS",
        }
    }

    /// Entity type the action applies to.
    #[must_use]
    pub const fn entity_type(self) -> &'static str {
        match self {
            Self::CreateProduct | Self::UpdateProduct | Self::DeleteProduct => "product",
            Self::UpdateInventory => "inventory",
            Self::UpdateOrderStatus | Self::AddTracking | Self::RefundOrder => "order",
            Self::ChangeUserRole | Self::DisableUser | Self::EnableUser => "user",
            Self::UpdateSettings => "settings",
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
