//! User roles and the permission table behind the admin console.

use serde::{Deserialize, Serialize};

/// Account role.
///
/// `Admin`, `Staff` and `Viewer` are back-office roles; `Customer` is the
/// default for every self-registered account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlite", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlite", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Staff,
    Viewer,
    #[default]
    Customer,
}

impl Role {
    pub const ALL: [Self; 4] = [Self::Admin, Self::Staff, Self::Viewer, Self::Customer];

    /// Whether the role may enter the admin console at all.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        !matches!(self, Self::Customer)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Staff => "STAFF",
            Self::Viewer => "VIEWER",
            Self::Customer => "CUSTOMER",
        }
    }

    #[must_use]
    pub const fn permissions(self) -> Permissions {
        match self {
            Self::Admin => Permissions {
                view_dashboard: true,
                manage_products: true,
                manage_orders: true,
                manage_users: true,
                manage_inventory: true,
                view_finance: true,
                export_data: true,
                manage_settings: true,
                refund_orders: true,
                delete_products: true,
                ban_users: true,
            },
            Self::Staff => Permissions {
                view_dashboard: true,
                manage_products: true,
                manage_orders: true,
                manage_inventory: true,
                ..Permissions::NONE
            },
            Self::Viewer => Permissions {
                view_dashboard: true,
                view_finance: true,
                export_data: true,
                ..Permissions::NONE
            },
            Self::Customer => Permissions::NONE,
        }
    }

    #[must_use]
    pub const fn can(self, permission: Permission) -> bool {
        self.permissions().allows(permission)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "STAFF" => Ok(Self::Staff),
            "VIEWER" => Ok(Self::Viewer),
            "CUSTOMER" => Ok(Self::Customer),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

/// A single capability checked by admin routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewDashboard,
    ManageProducts,
    ManageOrders,
    ManageUsers,
    ManageInventory,
    ViewFinance,
    ExportData,
    ManageSettings,
    RefundOrders,
    DeleteProducts,
    BanUsers,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ViewDashboard => "view_dashboard",
            Self::ManageProducts => "manage_products",
            Self::ManageOrders => "manage_orders",
            Self::ManageUsers => "manage_users",
            Self::ManageInventory => "manage_inventory",
            Self::ViewFinance => "view_finance",
            Self::ExportData => "export_data",
            Self::ManageSettings => "manage_settings",
            Self::RefundOrders => "refund_orders",
            Self::DeleteProducts => "delete_products",
            Self::BanUsers => "ban_users",
        };
        f.write_str(name)
    }
}

/// The full permission set of a role, serialized for the admin UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct Permissions {
    pub view_dashboard: bool,
    pub manage_products: bool,
    pub manage_orders: bool,
    pub manage_users: bool,
    pub manage_inventory: bool,
    pub view_finance: bool,
    pub export_data: bool,
    pub manage_settings: bool,
    pub refund_orders: bool,
    pub delete_products: bool,
    pub ban_users: bool,
}

impl Permissions {
    pub const NONE: Self = Self {
        view_dashboard: false,
        manage_products: false,
        manage_orders: false,
        manage_users: false,
        manage_inventory: false,
        view_finance: false,
        export_data: false,
        manage_settings: false,
        refund_orders: false,
        delete_products: false,
        ban_users: false,
    };

    #[must_use]
    pub const fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::ViewDashboard => self.view_dashboard,
            Permission::ManageProducts => self.manage_products,
            Permission::ManageOrders => self.manage_orders,
            Permission::ManageUsers => self.manage_users,
            Permission::ManageInventory => self.manage_inventory,
            Permission::ViewFinance => self.view_finance,
            Permission::ExportData => self.export_data,
            Permission::ManageSettings => self.manage_settings,
            Permission::RefundOrders => self.refund_orders,
            Permission::DeleteProducts => self.delete_products,
            Permission::BanUsers => self.ban_users,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_has_everything() {
        let p = Role::Admin.permissions();
        assert!(p.manage_users && p.refund_orders && p.delete_products && p.ban_users);
    }

    #[test]
    fn test_staff_cannot_refund_or_see_finance() {
        assert!(Role::Staff.can(Permission::ManageOrders));
        assert!(Role::Staff.can(Permission::ManageInventory));
        assert!(!Role::Staff.can(Permission::RefundOrders));
        assert!(!Role::Staff.can(Permission::ViewFinance));
        assert!(!Role::Staff.can(Permission::DeleteProducts));
    }

    #[test]
    fn test_viewer_is_read_only_finance() {
        assert!(Role::Viewer.can(Permission::ViewDashboard));
        assert!(Role::Viewer.can(Permission::ExportData));
        assert!(!Role::Viewer.can(Permission::ManageProducts));
    }

    #[test]
    fn test_customer_has_nothing() {
        assert_eq!(Role::Customer.permissions(), Permissions::NONE);
        assert!(!Role::Customer.is_staff());
    }

    #[test]
    fn test_role_parse_and_display() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert_eq!("staff".parse::<Role>().unwrap(), Role::Staff);
        assert!("owner".parse::<Role>().is_err());
    }
}
