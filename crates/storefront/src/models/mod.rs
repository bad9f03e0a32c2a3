//! Domain models for the storefront.
//!
//! These types are validated domain objects, separate from the row structs
//! the repositories decode.

pub mod activity;
pub mod catalog;
pub mod order;
pub mod reservation;
pub mod review;
pub mod session;
pub mod settings;
pub mod user;

pub use activity::{ActivityAction, ActivityEntry};
pub use catalog::{Category, InventoryLevel, Product, ProductDetail, Variant};
pub use order::{Order, OrderDetail, OrderItem, OrderWithItems, ShippingAddress};
pub use reservation::{HoldRequest, Reservation};
pub use review::{Review, ReviewSummary};
pub use session::{CurrentUser, keys as session_keys};
pub use settings::StoreSettings;
pub use user::User;
