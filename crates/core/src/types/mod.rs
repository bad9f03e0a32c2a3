//! Core types for Vendora.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod payment;
pub mod price;
pub mod role;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use payment::{CheckoutId, PaymentIntentId};
pub use price::{CurrencyCode, Price, PriceError};
pub use role::{Permission, Permissions, Role};
pub use status::*;
