//! Vendora Core - Shared domain types.
//!
//! This crate provides common types used across all Vendora components:
//! - `storefront` - Catalog, checkout, orders and the admin API
//! - `cli` - Command-line tools for migrations, seeding and maintenance
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. The optional `sqlite` feature adds `sqlx` encoding so the
//! storefront can bind these types directly.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, emails, roles and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
