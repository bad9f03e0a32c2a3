//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Password and OAuth sign-in, verification and reset tokens
//! - `cart` - Server-side cart pricing
//! - `checkout` - Stock holds plus payment intent creation
//! - `payments` - Webhook and client-confirmed payment outcomes, refunds
//! - `inventory` - Availability publishing and the expired-hold sweeper
//! - `stripe` - Payment processor REST client and webhook verification
//! - `realtime` - Ably publishing and token requests
//! - `email` - Transactional email

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod email;
pub mod inventory;
pub mod payments;
pub mod realtime;
pub mod stripe;
