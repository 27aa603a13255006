//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Auth Session Controller and the backend seams it uses
//! - `shopper` - Per-visitor cart, wishlist and auth state
//! - `checkout` - Checkout form validation and order summary

pub mod auth;
pub mod checkout;
pub mod shopper;

pub use shopper::{ShopperRegistry, ShopperSession};
