//! Atelier Core - shared types and shopper state.
//!
//! This crate provides the pieces of the storefront that carry real
//! invariants and no I/O:
//! - [`types`] - IDs, email addresses, prices and the product model
//! - [`cart`] - the cart store (composite-key line items, totals, panel flag)
//! - [`wishlist`] - the wishlist store (deduplicated saved products)
//!
//! # Architecture
//!
//! Nothing in here talks to the network, a database or a clock. The
//! storefront crate owns one cart and one wishlist per visitor and mutates
//! them from its HTTP handlers; tests construct isolated instances directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod types;
pub mod wishlist;

pub use cart::{CartLine, CartStore, LineKey};
pub use types::*;
pub use wishlist::WishlistStore;
