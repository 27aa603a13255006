//! Checkout form validation.
//!
//! Checkout collects contact and shipping details and returns an order
//! summary with a reference number. No payment is taken and no order is
//! persisted.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use atelier_core::{CartStore, Email, EmailError, Price, ProductId};

/// Errors that reject a checkout submission.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("{0} is required")]
    MissingField(&'static str),
}

/// Submitted checkout form.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutForm {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Validated shipping details.
#[derive(Debug, Clone, Serialize)]
pub struct ShippingAddress {
    pub name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryLine {
    pub product_id: ProductId,
    pub name: String,
    pub color: String,
    pub size: String,
    pub quantity: u32,
    pub unit_price: Price,
    pub subtotal: Price,
}

/// What the shopper sees after placing the order.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSummary {
    pub reference: Uuid,
    pub email: Email,
    pub ship_to: ShippingAddress,
    pub lines: Vec<SummaryLine>,
    pub item_count: u64,
    pub total: Price,
}

fn required(value: &str, field: &'static str) -> Result<String, CheckoutError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CheckoutError::MissingField(field));
    }
    Ok(value.to_string())
}

/// Validate `form` against `cart` and build the summary.
///
/// The cart is not modified.
///
/// # Errors
///
/// Returns `CheckoutError::EmptyCart` for an empty cart, otherwise the
/// first invalid field.
pub fn summarize(form: &CheckoutForm, cart: &CartStore) -> Result<CheckoutSummary, CheckoutError> {
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let email = Email::parse(&form.email)?;
    let first_name = required(&form.first_name, "first_name")?;
    let last_name = required(&form.last_name, "last_name")?;
    let ship_to = ShippingAddress {
        name: format!("{first_name} {last_name}"),
        address: required(&form.address, "address")?,
        city: required(&form.city, "city")?,
        postal_code: required(&form.postal_code, "postal_code")?,
        country: required(&form.country, "country")?,
        phone: form
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from),
    };

    let lines = cart
        .lines()
        .iter()
        .map(|line| SummaryLine {
            product_id: line.product().id,
            name: line.product().name.clone(),
            color: line.color().to_string(),
            size: line.size().to_string(),
            quantity: line.quantity(),
            unit_price: line.product().price,
            subtotal: line.subtotal(),
        })
        .collect();

    Ok(CheckoutSummary {
        reference: Uuid::new_v4(),
        email,
        ship_to,
        lines,
        item_count: cart.total_item_count(),
        total: cart.total_price(),
    })
}
