//! Cart route handlers.
//!
//! Every mutating handler answers with the updated cart so the client can
//! re-render the panel without a second round trip.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use atelier_core::{CartLine, CartStore, Price, Product, ProductId};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::Shopper;
use crate::state::AppState;

/// Cart line display data.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    pub product_id: ProductId,
    pub name: String,
    pub image: Option<String>,
    pub color: String,
    pub size: String,
    pub quantity: u32,
    pub unit_price: Price,
    pub subtotal: Price,
}

impl From<&CartLine> for CartLineView {
    fn from(line: &CartLine) -> Self {
        let product = line.product();
        Self {
            product_id: product.id,
            name: product.name.clone(),
            image: product.primary_image().map(String::from),
            color: line.color().to_string(),
            size: line.size().to_string(),
            quantity: line.quantity(),
            unit_price: product.price,
            subtotal: line.subtotal(),
        }
    }
}

/// Cart display data.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub item_count: u64,
    pub total: Price,
    pub is_open: bool,
}

impl From<&CartStore> for CartView {
    fn from(cart: &CartStore) -> Self {
        Self {
            lines: cart.lines().iter().map(CartLineView::from).collect(),
            item_count: cart.total_item_count(),
            total: cart.total_price(),
            is_open: cart.is_open(),
        }
    }
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddItemForm {
    pub product_id: ProductId,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub size: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// Update quantity form data.
#[derive(Debug, Deserialize)]
pub struct SetQuantityForm {
    pub product_id: ProductId,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub size: String,
    pub quantity: i64,
}

/// Remove line form data.
#[derive(Debug, Deserialize)]
pub struct RemoveItemForm {
    pub product_id: ProductId,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub size: String,
}

/// Open/close the cart panel.
#[derive(Debug, Deserialize)]
pub struct PanelForm {
    pub open: bool,
}

/// Reject a color or size the product does not offer. Products without
/// variants of a kind accept any value for it.
fn check_variant(product: &Product, color: &str, size: &str) -> Result<()> {
    if !product.colors.is_empty() && !product.has_color(color) {
        return Err(AppError::BadRequest(format!(
            "{} is not available in color {color:?}",
            product.name
        )));
    }
    if !product.sizes.is_empty() && !product.has_size(size) {
        return Err(AppError::BadRequest(format!(
            "{} is not available in size {size:?}",
            product.name
        )));
    }
    Ok(())
}

/// Show the cart.
#[instrument(skip(shopper), fields(visitor = %shopper.visitor_id()))]
pub async fn show(Shopper(shopper): Shopper) -> Json<CartView> {
    Json(shopper.cart(|cart| CartView::from(&*cart)))
}

/// Add a product variant to the cart.
#[instrument(skip(state, shopper, form), fields(visitor = %shopper.visitor_id(), product_id = %form.product_id))]
pub async fn add(
    State(state): State<AppState>,
    Shopper(shopper): Shopper,
    Json(form): Json<AddItemForm>,
) -> Result<Json<CartView>> {
    let product = state
        .catalog()
        .get(&form.product_id)
        .ok_or_else(|| AppError::NotFound(format!("product {}", form.product_id)))?;
    check_variant(product, &form.color, &form.size)?;

    let view = shopper.cart(|cart| {
        cart.add_item(product, &form.color, &form.size, form.quantity);
        CartView::from(&*cart)
    });

    let product_id = form.product_id.to_string();
    let quantity = form.quantity.to_string();
    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("product_id", product_id.as_str()), ("quantity", quantity.as_str())]),
    );
    tracing::info!(item_count = view.item_count, "Cart updated");
    Ok(Json(view))
}

/// Replace a line's quantity. Zero or less removes the line.
#[instrument(skip(shopper, form), fields(visitor = %shopper.visitor_id(), product_id = %form.product_id))]
pub async fn update(Shopper(shopper): Shopper, Json(form): Json<SetQuantityForm>) -> Json<CartView> {
    Json(shopper.cart(|cart| {
        cart.set_quantity(&form.product_id, &form.color, &form.size, form.quantity);
        CartView::from(&*cart)
    }))
}

/// Remove a line.
#[instrument(skip(shopper, form), fields(visitor = %shopper.visitor_id(), product_id = %form.product_id))]
pub async fn remove(Shopper(shopper): Shopper, Json(form): Json<RemoveItemForm>) -> Json<CartView> {
    Json(shopper.cart(|cart| {
        cart.remove_item(&form.product_id, &form.color, &form.size);
        CartView::from(&*cart)
    }))
}

/// Empty the cart.
#[instrument(skip(shopper), fields(visitor = %shopper.visitor_id()))]
pub async fn clear(Shopper(shopper): Shopper) -> Json<CartView> {
    Json(shopper.cart(|cart| {
        cart.clear();
        CartView::from(&*cart)
    }))
}

/// Open or close the cart panel.
pub async fn set_panel(Shopper(shopper): Shopper, Json(form): Json<PanelForm>) -> Json<CartView> {
    Json(shopper.cart(|cart| {
        cart.set_open(form.open);
        CartView::from(&*cart)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::{ColorVariant, CurrencyCode};
    use std::collections::BTreeSet;

    fn tee() -> Product {
        Product {
            id: ProductId::new(7),
            name: "Pima Tee".to_string(),
            price: Price::from_minor_units(3_500, CurrencyCode::USD),
            original_price: None,
            category: "Tops".to_string(),
            description: None,
            images: vec!["/img/tee.jpg".to_string()],
            colors: vec![ColorVariant {
                name: "White".to_string(),
                value: "#ffffff".to_string(),
                image: None,
            }],
            sizes: vec!["S".to_string(), "M".to_string()],
            tags: BTreeSet::new(),
            is_new: false,
            is_bestseller: false,
            is_featured: false,
        }
    }

    #[test]
    fn test_check_variant() {
        let product = tee();
        assert!(check_variant(&product, "White", "M").is_ok());
        assert!(matches!(
            check_variant(&product, "Black", "M"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            check_variant(&product, "White", "XXL"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_variantless_product_accepts_anything() {
        let mut product = tee();
        product.colors.clear();
        product.sizes.clear();
        assert!(check_variant(&product, "", "").is_ok());
        assert!(check_variant(&product, "Any", "One Size").is_ok());
    }

    #[test]
    fn test_cart_view() {
        let mut cart = CartStore::new();
        cart.add_item(&tee(), "White", "M", 3);
        let view = CartView::from(&cart);

        assert!(view.is_open);
        assert_eq!(view.item_count, 3);
        assert_eq!(view.total, Price::from_minor_units(10_500, CurrencyCode::USD));
        assert_eq!(view.lines[0].image.as_deref(), Some("/img/tee.jpg"));
        assert_eq!(view.lines[0].subtotal, view.total);
    }
}
