//! Wishlist route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use atelier_core::{ProductId, WishlistStore};

use crate::error::{AppError, Result};
use crate::middleware::Shopper;
use crate::routes::products::ProductView;
use crate::state::AppState;

/// Wishlist display data.
#[derive(Debug, Serialize)]
pub struct WishlistView {
    pub items: Vec<ProductView>,
    pub count: usize,
}

impl From<&WishlistStore> for WishlistView {
    fn from(wishlist: &WishlistStore) -> Self {
        Self {
            items: wishlist.items().iter().map(ProductView::from).collect(),
            count: wishlist.count(),
        }
    }
}

/// Show saved products.
pub async fn show(Shopper(shopper): Shopper) -> Json<WishlistView> {
    Json(shopper.wishlist(|wishlist| WishlistView::from(&*wishlist)))
}

/// Save a product. Saving it twice keeps one entry.
#[instrument(skip(state, shopper), fields(visitor = %shopper.visitor_id()))]
pub async fn add(
    State(state): State<AppState>,
    Shopper(shopper): Shopper,
    Path(product_id): Path<ProductId>,
) -> Result<Json<WishlistView>> {
    let product = state
        .catalog()
        .get(&product_id)
        .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))?;

    Ok(Json(shopper.wishlist(|wishlist| {
        wishlist.add(product);
        WishlistView::from(&*wishlist)
    })))
}

/// Forget a product.
#[instrument(skip(shopper), fields(visitor = %shopper.visitor_id()))]
pub async fn remove(
    Shopper(shopper): Shopper,
    Path(product_id): Path<ProductId>,
) -> Json<WishlistView> {
    Json(shopper.wishlist(|wishlist| {
        wishlist.remove(&product_id);
        WishlistView::from(&*wishlist)
    }))
}

/// Forget every saved product.
pub async fn clear(Shopper(shopper): Shopper) -> Json<WishlistView> {
    Json(shopper.wishlist(|wishlist| {
        wishlist.clear();
        WishlistView::from(&*wishlist)
    }))
}
