//! Admin route handlers.
//!
//! Only signed-in users holding the admin role get past [`RequireAdmin`].

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::instrument;

use atelier_core::{CurrencyCode, Product};

use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Catalog and traffic overview.
#[derive(Debug, Serialize)]
pub struct AdminOverview {
    pub product_count: usize,
    pub categories: Vec<String>,
    pub featured: usize,
    pub new_arrivals: usize,
    pub bestsellers: usize,
    pub on_sale: usize,
    pub currency: CurrencyCode,
    /// Shopper sessions currently held in memory.
    pub active_shoppers: u64,
}

/// Admin dashboard data.
#[instrument(skip_all, fields(user_id = %admin.id))]
pub async fn overview(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Json<AdminOverview> {
    state.shoppers().sync().await;

    let catalog = state.catalog();
    let count = |pred: fn(&Product) -> bool| catalog.all().iter().filter(|p| pred(p)).count();

    Json(AdminOverview {
        product_count: catalog.len(),
        categories: catalog.categories().into_iter().map(String::from).collect(),
        featured: count(|p| p.is_featured),
        new_arrivals: count(|p| p.is_new),
        bestsellers: count(|p| p.is_bestseller),
        on_sale: count(|p| p.discount_percent().is_some()),
        currency: catalog.currency(),
        active_shoppers: state.shoppers().active(),
    })
}
