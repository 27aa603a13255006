//! Product route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Serialize;
use tracing::instrument;

use atelier_core::{Product, ProductId};

use crate::catalog::CatalogQuery;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Product as rendered to the client, with the computed markdown.
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<u32>,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            discount_percent: product.discount_percent(),
            product: product.clone(),
        }
    }
}

/// Product listing response.
#[derive(Debug, Serialize)]
pub struct ProductList {
    pub products: Vec<ProductView>,
    pub count: usize,
}

/// List catalog products, optionally filtered.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Json<ProductList> {
    let products: Vec<ProductView> = state
        .catalog()
        .query(&query)
        .into_iter()
        .map(ProductView::from)
        .collect();

    Json(ProductList {
        count: products.len(),
        products,
    })
}

/// Product detail.
#[instrument(skip(state), fields(product_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductView>> {
    state
        .catalog()
        .get(&id)
        .map(|product| Json(ProductView::from(product)))
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))
}
