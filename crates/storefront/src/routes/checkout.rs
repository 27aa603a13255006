//! Checkout route handler.

use axum::Json;
use tracing::instrument;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::Shopper;
use crate::services::checkout::{CheckoutError, CheckoutForm, CheckoutSummary, summarize};

/// Place the order.
///
/// On success the cart is emptied and its panel closed; on failure the cart
/// is left as it was.
#[instrument(skip_all, fields(visitor = %shopper.visitor_id()))]
pub async fn submit(
    Shopper(shopper): Shopper,
    Json(form): Json<CheckoutForm>,
) -> Result<Json<CheckoutSummary>> {
    let summary = shopper.cart(|cart| {
        let summary = summarize(&form, cart)?;
        cart.clear();
        cart.set_open(false);
        Ok::<_, CheckoutError>(summary)
    })?;

    let reference = summary.reference.to_string();
    add_breadcrumb("checkout", "Order placed", Some(&[("reference", reference.as_str())]));
    tracing::info!(
        reference = %summary.reference,
        item_count = summary.item_count,
        total = %summary.total,
        "Order placed"
    );
    Ok(Json(summary))
}
