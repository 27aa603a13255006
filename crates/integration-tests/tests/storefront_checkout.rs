//! Integration tests for checkout.

use atelier_integration_tests::{SWEATER, TEE, TestApp};
use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::{Value, json};

fn form() -> Value {
    json!({
        "email": "ada@example.com",
        "first_name": "Ada",
        "last_name": "Lovelace",
        "address": "12 Analytical Row",
        "city": "London",
        "postal_code": "N1 9GU",
        "country": "GB"
    })
}

#[tokio::test]
async fn test_checkout_summarises_and_empties_cart() {
    let app = TestApp::new();
    app.post(
        "/cart/items",
        json!({ "product_id": TEE, "color": "White", "size": "S", "quantity": 2 }),
    )
    .await;
    app.post("/cart/items", json!({ "product_id": SWEATER }))
        .await;

    let summary = app.post("/checkout", form()).await;
    assert_eq!(summary.status, StatusCode::OK);
    assert_eq!(summary.body["item_count"], 3);
    assert_eq!(summary.decimal("/total/amount"), Decimal::new(17_000, 2));
    assert_eq!(summary.body["ship_to"]["name"], "Ada Lovelace");
    assert_eq!(summary.body["lines"].as_array().map(Vec::len), Some(2));
    assert!(summary.body["reference"].is_string());

    let cart = app.get("/cart").await;
    assert_eq!(cart.body["item_count"], 0);
    assert_eq!(cart.body["is_open"], false);
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let app = TestApp::new();

    let response = app.post("/checkout", form()).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error(), Some("cart is empty"));
}

#[tokio::test]
async fn test_invalid_form_leaves_cart_alone() {
    let app = TestApp::new();
    app.post("/cart/items", json!({ "product_id": SWEATER }))
        .await;

    let mut incomplete = form();
    incomplete["city"] = json!("");
    let response = app.post("/checkout", incomplete).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error(), Some("city is required"));

    let cart = app.get("/cart").await;
    assert_eq!(cart.body["item_count"], 1);
    assert_eq!(cart.body["is_open"], true);
}
