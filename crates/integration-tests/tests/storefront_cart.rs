//! Integration tests for the cart API.

use atelier_integration_tests::{SWEATER, TEE, TOTE, TestApp};
use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;

#[tokio::test]
async fn test_new_visitor_has_empty_closed_cart() {
    let app = TestApp::new();

    let cart = app.get("/cart").await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["lines"], json!([]));
    assert_eq!(cart.body["item_count"], 0);
    assert_eq!(cart.body["is_open"], false);
    assert_eq!(cart.decimal("/total/amount"), Decimal::ZERO);
}

#[tokio::test]
async fn test_adding_same_variant_merges_lines() {
    let app = TestApp::new();
    let item = json!({ "product_id": TEE, "color": "White", "size": "M" });

    app.post("/cart/items", item.clone()).await;
    let cart = app.post("/cart/items", item).await;

    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["lines"].as_array().map(Vec::len), Some(1));
    assert_eq!(cart.body["lines"][0]["quantity"], 2);
    assert_eq!(cart.body["is_open"], true);
}

#[tokio::test]
async fn test_different_color_is_a_separate_line() {
    let app = TestApp::new();

    app.post(
        "/cart/items",
        json!({ "product_id": TEE, "color": "White", "size": "M" }),
    )
    .await;
    let cart = app
        .post(
            "/cart/items",
            json!({ "product_id": TEE, "color": "Black", "size": "M" }),
        )
        .await;

    assert_eq!(cart.body["lines"].as_array().map(Vec::len), Some(2));
    assert_eq!(cart.body["item_count"], 2);
}

#[tokio::test]
async fn test_totals() {
    let app = TestApp::new();

    app.post(
        "/cart/items",
        json!({ "product_id": TEE, "color": "Black", "size": "L", "quantity": 2 }),
    )
    .await;
    let cart = app
        .post("/cart/items", json!({ "product_id": SWEATER }))
        .await;

    assert_eq!(cart.body["item_count"], 3);
    assert_eq!(cart.decimal("/total/amount"), Decimal::new(17_000, 2));
    assert_eq!(cart.body["total"]["currency_code"], "USD");
    assert_eq!(cart.decimal("/lines/0/subtotal/amount"), Decimal::new(7_000, 2));
}

#[tokio::test]
async fn test_set_quantity_replaces_and_zero_removes() {
    let app = TestApp::new();
    app.post("/cart/items", json!({ "product_id": TOTE, "quantity": 3 }))
        .await;

    let cart = app
        .patch("/cart/items", json!({ "product_id": TOTE, "quantity": 5 }))
        .await;
    assert_eq!(cart.body["lines"][0]["quantity"], 5);

    let cart = app
        .patch("/cart/items", json!({ "product_id": TOTE, "quantity": 0 }))
        .await;
    assert_eq!(cart.body["lines"], json!([]));

    // Setting a missing line does not create it
    let cart = app
        .patch("/cart/items", json!({ "product_id": TOTE, "quantity": 4 }))
        .await;
    assert_eq!(cart.body["lines"], json!([]));
}

#[tokio::test]
async fn test_negative_quantity_removes_line() {
    let app = TestApp::new();
    app.post("/cart/items", json!({ "product_id": TOTE })).await;

    let cart = app
        .patch("/cart/items", json!({ "product_id": TOTE, "quantity": -2 }))
        .await;
    assert_eq!(cart.body["item_count"], 0);
}

#[tokio::test]
async fn test_remove_only_matching_variant() {
    let app = TestApp::new();
    app.post(
        "/cart/items",
        json!({ "product_id": TEE, "color": "White", "size": "S" }),
    )
    .await;
    app.post(
        "/cart/items",
        json!({ "product_id": TEE, "color": "White", "size": "M" }),
    )
    .await;

    let cart = app
        .delete(
            "/cart/items",
            Some(json!({ "product_id": TEE, "color": "White", "size": "S" })),
        )
        .await;

    assert_eq!(cart.body["lines"].as_array().map(Vec::len), Some(1));
    assert_eq!(cart.body["lines"][0]["size"], "M");
}

#[tokio::test]
async fn test_clear_keeps_panel_state() {
    let app = TestApp::new();
    app.post("/cart/items", json!({ "product_id": TOTE })).await;

    let cart = app.delete("/cart", None).await;
    assert_eq!(cart.body["item_count"], 0);
    assert_eq!(cart.body["is_open"], true);
}

#[tokio::test]
async fn test_panel_toggle() {
    let app = TestApp::new();

    let cart = app.put("/cart/panel", json!({ "open": true })).await;
    assert_eq!(cart.body["is_open"], true);

    let cart = app.put("/cart/panel", json!({ "open": false })).await;
    assert_eq!(cart.body["is_open"], false);
    assert_eq!(app.get("/cart").await.body["is_open"], false);
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let app = TestApp::new();

    let response = app.post("/cart/items", json!({ "product_id": 999 })).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/cart").await.body["item_count"], 0);
}

#[tokio::test]
async fn test_unavailable_variant_is_rejected() {
    let app = TestApp::new();

    let response = app
        .post(
            "/cart/items",
            json!({ "product_id": TEE, "color": "Purple", "size": "M" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.error().is_some_and(|e| e.contains("Purple")));
}

#[tokio::test]
async fn test_visitors_have_separate_carts() {
    let app = TestApp::new();
    let other = app.visitor();

    app.post("/cart/items", json!({ "product_id": TOTE })).await;

    assert_eq!(app.get("/cart").await.body["item_count"], 1);
    assert_eq!(other.get("/cart").await.body["item_count"], 0);
}

#[tokio::test]
async fn test_mutation_responses_match_cart() {
    let app = TestApp::new();

    let added = app
        .post("/cart/items", json!({ "product_id": SWEATER, "quantity": 2 }))
        .await;
    assert_eq!(added.body, app.get("/cart").await.body);

    let updated = app
        .patch("/cart/items", json!({ "product_id": SWEATER, "quantity": 1 }))
        .await;
    assert_eq!(updated.body, app.get("/cart").await.body);
    assert_eq!(updated.decimal("/total/amount"), Decimal::new(10_000, 2));
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let response = app.get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "ok");
}
