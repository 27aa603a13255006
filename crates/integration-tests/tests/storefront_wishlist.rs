//! Integration tests for the wishlist API.

use atelier_integration_tests::{SWEATER, TEE, TestApp};
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_saving_twice_keeps_one_entry() {
    let app = TestApp::new();

    app.post_empty(&format!("/wishlist/{TEE}")).await;
    let wishlist = app.post_empty(&format!("/wishlist/{TEE}")).await;

    assert_eq!(wishlist.status, StatusCode::OK);
    assert_eq!(wishlist.body["count"], 1);
    assert_eq!(wishlist.body["items"][0]["id"], TEE);
}

#[tokio::test]
async fn test_items_keep_insertion_order() {
    let app = TestApp::new();

    app.post_empty(&format!("/wishlist/{SWEATER}")).await;
    app.post_empty(&format!("/wishlist/{TEE}")).await;

    let wishlist = app.get("/wishlist").await;
    assert_eq!(wishlist.body["items"][0]["id"], SWEATER);
    assert_eq!(wishlist.body["items"][1]["id"], TEE);
    assert_eq!(wishlist.body["items"][0]["discount_percent"], 20);
}

#[tokio::test]
async fn test_remove_and_clear() {
    let app = TestApp::new();
    app.post_empty(&format!("/wishlist/{TEE}")).await;
    app.post_empty(&format!("/wishlist/{SWEATER}")).await;

    let wishlist = app.delete(&format!("/wishlist/{TEE}"), None).await;
    assert_eq!(wishlist.body["count"], 1);

    // Forgetting an unsaved product is a no-op
    let wishlist = app.delete(&format!("/wishlist/{TEE}"), None).await;
    assert_eq!(wishlist.body["count"], 1);

    let wishlist = app.delete("/wishlist", None).await;
    assert_eq!(wishlist.body, json!({ "items": [], "count": 0 }));
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let app = TestApp::new();

    let response = app.post_empty("/wishlist/404").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/wishlist").await.body["count"], 0);
}

#[tokio::test]
async fn test_wishlist_does_not_touch_cart() {
    let app = TestApp::new();
    app.post_empty(&format!("/wishlist/{TEE}")).await;

    assert_eq!(app.get("/cart").await.body["item_count"], 0);
}
