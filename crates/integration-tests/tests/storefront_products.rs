//! Integration tests for the product catalog API.

use atelier_integration_tests::{SWEATER, TEE, TestApp};
use axum::http::StatusCode;

#[tokio::test]
async fn test_list_all_products() {
    let app = TestApp::new();

    let list = app.get("/products").await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body["count"], 3);
}

#[tokio::test]
async fn test_filter_by_category_and_flags() {
    let app = TestApp::new();

    let tops = app.get("/products?category=Tops").await;
    assert_eq!(tops.body["count"], 1);
    assert_eq!(tops.body["products"][0]["id"], TEE);

    let featured = app.get("/products?featured=true").await;
    assert_eq!(featured.body["count"], 1);
    assert_eq!(featured.body["products"][0]["id"], SWEATER);

    let search = app.get("/products?q=merino").await;
    assert_eq!(search.body["products"][0]["id"], SWEATER);
}

#[tokio::test]
async fn test_product_detail() {
    let app = TestApp::new();

    let sweater = app.get(&format!("/products/{SWEATER}")).await;
    assert_eq!(sweater.status, StatusCode::OK);
    assert_eq!(sweater.body["name"], "Merino Sweater");
    assert_eq!(sweater.body["discount_percent"], 20);

    let tee = app.get(&format!("/products/{TEE}")).await;
    assert!(tee.body.get("discount_percent").is_none());
    assert_eq!(tee.body["colors"][1]["name"], "Black");
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let app = TestApp::new();

    let response = app.get("/products/404").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.error(), Some("Not found: product 404"));
}
