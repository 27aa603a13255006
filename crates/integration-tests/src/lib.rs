//! Integration tests for the Atelier storefront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p atelier-integration-tests
//! ```
//!
//! The full router runs in-process with in-memory backend fakes, so no
//! server, network or credentials are needed.
//!
//! # Test Categories
//!
//! - `storefront_products` - Catalog listing and detail
//! - `storefront_cart` - Cart lines, totals and panel flag
//! - `storefront_wishlist` - Saved products
//! - `storefront_auth` - Sign-in, sign-up, guards and admin role
//! - `storefront_checkout` - Checkout summary and cart reset

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;

use atelier_core::{ColorVariant, CurrencyCode, Price, Product, ProductId};
use atelier_storefront::catalog::Catalog;
use atelier_storefront::routes;
use atelier_storefront::state::AppState;
use atelier_storefront::testing::{FakeConnector, test_config};

pub const TEE: i32 = 1;
pub const TOTE: i32 = 2;
pub const SWEATER: i32 = 3;

fn color(name: &str, value: &str) -> ColorVariant {
    ColorVariant {
        name: name.to_string(),
        value: value.to_string(),
        image: None,
    }
}

fn product(id: i32, name: &str, cents: i64, category: &str) -> Product {
    Product {
        id: ProductId::new(id),
        name: name.to_string(),
        price: Price::from_minor_units(cents, CurrencyCode::USD),
        original_price: None,
        category: category.to_string(),
        description: None,
        images: vec![format!("/images/{id}.jpg")],
        colors: vec![],
        sizes: vec![],
        tags: BTreeSet::new(),
        is_new: false,
        is_bestseller: false,
        is_featured: false,
    }
}

/// Three products: a $35 tee in two colors and three sizes, a $20 tote
/// without variants, and a featured $100 sweater marked down from $125.
///
/// # Panics
///
/// Panics if the fixture fails catalog validation.
#[must_use]
pub fn sample_catalog() -> Catalog {
    let mut tee = product(TEE, "Pima Tee", 3_500, "Tops");
    tee.colors = vec![color("White", "#ffffff"), color("Black", "#000000")];
    tee.sizes = vec!["S".to_string(), "M".to_string(), "L".to_string()];
    tee.is_bestseller = true;

    let tote = product(TOTE, "Canvas Tote", 2_000, "Accessories");

    let mut sweater = product(SWEATER, "Merino Sweater", 10_000, "Knitwear");
    sweater.original_price = Some(Price::from_minor_units(12_500, CurrencyCode::USD));
    sweater.is_featured = true;
    sweater.is_new = true;

    Catalog::from_products(vec![tee, tote, sweater]).expect("valid fixture catalog")
}

/// A decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    /// JSON body, `Value::String` for plain text, `Value::Null` when empty.
    pub body: Value,
}

impl TestResponse {
    /// Decimal at `pointer` in the body, for comparing money amounts.
    ///
    /// # Panics
    ///
    /// Panics if the pointer is missing or not a decimal string.
    #[must_use]
    pub fn decimal(&self, pointer: &str) -> Decimal {
        let raw = self
            .body
            .pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_else(|| panic!("no decimal at {pointer} in {}", self.body));
        Decimal::from_str(raw).expect("decimal amount")
    }

    /// Error message of a `{"error": "..."}` body.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

/// One browser talking to an in-process storefront.
///
/// Carries the session cookie between requests. [`TestApp::visitor`] opens
/// another browser against the same app and backend.
pub struct TestApp {
    router: Router,
    backend: Arc<FakeConnector>,
    cookie: Mutex<Option<String>>,
}

impl TestApp {
    /// An app over [`sample_catalog`] and an empty fake backend.
    #[must_use]
    pub fn new() -> Self {
        let backend = Arc::new(FakeConnector::new());
        let state = AppState::new(test_config(), sample_catalog(), backend.clone());
        Self {
            router: routes::app(state),
            backend,
            cookie: Mutex::new(None),
        }
    }

    /// A second visitor with no cookie, sharing the app and backend.
    #[must_use]
    pub fn visitor(&self) -> Self {
        Self {
            router: self.router.clone(),
            backend: Arc::clone(&self.backend),
            cookie: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &FakeConnector {
        &self.backend
    }

    /// Send a request, remembering any session cookie the app sets.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        let cookie = self
            .cookie
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        if let Some(set_cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            && let Some(pair) = set_cookie.split(';').next()
        {
            *self.cookie.lock().unwrap_or_else(PoisonError::into_inner) = Some(pair.to_string());
        }

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn post_empty(&self, uri: &str) -> TestResponse {
        self.send(Method::POST, uri, None).await
    }

    pub async fn patch(&self, uri: &str, body: Value) -> TestResponse {
        self.send(Method::PATCH, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> TestResponse {
        self.send(Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, body: Option<Value>) -> TestResponse {
        self.send(Method::DELETE, uri, body).await
    }

    /// Register an account and sign in as it.
    ///
    /// # Panics
    ///
    /// Panics if sign-in fails.
    pub async fn sign_in_as(&self, email: &str, password: &str, admin: bool) -> TestResponse {
        if admin {
            self.backend.register_admin(email, password);
        } else {
            self.backend.register(email, password);
        }
        let response = self
            .post(
                "/auth/sign-in",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "sign-in failed: {}", response.body);
        response
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
