//! HTTP route handlers for storefront.
//!
//! All bodies are JSON. Errors are `{"error": "..."}` with a status chosen
//! by [`AppError`](crate::error::AppError).
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                  - Health check
//!
//! # Products
//! GET    /products                - Product listing (?category, q, featured, new, bestseller)
//! GET    /products/{id}           - Product detail
//!
//! # Cart
//! GET    /cart                    - Lines, totals and panel flag
//! POST   /cart/items              - Add a product variant
//! PATCH  /cart/items              - Set a line's quantity (<= 0 removes)
//! DELETE /cart/items              - Remove a line
//! DELETE /cart                    - Empty the cart
//! PUT    /cart/panel              - Open or close the cart panel
//!
//! # Wishlist
//! GET    /wishlist                - Saved products
//! POST   /wishlist/{product_id}   - Save a product
//! DELETE /wishlist/{product_id}   - Forget a product
//! DELETE /wishlist                - Forget everything
//!
//! # Auth
//! GET    /auth/session            - Current user and admin flag (waits until settled)
//! POST   /auth/sign-in            - Sign in with email and password
//! POST   /auth/sign-up            - Create an account
//! POST   /auth/sign-out           - Sign out
//! POST   /auth/reset-password     - Send a password reset email
//!
//! # Account (requires auth)
//! GET    /account                 - User and profile
//! PUT    /account/password        - Change password
//! PATCH  /account/profile         - Update profile fields
//!
//! # Checkout
//! POST   /checkout                - Validate, summarise and empty the cart
//!
//! # Admin (requires admin role)
//! GET    /admin                   - Catalog and traffic overview
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod products;
pub mod wishlist;

use axum::{
    Router,
    extract::Request,
    routing::{get, patch, post, put},
};
use tower_http::trace::TraceLayer;

use crate::middleware::{create_session_layer, request_id_middleware};
use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route(
            "/items",
            post(cart::add).patch(cart::update).delete(cart::remove),
        )
        .route("/panel", put(cart::set_panel))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::show).delete(wishlist::clear))
        .route(
            "/{product_id}",
            post(wishlist::add).delete(wishlist::remove),
        )
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(auth::session))
        .route("/sign-in", post(auth::sign_in))
        .route("/sign-up", post(auth::sign_up))
        .route("/sign-out", post(auth::sign_out))
        .route("/reset-password", post(auth::reset_password))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(account::index))
        .route("/password", put(account::update_password))
        .route("/profile", patch(account::update_profile))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/wishlist", wishlist_routes())
        .nest("/auth", auth_routes())
        .nest("/account", account_routes())
        .route("/checkout", post(checkout::submit))
        .route("/admin", get(admin::overview))
}

/// Build the full application: routes, cookie sessions, request ids and
/// request tracing. Sentry layers are added by the binary.
pub fn app(state: AppState) -> Router {
    let session_layer = create_session_layer(state.config());

    routes()
        .layer(session_layer)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
