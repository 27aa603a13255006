//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions cookie session, in-memory store)
//!
//! Route guards are extractors rather than layers, see [`auth`].

pub mod auth;
pub mod request_id;
pub mod session;

pub use auth::{RequireAdmin, RequireAuth, Shopper, persist_auth_session};
pub use request_id::{RequestId, request_id_middleware};
pub use session::create_session_layer;
