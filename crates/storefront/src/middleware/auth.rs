//! Shopper and route-guard extractors.
//!
//! [`Shopper`] resolves the visitor's [`ShopperSession`] from the cookie
//! session, starting one (and bootstrapping its auth controller) on first
//! sight. [`RequireAuth`] and [`RequireAdmin`] wait for the controller to
//! settle and reject with 401 / 403.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use uuid::Uuid;

use crate::error::{AppError, set_sentry_user};
use crate::models::{AuthUser, Session as AuthSession, session_keys};
use crate::services::ShopperSession;
use crate::services::auth::AuthController;
use crate::state::AppState;

/// Extractor for the current visitor's shopper session.
///
/// Assigns a visitor id on first contact. The resolved session is cached in
/// the request extensions so several extractors share one lookup.
///
/// # Example
///
/// ```rust,ignore
/// async fn cart_count(Shopper(shopper): Shopper) -> String {
///     shopper.cart(|cart| cart.total_item_count()).to_string()
/// }
/// ```
#[derive(Clone)]
pub struct Shopper(pub Arc<ShopperSession>);

impl FromRequestParts<AppState> for Shopper {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(shopper) = parts.extensions.get::<Self>() {
            return Ok(shopper.clone());
        }

        // Set by SessionManagerLayer
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let visitor = if let Some(id) = session.get::<Uuid>(session_keys::VISITOR_ID).await? {
            id
        } else {
            let id = Uuid::new_v4();
            session.insert(session_keys::VISITOR_ID, id).await?;
            id
        };
        let restored = session
            .get::<AuthSession>(session_keys::BACKEND_SESSION)
            .await?;

        let shopper = Self(state.shoppers().get_or_start(visitor, restored).await);
        parts.extensions.insert(shopper.clone());
        Ok(shopper)
    }
}

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn account(RequireAuth(user): RequireAuth) -> String {
///     format!("Hello, {}!", user.id)
/// }
/// ```
pub struct RequireAuth(pub AuthUser);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Shopper(shopper) = Shopper::from_request_parts(parts, state).await?;
        let snapshot = shopper.auth().ready().await;

        let user = snapshot
            .user
            .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))?;
        set_sentry_user(&user.id, user.email.as_deref());
        Ok(Self(user))
    }
}

/// Extractor that requires a signed-in admin.
///
/// The role flag comes from the controller's time-bounded lookup, so an
/// unreachable role table means 403, never a hung request.
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Shopper(shopper) = Shopper::from_request_parts(parts, state).await?;
        let snapshot = shopper.auth().ready().await;

        let user = snapshot
            .user
            .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))?;
        if !snapshot.is_admin {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        set_sentry_user(&user.id, user.email.as_deref());
        Ok(Self(user))
    }
}

/// Mirror the controller's backend session into the cookie session so it
/// can be restored after the shopper session is evicted.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn persist_auth_session(
    session: &Session,
    auth: &AuthController,
) -> Result<(), tower_sessions::session::Error> {
    match auth.session() {
        Some(current) => {
            session
                .insert(session_keys::BACKEND_SESSION, current)
                .await
        }
        None => {
            session
                .remove::<AuthSession>(session_keys::BACKEND_SESSION)
                .await?;
            Ok(())
        }
    }
}
