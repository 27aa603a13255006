//! Authentication route handlers.
//!
//! Each handler drives the visitor's [`AuthController`] and then mirrors
//! the resulting backend session into the cookie session.
//!
//! [`AuthController`]: crate::services::auth::AuthController

use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::{Shopper, persist_auth_session};
use crate::models::{AuthUser, SignUpMetadata};
use crate::services::auth::AuthSnapshot;

// =============================================================================
// Form Types
// =============================================================================

/// Sign-in form data.
#[derive(Debug, Deserialize)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

/// Sign-up form data.
#[derive(Debug, Deserialize)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Password reset request form data.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub email: String,
}

// =============================================================================
// Views
// =============================================================================

/// Auth state as exposed to the client. Tokens stay server-side.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub user: Option<AuthUser>,
    pub is_admin: bool,
    pub loading: bool,
}

impl From<AuthSnapshot> for SessionView {
    fn from(snapshot: AuthSnapshot) -> Self {
        Self {
            user: snapshot.user,
            is_admin: snapshot.is_admin,
            loading: snapshot.loading,
        }
    }
}

/// Sign-up response.
#[derive(Debug, Serialize)]
pub struct SignUpView {
    pub user: AuthUser,
    /// `true` when the account must be confirmed by email before signing in.
    pub needs_confirmation: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Current auth state. Waits until the controller has settled.
pub async fn session(Shopper(shopper): Shopper, session: Session) -> Result<Json<SessionView>> {
    let snapshot = shopper.auth().ready().await;
    persist_auth_session(&session, shopper.auth()).await?;
    Ok(Json(snapshot.into()))
}

/// Sign in with email and password.
#[instrument(skip(shopper, session, form), fields(visitor = %shopper.visitor_id()))]
pub async fn sign_in(
    Shopper(shopper): Shopper,
    session: Session,
    Json(form): Json<SignInForm>,
) -> Result<Json<SessionView>> {
    let snapshot = shopper.auth().sign_in(&form.email, &form.password).await?;

    session.cycle_id().await?;
    persist_auth_session(&session, shopper.auth()).await?;

    if let Some(user) = &snapshot.user {
        set_sentry_user(&user.id, user.email.as_deref());
    }
    add_breadcrumb("auth", "Signed in", None);
    Ok(Json(snapshot.into()))
}

/// Create an account.
#[instrument(skip(shopper, session, form), fields(visitor = %shopper.visitor_id()))]
pub async fn sign_up(
    Shopper(shopper): Shopper,
    session: Session,
    Json(form): Json<SignUpForm>,
) -> Result<(StatusCode, Json<SignUpView>)> {
    let metadata = SignUpMetadata {
        full_name: form
            .full_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
    };
    let outcome = shopper
        .auth()
        .sign_up(&form.email, &form.password, metadata)
        .await?;

    if !outcome.needs_confirmation() {
        session.cycle_id().await?;
        persist_auth_session(&session, shopper.auth()).await?;
        set_sentry_user(&outcome.user.id, outcome.user.email.as_deref());
    }
    add_breadcrumb("auth", "Signed up", None);

    Ok((
        StatusCode::CREATED,
        Json(SignUpView {
            needs_confirmation: outcome.needs_confirmation(),
            user: outcome.user,
        }),
    ))
}

/// Sign out. The cart and wishlist survive.
#[instrument(skip(shopper, session), fields(visitor = %shopper.visitor_id()))]
pub async fn sign_out(Shopper(shopper): Shopper, session: Session) -> Result<StatusCode> {
    let result = shopper.auth().sign_out().await;

    // Local state is already cleared even if the backend call failed
    persist_auth_session(&session, shopper.auth()).await?;
    clear_sentry_user();
    add_breadcrumb("auth", "Signed out", None);

    result?;
    Ok(StatusCode::NO_CONTENT)
}

/// Send a password reset email.
#[instrument(skip(shopper, form), fields(visitor = %shopper.visitor_id()))]
pub async fn reset_password(
    Shopper(shopper): Shopper,
    Json(form): Json<ResetPasswordForm>,
) -> Result<StatusCode> {
    shopper.auth().reset_password(&form.email).await?;
    Ok(StatusCode::ACCEPTED)
}
