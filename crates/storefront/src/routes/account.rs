//! Account route handlers.
//!
//! These routes require authentication.

use axum::Json;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{RequireAuth, Shopper, persist_auth_session};
use crate::models::{AuthUser, Profile, ProfileUpdate};

/// Account overview.
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub user: AuthUser,
    pub profile: Option<Profile>,
}

/// Password change form data.
#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    pub password: String,
}

/// Account overview: the signed-in user and their profile row.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn index(
    RequireAuth(user): RequireAuth,
    Shopper(shopper): Shopper,
) -> Result<Json<AccountView>> {
    let profile = shopper.auth().profile().await?;
    Ok(Json(AccountView { user, profile }))
}

/// Change the signed-in user's password.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_password(
    RequireAuth(user): RequireAuth,
    Shopper(shopper): Shopper,
    session: Session,
    Json(form): Json<PasswordForm>,
) -> Result<Json<AuthUser>> {
    let updated = shopper.auth().update_password(&form.password).await?;
    persist_auth_session(&session, shopper.auth()).await?;
    add_breadcrumb("account", "Password changed", None);
    Ok(Json(updated))
}

/// Update profile fields. Omitted fields are left as they are.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_profile(
    RequireAuth(user): RequireAuth,
    Shopper(shopper): Shopper,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>> {
    if update.is_empty() {
        return Err(AppError::BadRequest("No profile fields to update".to_string()));
    }
    let profile = shopper.auth().update_profile(&update).await?;
    Ok(Json(profile))
}
