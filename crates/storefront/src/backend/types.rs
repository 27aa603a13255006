//! Wire types for the backend's identity and data APIs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_core::UserId;

use crate::models::{AuthUser, Session, SignUpMetadata};

// ─────────────────────────────────────────────────────────────────────────────
// Identity API
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(super) struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct RefreshGrant<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct SignUpRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub data: &'a SignUpMetadata,
}

#[derive(Debug, Serialize)]
pub(super) struct RecoverRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct UpdateUserRequest<'a> {
    pub password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct UserMetadata {
    #[serde(default)]
    pub full_name: Option<String>,
}

/// User object as returned by the identity API.
#[derive(Debug, Deserialize)]
pub(super) struct WireUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<WireUser> for AuthUser {
    fn from(user: WireUser) -> Self {
        Self {
            id: UserId::new(user.id),
            email: user.email,
            full_name: user.user_metadata.full_name,
            created_at: user.created_at,
        }
    }
}

/// Response of the token endpoint and of a sign-up that signs in directly.
#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
    /// Unix seconds; absent on some deployments.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: WireUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    pub fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Sign-up returns a session when email confirmation is off and a bare
/// user when it is on.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum SignUpResponse {
    Session(TokenResponse),
    User(WireUser),
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Union of the identity API and data API error bodies.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ApiErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    /// Numeric on the identity API, a string like `PGRST116` on the data API.
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiErrorBody {
    pub fn into_parts(self) -> (Option<String>, String) {
        let code = self.error_code.or(self.error).or_else(|| match self.code {
            Some(serde_json::Value::String(code)) => Some(code),
            _ => None,
        });
        let message = self
            .msg
            .or(self.error_description)
            .or(self.message)
            .unwrap_or_default();
        (code, message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Data API
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct RoleRow {
    pub role: String,
}

impl RoleRow {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case(ADMIN_ROLE)
    }
}

pub(super) const ADMIN_ROLE: &str = "admin";
