//! Session-related types.
//!
//! A [`Session`] is what the identity provider hands back after a
//! successful sign-in: bearer tokens plus the user they belong to. The
//! Auth Session Controller is the only owner that mutates one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::UserId;

/// Sessions are refreshed this long before they actually expire.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// A signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    /// `full_name` from the sign-up metadata, if any.
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Bearer credentials and the resolved user.
///
/// Serializable so it can be kept in the visitor's cookie session and
/// restored on the next visit. Implements `Debug` manually to redact tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Session {
    /// Whether the access token is expired or about to be.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_LEEWAY_SECS) <= now
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Push notification from the identity provider.
#[derive(Debug, Clone)]
pub enum AuthChange {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    UserUpdated(Session),
}

impl AuthChange {
    /// The session after the change; `None` means signed out.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedIn(session) | Self::TokenRefreshed(session) | Self::UserUpdated(session) => {
                Some(session)
            }
            Self::SignedOut => None,
        }
    }

    /// Event name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "signed_in",
            Self::SignedOut => "signed_out",
            Self::TokenRefreshed(_) => "token_refreshed",
            Self::UserUpdated(_) => "user_updated",
        }
    }
}

/// Extra fields stored with a new account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignUpMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Result of a sign-up.
///
/// `session` is `None` when the provider requires email confirmation
/// before the first sign-in.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    pub session: Option<Session>,
}

impl SignUpOutcome {
    #[must_use]
    pub const fn needs_confirmation(&self) -> bool {
        self.session.is_none()
    }
}

/// Keys for data stored in the visitor's cookie session.
pub mod session_keys {
    /// Stable per-browser id that selects the shopper's in-memory state.
    pub const VISITOR_ID: &str = "visitor_id";

    /// Last known identity-provider session, restored on the next visit.
    pub const BACKEND_SESSION: &str = "backend_session";
}
