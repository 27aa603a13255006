//! Seams between the Auth Session Controller and the hosted backend.
//!
//! The [`backend`](crate::backend) module implements these against the real
//! service; tests use the in-memory fakes in `crate::testing`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use atelier_core::Email;

use crate::backend::BackendError;
use crate::models::{
    AuthChange, AuthUser, Profile, ProfileUpdate, Session, SignUpMetadata, SignUpOutcome,
};

/// Identity and session provider.
///
/// Implementations keep the current session and push an [`AuthChange`] to
/// subscribers whenever it changes (sign-in, sign-out, token refresh, user
/// update).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session, refreshed if it had expired.
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;

    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<Session, BackendError>;

    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<SignUpOutcome, BackendError>;

    /// Ends the session. The local session is dropped even if the call fails.
    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn send_password_reset(
        &self,
        email: &Email,
        redirect_to: Option<&str>,
    ) -> Result<(), BackendError>;

    async fn update_password(&self, new_password: &str) -> Result<AuthUser, BackendError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

/// Answers "does this user hold the admin role".
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// A missing role row is `Ok(false)`.
    async fn is_admin(&self, session: &Session) -> Result<bool, BackendError>;
}

/// Per-user profile rows.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, BackendError>;

    async fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError>;

    async fn create_profile(
        &self,
        session: &Session,
        profile: &Profile,
    ) -> Result<Profile, BackendError>;
}

/// Hands out backend collaborators for a new shopper session.
pub trait BackendConnector: Send + Sync {
    /// Identity client for one visitor, seeded with a restored session.
    fn identity_for(&self, restored: Option<Session>) -> Arc<dyn IdentityProvider>;

    fn roles(&self) -> Arc<dyn RoleDirectory>;

    fn profiles(&self) -> Arc<dyn ProfileStore>;
}
