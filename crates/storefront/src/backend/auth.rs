//! Identity API client.
//!
//! One [`AuthClient`] exists per visitor. It keeps that visitor's session,
//! refreshes it when it expires and broadcasts every change to subscribers,
//! which is how the Auth Session Controller learns about sign-ins, sign-outs
//! and token refreshes.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use atelier_core::Email;

use super::types::{
    PasswordGrant, RecoverRequest, RefreshGrant, SignUpRequest, SignUpResponse, TokenResponse,
    UpdateUserRequest, WireUser,
};
use super::{BackendClient, BackendError};
use crate::models::{AuthChange, AuthUser, Session, SignUpMetadata, SignUpOutcome};
use crate::services::auth::IdentityProvider;

/// Buffered notifications per visitor before a slow listener lags.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Per-visitor client for the identity API.
pub struct AuthClient {
    backend: BackendClient,
    session: Mutex<Option<Session>>,
    changes: broadcast::Sender<AuthChange>,
}

impl AuthClient {
    /// Create a client, optionally restoring a previously persisted session.
    #[must_use]
    pub fn new(backend: BackendClient, restored: Option<Session>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            backend,
            session: Mutex::new(restored),
            changes,
        }
    }

    fn stored(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, session: Option<Session>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn notify(&self, change: AuthChange) {
        debug!(kind = change.kind(), "Auth change");
        // No receivers is fine; nobody is listening yet
        let _ = self.changes.send(change);
    }

    async fn token(&self, grant_type: &str, body: &impl serde::Serialize) -> Result<Session, BackendError> {
        let url = self
            .backend
            .endpoint("auth/v1/token", &[("grant_type", grant_type)])?;
        let request = self.backend.request(Method::POST, url, None).json(body);
        let token: TokenResponse = self.backend.send(request).await?;
        Ok(token.into_session(Utc::now()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        self.token("refresh_token", &RefreshGrant { refresh_token })
            .await
    }

    /// The stored session, refreshed first if its access token expired.
    ///
    /// A successful refresh is broadcast as `TokenRefreshed`. A failed one
    /// drops the session and broadcasts `SignedOut`.
    async fn valid_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(session) = self.stored() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        debug!(user_id = %session.user.id, "Stored session expired, refreshing");
        match self.refresh(&session.refresh_token).await {
            Ok(refreshed) => {
                self.store(Some(refreshed.clone()));
                self.notify(AuthChange::TokenRefreshed(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(e) => {
                self.store(None);
                self.notify(AuthChange::SignedOut);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for AuthClient {
    #[instrument(skip(self))]
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        self.valid_session().await
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<Session, BackendError> {
        let session = self
            .token(
                "password",
                &PasswordGrant {
                    email: email.as_str(),
                    password,
                },
            )
            .await?;

        self.store(Some(session.clone()));
        self.notify(AuthChange::SignedIn(session.clone()));
        Ok(session)
    }

    #[instrument(skip(self, password, metadata), fields(email = %email))]
    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<SignUpOutcome, BackendError> {
        let url = self.backend.endpoint("auth/v1/signup", &[])?;
        let request = self
            .backend
            .request(Method::POST, url, None)
            .json(&SignUpRequest {
                email: email.as_str(),
                password,
                data: metadata,
            });

        let response: SignUpResponse = self.backend.send(request).await?;
        match response {
            SignUpResponse::Session(token) => {
                let session = token.into_session(Utc::now());
                self.store(Some(session.clone()));
                self.notify(AuthChange::SignedIn(session.clone()));
                Ok(SignUpOutcome {
                    user: session.user.clone(),
                    session: Some(session),
                })
            }
            SignUpResponse::User(user) => Ok(SignUpOutcome {
                user: user.into(),
                session: None,
            }),
        }
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BackendError> {
        let Some(session) = self.stored() else {
            self.notify(AuthChange::SignedOut);
            return Ok(());
        };

        let result = match self.backend.endpoint("auth/v1/logout", &[]) {
            Ok(url) => {
                let request =
                    self.backend
                        .request(Method::POST, url, Some(&session.access_token));
                self.backend.send_empty(request).await
            }
            Err(e) => Err(e),
        };

        // The local session is gone whatever the backend said
        self.store(None);
        self.notify(AuthChange::SignedOut);
        result
    }

    #[instrument(skip(self), fields(email = %email))]
    async fn send_password_reset(
        &self,
        email: &Email,
        redirect_to: Option<&str>,
    ) -> Result<(), BackendError> {
        let query: Vec<(&str, &str)> = redirect_to
            .map(|to| vec![("redirect_to", to)])
            .unwrap_or_default();
        let url = self.backend.endpoint("auth/v1/recover", &query)?;
        let request = self
            .backend
            .request(Method::POST, url, None)
            .json(&RecoverRequest {
                email: email.as_str(),
            });
        self.backend.send_empty(request).await
    }

    #[instrument(skip(self, new_password))]
    async fn update_password(&self, new_password: &str) -> Result<AuthUser, BackendError> {
        let session = self.valid_session().await?.ok_or(BackendError::NotSignedIn)?;

        let url = self.backend.endpoint("auth/v1/user", &[])?;
        let request = self
            .backend
            .request(Method::PUT, url, Some(&session.access_token))
            .json(&UpdateUserRequest {
                password: new_password,
            });
        let user: AuthUser = self.backend.send::<WireUser>(request).await?.into();

        let updated = Session {
            user: user.clone(),
            ..session
        };
        self.store(Some(updated.clone()));
        self.notify(AuthChange::UserUpdated(updated));
        Ok(user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}
