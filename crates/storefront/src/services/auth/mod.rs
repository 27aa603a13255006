//! Auth Session Controller.
//!
//! The single authority on "who is signed in and are they an admin" for one
//! shopper. It reconciles two sources of truth:
//!
//! 1. a one-time **bootstrap** that asks the identity provider for the
//!    current (restored) session and resolves the admin role for it, and
//! 2. a **live listener** that receives every session change the provider
//!    pushes afterwards.
//!
//! Notifications that arrive before bootstrap has completed are dropped:
//! bootstrap owns all state transitions until it finishes. The listener's
//! receiver is subscribed when the controller is built, and bootstrap
//! discards whatever it queued just before marking itself complete, so a
//! change sent during bootstrap is never applied later. The admin role
//! lookup is bounded by a timeout and any failure resolves to "not admin",
//! so `loading` always settles to `false`.
//!
//! State is published through a [`tokio::sync::watch`] channel so route
//! guards can wait for it to settle.

mod error;
mod provider;

pub use error::AuthError;
pub use provider::{BackendConnector, IdentityProvider, ProfileStore, RoleDirectory};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use atelier_core::{Email, UserId};

use crate::backend::BackendError;
use crate::models::{
    AuthChange, AuthUser, Profile, ProfileUpdate, Session, SignUpMetadata, SignUpOutcome,
};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Tunables for an [`AuthController`].
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Upper bound on the admin role lookup.
    pub role_timeout: Duration,
    /// How long sign-in waits for its notification to be applied.
    pub settle_timeout: Duration,
    /// Where password-reset emails link back to.
    pub reset_redirect: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            role_timeout: Duration::from_secs(5),
            settle_timeout: Duration::from_secs(2),
            reset_redirect: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct AuthState {
    session: Option<Session>,
    is_admin: bool,
    bootstrap_loading: bool,
    role_loading: bool,
    bootstrap_completed: bool,
    /// Bumped whenever the session changes; role results from an older
    /// generation are discarded.
    role_generation: u64,
}

impl AuthState {
    fn starting() -> Self {
        Self {
            bootstrap_loading: true,
            role_loading: true,
            ..Self::default()
        }
    }

    const fn loading(&self) -> bool {
        self.bootstrap_loading || self.role_loading
    }

    fn user(&self) -> Option<&AuthUser> {
        self.session.as_ref().map(|s| &s.user)
    }

    fn clear_identity(&mut self) {
        self.session = None;
        self.is_admin = false;
        self.role_loading = false;
        self.role_generation += 1;
    }

    fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            user: self.user().cloned(),
            session: self.session.clone(),
            is_admin: self.is_admin,
            loading: self.loading(),
        }
    }
}

/// Read-only view of the controller state.
#[derive(Debug, Clone, Default)]
pub struct AuthSnapshot {
    pub user: Option<AuthUser>,
    pub session: Option<Session>,
    pub is_admin: bool,
    pub loading: bool,
}

/// Auth Session Controller for one shopper.
pub struct AuthController {
    provider: Arc<dyn IdentityProvider>,
    roles: Arc<dyn RoleDirectory>,
    profiles: Arc<dyn ProfileStore>,
    settings: AuthSettings,
    state: watch::Sender<AuthState>,
    bootstrap_started: AtomicBool,
    /// Provider notifications, taken by the listener once bootstrap is done.
    changes: Mutex<Option<broadcast::Receiver<AuthChange>>>,
}

impl AuthController {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        roles: Arc<dyn RoleDirectory>,
        profiles: Arc<dyn ProfileStore>,
        settings: AuthSettings,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::starting());
        let changes = provider.subscribe();
        Self {
            provider,
            roles,
            profiles,
            settings,
            state,
            bootstrap_started: AtomicBool::new(false),
            changes: Mutex::new(Some(changes)),
        }
    }

    /// Spawn the live listener, then run bootstrap in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        self.listen();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.bootstrap().await;
        });
    }

    /// Spawn the live listener.
    ///
    /// The task waits for bootstrap to complete before it receives anything.
    /// It holds only a weak reference and ends when the controller is
    /// dropped or the provider's channel closes. Only the first call gets
    /// the receiver; later listeners end immediately.
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::downgrade(self);
        let mut state = self.state.subscribe();

        tokio::spawn(async move {
            let bootstrapped = state.wait_for(|s| s.bootstrap_completed).await.is_ok();
            if !bootstrapped {
                return;
            }
            let Some(mut changes) = controller.upgrade().and_then(|c| c.take_changes()) else {
                return;
            };

            loop {
                match changes.recv().await {
                    Ok(change) => {
                        let Some(controller) = controller.upgrade() else {
                            break;
                        };
                        controller.apply_change(change).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth listener lagged behind provider notifications");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn take_changes(&self) -> Option<broadcast::Receiver<AuthChange>> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Restore the current session and resolve its role.
    ///
    /// Runs once per controller; later calls return immediately.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) {
        if self.bootstrap_started.swap(true, Ordering::SeqCst) {
            return;
        }

        match self.provider.current_session().await {
            Ok(Some(session)) => {
                debug!(user_id = %session.user.id, "Restored session");
                let generation = self.begin_session(session.clone());
                self.load_role(&session, generation).await;
                self.complete_bootstrap(|_| {});
            }
            Ok(None) => self.finish_signed_out(),
            Err(e) => {
                warn!(error = %e, "Session restore failed, continuing signed out");
                self.finish_signed_out();
            }
        }
    }

    fn finish_signed_out(&self) {
        self.complete_bootstrap(AuthState::clear_identity);
    }

    /// Drop every notification queued so far, then open the gate.
    ///
    /// The receiver stays locked until the gate is open, so nothing queued
    /// during bootstrap survives it.
    fn complete_bootstrap(&self, finish: impl FnOnce(&mut AuthState)) {
        let mut changes = self.changes.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = changes.as_mut().map_or(0, discard_pending);
        if dropped > 0 {
            debug!(dropped, "Ignoring auth changes received during bootstrap");
        }
        self.state.send_modify(|s| {
            finish(s);
            s.bootstrap_completed = true;
            s.bootstrap_loading = false;
        });
    }

    /// Install a session and start a new role generation.
    fn begin_session(&self, session: Session) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|s| {
            if s.user().map(|u| u.id) != Some(session.user.id) {
                s.is_admin = false;
            }
            s.session = Some(session);
            s.role_loading = true;
            s.role_generation += 1;
            generation = s.role_generation;
        });
        generation
    }

    /// Resolve the admin role for `session`.
    ///
    /// Timeout and errors resolve to `false`. The result is dropped if the
    /// session changed while the lookup was in flight.
    async fn load_role(&self, session: &Session, generation: u64) {
        let user_id = session.user.id;
        let lookup = tokio::time::timeout(self.settings.role_timeout, self.roles.is_admin(session));

        let is_admin = match lookup.await {
            Ok(Ok(is_admin)) => is_admin,
            Ok(Err(e)) => {
                warn!(%user_id, error = %e, "Role lookup failed, treating as not admin");
                false
            }
            Err(_) => {
                warn!(
                    %user_id,
                    timeout = ?self.settings.role_timeout,
                    "Role lookup timed out, treating as not admin"
                );
                false
            }
        };

        self.state.send_modify(|s| {
            if s.role_generation == generation {
                s.is_admin = is_admin;
                s.role_loading = false;
            } else {
                debug!(%user_id, "Discarding stale role lookup");
            }
        });
    }

    /// Apply one provider notification.
    ///
    /// Ignored entirely until bootstrap has completed.
    pub async fn apply_change(&self, change: AuthChange) {
        let bootstrapped = self.state.borrow().bootstrap_completed;
        if !bootstrapped {
            debug!(kind = change.kind(), "Ignoring auth change during bootstrap");
            return;
        }

        debug!(kind = change.kind(), "Applying auth change");
        match change.session() {
            Some(session) => {
                let generation = self.begin_session(session.clone());
                self.load_role(session, generation).await;
            }
            None => self.state.send_modify(AuthState::clear_identity),
        }
    }

    /// Wait for bootstrap to complete, running it here if nobody started it.
    async fn bootstrapped(&self) {
        self.bootstrap().await;
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| s.bootstrap_completed).await;
    }

    /// Wait (bounded) until `user_id` is the current user and loading is done.
    async fn settle(&self, user_id: UserId) -> AuthSnapshot {
        let mut state = self.state.subscribe();
        let wait = state.wait_for(|s| s.user().map(|u| u.id) == Some(user_id) && !s.loading());
        let settled = matches!(
            tokio::time::timeout(self.settings.settle_timeout, wait).await,
            Ok(Ok(_))
        );
        if !settled {
            debug!(%user_id, "Auth state not settled yet");
        }
        self.snapshot()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().snapshot()
    }

    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.state.borrow().user().cloned()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin
    }

    /// `true` while bootstrap or a role lookup is running.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading()
    }

    /// Resolves once loading is `false`.
    ///
    /// Never waits forever: bootstrap is started here if needed and the
    /// role lookup is time-bounded.
    pub async fn ready(&self) -> AuthSnapshot {
        self.bootstrap().await;
        let mut state = self.state.subscribe();
        match state.wait_for(|s| !s.loading()).await {
            Ok(state) => state.snapshot(),
            Err(_) => self.snapshot(),
        }
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// Session state is updated by the listener when the provider's
    /// notification arrives; this waits a bounded time for that to happen.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for a malformed email and
    /// `AuthError::InvalidCredentials` when the provider rejects the
    /// password.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSnapshot, AuthError> {
        let email = Email::parse(email)?;
        self.bootstrapped().await;

        let session = self
            .provider
            .sign_in_with_password(&email, password)
            .await
            .map_err(|e| failed("sign_in", e))?;

        info!(user_id = %session.user.id, "Signed in");
        Ok(self.settle(session.user.id).await)
    }

    /// Create an account.
    ///
    /// When the provider signs the user in directly, a profile row is
    /// created for them. Failing to create it is logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` if the password is shorter than
    /// [`MIN_PASSWORD_LENGTH`] and `AuthError::UserAlreadyExists` if the
    /// email is taken.
    #[instrument(skip(self, password, metadata))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<SignUpOutcome, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        self.bootstrapped().await;

        let outcome = self
            .provider
            .sign_up(&email, password, &metadata)
            .await
            .map_err(|e| failed("sign_up", e))?;

        if let Some(session) = &outcome.session {
            let profile = Profile {
                id: session.user.id,
                full_name: metadata.full_name.clone(),
                phone: None,
                avatar_url: None,
                updated_at: None,
            };
            if let Err(e) = self.profiles.create_profile(session, &profile).await {
                warn!(user_id = %session.user.id, error = %e, "Failed to create profile");
            }
            self.settle(session.user.id).await;
        } else {
            info!(user_id = %outcome.user.id, "Sign-up awaiting email confirmation");
        }

        Ok(outcome)
    }

    /// Sign out.
    ///
    /// Local state is cleared whatever the provider answers; its error, if
    /// any, is still returned.
    ///
    /// # Errors
    ///
    /// Returns the provider's error.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.bootstrapped().await;
        self.state.send_modify(|s| s.bootstrap_loading = true);

        let result = self.provider.sign_out().await;

        self.state.send_modify(|s| {
            s.clear_identity();
            s.bootstrap_loading = false;
        });
        result.map_err(|e| failed("sign_out", e))
    }

    /// Send a password-reset email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or the provider's error.
    #[instrument(skip(self))]
    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        self.provider
            .send_password_reset(&email, self.settings.reset_redirect.as_deref())
            .await
            .map_err(|e| failed("reset_password", e))
    }

    /// Change the signed-in user's password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotSignedIn` without a session and
    /// `AuthError::WeakPassword` for a short password.
    #[instrument(skip(self, new_password))]
    pub async fn update_password(&self, new_password: &str) -> Result<AuthUser, AuthError> {
        validate_password(new_password)?;
        if self.state.borrow().session.is_none() {
            return Err(AuthError::NotSignedIn);
        }
        self.provider
            .update_password(new_password)
            .await
            .map_err(|e| failed("update_password", e))
    }

    /// Update the signed-in user's profile row.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotSignedIn` without a session.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, AuthError> {
        let session = self.active_session().await?;
        self.profiles
            .update_profile(&session, update)
            .await
            .map_err(|e| failed("update_profile", e))
    }

    /// Fetch the signed-in user's profile row, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotSignedIn` without a session.
    pub async fn profile(&self) -> Result<Option<Profile>, AuthError> {
        let session = self.active_session().await?;
        self.profiles
            .fetch_profile(&session)
            .await
            .map_err(|e| failed("fetch_profile", e))
    }

    /// The signed-in session as the provider holds it, refreshed first if
    /// the access token expired. A refresh reaches local state through the
    /// listener as `TokenRefreshed`.
    async fn active_session(&self) -> Result<Session, AuthError> {
        if self.state.borrow().session.is_none() {
            return Err(AuthError::NotSignedIn);
        }
        self.provider
            .current_session()
            .await
            .map_err(|e| failed("refresh_session", e))?
            .ok_or(AuthError::NotSignedIn)
    }
}

/// Empty `changes` without blocking, returning how many were discarded.
fn discard_pending(changes: &mut broadcast::Receiver<AuthChange>) -> u64 {
    let mut dropped = 0;
    loop {
        match changes.try_recv() {
            Ok(_) => dropped += 1,
            Err(TryRecvError::Lagged(skipped)) => dropped += skipped,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return dropped,
        }
    }
}

fn failed(action: &'static str, err: BackendError) -> AuthError {
    warn!(action, error = %err, "Auth action failed");
    AuthError::from(err)
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::testing::{FakeIdentity, FakeProfiles, FakeRoles, fake_session};

    async fn eventually(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !done() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    /// Push a rename of `session`'s user through the provider and wait for
    /// the listener to apply it.
    async fn rename_via_listener(
        auth: &AuthController,
        identity: &FakeIdentity,
        roles: &FakeRoles,
        session: &Session,
    ) {
        let mut renamed = session.clone();
        renamed.user.full_name = Some("Renamed".to_string());
        roles.release();
        identity.emit(AuthChange::UserUpdated(renamed));

        eventually(|| {
            let snapshot = auth.snapshot();
            !snapshot.loading
                && snapshot.user.and_then(|u| u.full_name).as_deref() == Some("Renamed")
        })
        .await;
    }

    fn controller(
        identity: &Arc<FakeIdentity>,
        roles: &Arc<FakeRoles>,
        profiles: &Arc<FakeProfiles>,
    ) -> Arc<AuthController> {
        Arc::new(AuthController::new(
            Arc::clone(identity) as Arc<dyn IdentityProvider>,
            Arc::clone(roles) as Arc<dyn RoleDirectory>,
            Arc::clone(profiles) as Arc<dyn ProfileStore>,
            AuthSettings::default(),
        ))
    }

    #[tokio::test]
    async fn test_starts_loading() {
        let auth = controller(
            &Arc::new(FakeIdentity::new()),
            &Arc::new(FakeRoles::new()),
            &Arc::new(FakeProfiles::new()),
        );
        let snapshot = auth.snapshot();
        assert!(snapshot.loading);
        assert!(snapshot.user.is_none());
        assert!(!snapshot.is_admin);
    }

    #[tokio::test]
    async fn test_bootstrap_without_session_settles_signed_out() {
        let roles = Arc::new(FakeRoles::new());
        let auth = controller(
            &Arc::new(FakeIdentity::new()),
            &roles,
            &Arc::new(FakeProfiles::new()),
        );
        auth.start();

        let snapshot = auth.ready().await;
        assert!(!snapshot.loading);
        assert!(snapshot.user.is_none());
        assert!(!snapshot.is_admin);
        assert_eq!(roles.calls(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_error_settles_signed_out() {
        let auth = controller(
            &Arc::new(FakeIdentity::new().with_restore_error()),
            &Arc::new(FakeRoles::new()),
            &Arc::new(FakeProfiles::new()),
        );
        auth.start();

        let snapshot = auth.ready().await;
        assert!(!snapshot.loading);
        assert!(snapshot.session.is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_resolves_admin_role() {
        let session = fake_session("admin@example.com");
        let roles = Arc::new(FakeRoles::new());
        roles.grant_admin(session.user.id);
        let auth = controller(
            &Arc::new(FakeIdentity::new().with_session(session.clone())),
            &roles,
            &Arc::new(FakeProfiles::new()),
        );
        auth.start();

        let snapshot = auth.ready().await;
        assert_eq!(snapshot.user.map(|u| u.id), Some(session.user.id));
        assert!(snapshot.is_admin);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_bootstrap_runs_once() {
        let session = fake_session("shopper@example.com");
        let roles = Arc::new(FakeRoles::new());
        let auth = controller(
            &Arc::new(FakeIdentity::new().with_session(session)),
            &roles,
            &Arc::new(FakeProfiles::new()),
        );

        auth.bootstrap().await;
        auth.bootstrap().await;
        auth.ready().await;

        assert_eq!(roles.calls(), 1);
    }

    #[tokio::test]
    async fn test_change_during_bootstrap_is_ignored() {
        let session = fake_session("admin@example.com");
        let roles = Arc::new(FakeRoles::gated());
        roles.grant_admin(session.user.id);
        let auth = controller(
            &Arc::new(FakeIdentity::new().with_session(session.clone())),
            &roles,
            &Arc::new(FakeProfiles::new()),
        );

        let bootstrap = tokio::spawn({
            let auth = Arc::clone(&auth);
            async move { auth.bootstrap().await }
        });
        roles.started().await;

        // Both would change state if applied
        auth.apply_change(AuthChange::SignedOut).await;
        auth.apply_change(AuthChange::SignedIn(session.clone())).await;
        assert_eq!(roles.calls(), 1);

        roles.release();
        bootstrap.await.unwrap();

        let snapshot = auth.ready().await;
        assert_eq!(snapshot.user.map(|u| u.id), Some(session.user.id));
        assert!(snapshot.is_admin);
        assert_eq!(roles.calls(), 1);
    }

    #[tokio::test]
    async fn test_changes_emitted_during_role_lookup_are_ignored() {
        let session = fake_session("admin@example.com");
        let identity = Arc::new(FakeIdentity::new().with_session(session.clone()));
        let roles = Arc::new(FakeRoles::gated());
        roles.grant_admin(session.user.id);
        let auth = controller(&identity, &roles, &Arc::new(FakeProfiles::new()));
        auth.start();
        roles.started().await;

        identity.emit(AuthChange::SignedOut);
        identity.emit(AuthChange::SignedIn(fake_session("other@example.com")));
        roles.release();

        let snapshot = auth.ready().await;
        assert_eq!(snapshot.user.map(|u| u.id), Some(session.user.id));
        assert!(snapshot.is_admin);

        // Changes after bootstrap still flow; the queued ones never ran
        rename_via_listener(&auth, &identity, &roles, &session).await;
        let snapshot = auth.snapshot();
        assert_eq!(snapshot.user.map(|u| u.id), Some(session.user.id));
        assert!(snapshot.is_admin);
        assert_eq!(roles.calls(), 2);
    }

    #[tokio::test]
    async fn test_change_emitted_after_role_lookup_but_before_completion_is_ignored() {
        let session = fake_session("admin@example.com");
        let identity = Arc::new(FakeIdentity::new().with_session(session.clone()));
        let roles = Arc::new(FakeRoles::gated());
        roles.grant_admin(session.user.id);
        let auth = controller(&identity, &roles, &Arc::new(FakeProfiles::new()));
        auth.start();
        roles.started().await;

        roles.release();
        identity.emit(AuthChange::SignedOut);
        assert!(auth.is_loading());

        let snapshot = auth.ready().await;
        assert!(snapshot.user.is_some());
        assert!(snapshot.is_admin);

        rename_via_listener(&auth, &identity, &roles, &session).await;
        let snapshot = auth.snapshot();
        assert_eq!(snapshot.user.map(|u| u.id), Some(session.user.id));
        assert!(snapshot.is_admin);
        assert_eq!(roles.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_role_lookup_timeout_resolves_not_admin() {
        let session = fake_session("admin@example.com");
        let roles = Arc::new(FakeRoles::with_delay(Duration::from_secs(30)));
        roles.grant_admin(session.user.id);
        let auth = controller(
            &Arc::new(FakeIdentity::new().with_session(session)),
            &roles,
            &Arc::new(FakeProfiles::new()),
        );
        auth.start();

        let snapshot = auth.ready().await;
        assert!(!snapshot.is_admin);
        assert!(!snapshot.loading);
        assert!(snapshot.user.is_some());
    }

    #[tokio::test]
    async fn test_role_lookup_error_resolves_not_admin() {
        let session = fake_session("admin@example.com");
        let roles = Arc::new(FakeRoles::failing());
        roles.grant_admin(session.user.id);
        let auth = controller(
            &Arc::new(FakeIdentity::new().with_session(session)),
            &roles,
            &Arc::new(FakeProfiles::new()),
        );
        auth.start();

        let snapshot = auth.ready().await;
        assert!(!snapshot.is_admin);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_stale_role_lookup_is_discarded() {
        let session = fake_session("admin@example.com");
        let roles = Arc::new(FakeRoles::gated());
        roles.grant_admin(session.user.id);
        let auth = controller(
            &Arc::new(FakeIdentity::new()),
            &roles,
            &Arc::new(FakeProfiles::new()),
        );
        auth.ready().await;

        let signed_in = tokio::spawn({
            let auth = Arc::clone(&auth);
            let change = AuthChange::SignedIn(session);
            async move { auth.apply_change(change).await }
        });
        roles.started().await;
        auth.apply_change(AuthChange::SignedOut).await;
        roles.release();
        signed_in.await.unwrap();

        let snapshot = auth.snapshot();
        assert!(snapshot.user.is_none());
        assert!(!snapshot.is_admin);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_sign_in_applies_notification() {
        let identity = Arc::new(FakeIdentity::new());
        let user_id = identity.register("shopper@example.com", "correct horse");
        let roles = Arc::new(FakeRoles::new());
        let auth = controller(&identity, &roles, &Arc::new(FakeProfiles::new()));
        auth.start();

        let snapshot = auth
            .sign_in("shopper@Example.COM", "correct horse")
            .await
            .unwrap();

        assert_eq!(snapshot.user.map(|u| u.id), Some(user_id));
        assert!(!snapshot.is_admin);
        assert!(!snapshot.loading);
        assert_eq!(roles.calls(), 1);
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password() {
        let identity = Arc::new(FakeIdentity::new());
        identity.register("shopper@example.com", "correct horse");
        let auth = controller(
            &identity,
            &Arc::new(FakeRoles::new()),
            &Arc::new(FakeProfiles::new()),
        );
        auth.start();

        let err = auth
            .sign_in("shopper@example.com", "wrong horse")
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(auth.ready().await.user.is_none());
    }

    #[tokio::test]
    async fn test_sign_in_rejects_invalid_email_locally() {
        let identity = Arc::new(FakeIdentity::new());
        let auth = controller(
            &identity,
            &Arc::new(FakeRoles::new()),
            &Arc::new(FakeProfiles::new()),
        );

        let err = auth.sign_in("not-an-email", "whatever1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail(_)));
        assert_eq!(identity.sign_in_attempts(), 0);
    }

    #[tokio::test]
    async fn test_sign_out_clears_state() {
        let session = fake_session("admin@example.com");
        let roles = Arc::new(FakeRoles::new());
        roles.grant_admin(session.user.id);
        let auth = controller(
            &Arc::new(FakeIdentity::new().with_session(session)),
            &roles,
            &Arc::new(FakeProfiles::new()),
        );
        auth.start();
        assert!(auth.ready().await.is_admin);

        auth.sign_out().await.unwrap();

        let snapshot = auth.ready().await;
        assert!(snapshot.user.is_none());
        assert!(snapshot.session.is_none());
        assert!(!snapshot.is_admin);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_sign_out_clears_state_when_provider_fails() {
        let session = fake_session("shopper@example.com");
        let auth = controller(
            &Arc::new(
                FakeIdentity::new()
                    .with_session(session)
                    .with_sign_out_error(),
            ),
            &Arc::new(FakeRoles::new()),
            &Arc::new(FakeProfiles::new()),
        );
        auth.start();
        auth.ready().await;

        let result = auth.sign_out().await;

        assert!(matches!(result, Err(AuthError::Backend(_))));
        let snapshot = auth.snapshot();
        assert!(snapshot.user.is_none());
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_sign_up_validates_password() {
        let identity = Arc::new(FakeIdentity::new());
        let auth = controller(
            &identity,
            &Arc::new(FakeRoles::new()),
            &Arc::new(FakeProfiles::new()),
        );

        let err = auth
            .sign_up("new@example.com", "short", SignUpMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword(_)));
    }

    #[tokio::test]
    async fn test_sign_up_creates_profile() {
        let profiles = Arc::new(FakeProfiles::new());
        let auth = controller(
            &Arc::new(FakeIdentity::new()),
            &Arc::new(FakeRoles::new()),
            &profiles,
        );
        auth.start();

        let outcome = auth
            .sign_up(
                "new@example.com",
                "long enough",
                SignUpMetadata {
                    full_name: Some("New Shopper".to_string()),
                },
            )
            .await
            .unwrap();

        assert!(!outcome.needs_confirmation());
        let profile = profiles.get(&outcome.user.id).unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("New Shopper"));
        assert_eq!(auth.user().map(|u| u.id), Some(outcome.user.id));
    }

    #[tokio::test]
    async fn test_sign_up_awaiting_confirmation_stays_signed_out() {
        let profiles = Arc::new(FakeProfiles::new());
        let auth = controller(
            &Arc::new(FakeIdentity::new().requiring_confirmation()),
            &Arc::new(FakeRoles::new()),
            &profiles,
        );
        auth.start();

        let outcome = auth
            .sign_up("new@example.com", "long enough", SignUpMetadata::default())
            .await
            .unwrap();

        assert!(outcome.needs_confirmation());
        assert!(profiles.get(&outcome.user.id).is_none());
        assert!(auth.ready().await.user.is_none());
    }

    #[tokio::test]
    async fn test_sign_up_existing_user() {
        let identity = Arc::new(FakeIdentity::new());
        identity.register("taken@example.com", "long enough");
        let auth = controller(
            &identity,
            &Arc::new(FakeRoles::new()),
            &Arc::new(FakeProfiles::new()),
        );

        let err = auth
            .sign_up("taken@example.com", "long enough", SignUpMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserAlreadyExists));
    }

    #[tokio::test]
    async fn test_profile_actions_require_session() {
        let auth = controller(
            &Arc::new(FakeIdentity::new()),
            &Arc::new(FakeRoles::new()),
            &Arc::new(FakeProfiles::new()),
        );
        auth.ready().await;

        assert!(matches!(
            auth.update_profile(&ProfileUpdate::default()).await,
            Err(AuthError::NotSignedIn)
        ));
        assert!(matches!(auth.profile().await, Err(AuthError::NotSignedIn)));
        assert!(matches!(
            auth.update_password("long enough").await,
            Err(AuthError::NotSignedIn)
        ));
    }

    #[tokio::test]
    async fn test_update_profile_does_not_touch_session() {
        let session = fake_session("shopper@example.com");
        let profiles = Arc::new(FakeProfiles::new());
        profiles.seed(Profile {
            id: session.user.id,
            full_name: Some("Shopper".to_string()),
            phone: None,
            avatar_url: None,
            updated_at: None,
        });
        let auth = controller(
            &Arc::new(FakeIdentity::new().with_session(session.clone())),
            &Arc::new(FakeRoles::new()),
            &profiles,
        );
        auth.start();
        auth.ready().await;

        let profile = auth
            .update_profile(&ProfileUpdate {
                phone: Some("+1 555 0100".to_string()),
                ..ProfileUpdate::default()
            })
            .await
            .unwrap();

        assert_eq!(profile.id, session.user.id);
        assert_eq!(profile.full_name.as_deref(), Some("Shopper"));
        assert_eq!(profile.phone.as_deref(), Some("+1 555 0100"));
        assert_eq!(auth.session(), Some(session));
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed_before_profile_calls() {
        let session = fake_session("shopper@example.com");
        let profiles = Arc::new(FakeProfiles::new());
        profiles.seed(Profile {
            id: session.user.id,
            full_name: Some("Shopper".to_string()),
            phone: None,
            avatar_url: None,
            updated_at: None,
        });
        let identity = Arc::new(FakeIdentity::new().with_session(session.clone()));
        let auth = controller(&identity, &Arc::new(FakeRoles::new()), &profiles);
        auth.start();
        auth.ready().await;

        identity.expire_session();
        let profile = auth.profile().await.unwrap().unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("Shopper"));
        assert_eq!(identity.refreshes(), 1);

        // The refresh reaches local state as TokenRefreshed
        eventually(|| {
            auth.session()
                .is_some_and(|s| s.access_token != session.access_token && !s.is_expired())
        })
        .await;
        assert_eq!(auth.user().map(|u| u.id), Some(session.user.id));

        auth.update_profile(&ProfileUpdate {
            phone: Some("+1 555 0100".to_string()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap();
        assert_eq!(identity.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_reset_password_validates_email() {
        let identity = Arc::new(FakeIdentity::new());
        let auth = controller(
            &identity,
            &Arc::new(FakeRoles::new()),
            &Arc::new(FakeProfiles::new()),
        );

        assert!(matches!(
            auth.reset_password("nope").await,
            Err(AuthError::InvalidEmail(_))
        ));
        auth.reset_password("shopper@example.com").await.unwrap();
        assert_eq!(identity.reset_requests(), vec!["shopper@example.com".to_string()]);
    }
}
