//! In-memory backend fakes.
//!
//! Compiled for unit tests and, with the `test-util` feature, for the
//! integration-tests crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, broadcast};
use uuid::Uuid;

use atelier_core::{Email, UserId};

use crate::backend::BackendError;
use crate::config::{BackendConfig, StorefrontConfig};
use crate::models::{
    AuthChange, AuthUser, Profile, ProfileUpdate, Session, SignUpMetadata, SignUpOutcome,
};
use crate::services::auth::{BackendConnector, IdentityProvider, ProfileStore, RoleDirectory};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn api_error(status: u16, code: Option<&str>, message: &str) -> BackendError {
    BackendError::Api {
        status,
        code: code.map(String::from),
        message: message.to_string(),
    }
}

/// Configuration for in-process tests.
///
/// The backend URL points at a closed port; tests pass a [`FakeConnector`]
/// instead of a real client.
///
/// # Panics
///
/// Never in practice; the literal backend URL is valid.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 0,
        base_url: "http://localhost:3000".to_string(),
        catalog_path: std::path::PathBuf::from("content/products.json"),
        session_idle: Duration::from_secs(30 * 60),
        backend: BackendConfig {
            url: url::Url::parse("http://127.0.0.1:9/").expect("valid test URL"),
            anon_key: secrecy::SecretString::from("test-anon-key"),
            roles_table: "user_roles".to_string(),
            profiles_table: "profiles".to_string(),
            role_lookup_timeout: Duration::from_secs(5),
        },
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A one-hour session for a fresh user.
#[must_use]
pub fn fake_session(email: &str) -> Session {
    session_for(AuthUser {
        id: UserId::new(Uuid::new_v4()),
        email: Some(email.to_string()),
        full_name: None,
        created_at: Some(Utc::now()),
    })
}

fn session_for(user: AuthUser) -> Session {
    Session {
        access_token: format!("access-{}", Uuid::new_v4()),
        refresh_token: format!("refresh-{}", Uuid::new_v4()),
        token_type: "bearer".to_string(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        user,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: AuthUser,
}

/// Accounts shared by every [`FakeIdentity`] a [`FakeConnector`] hands out.
type Accounts = Arc<Mutex<HashMap<String, Account>>>;

/// Identity provider keeping accounts and the session in memory.
pub struct FakeIdentity {
    accounts: Accounts,
    session: Mutex<Option<Session>>,
    changes: broadcast::Sender<AuthChange>,
    restore_error: bool,
    sign_out_error: bool,
    require_confirmation: bool,
    sign_in_attempts: AtomicUsize,
    refreshes: AtomicUsize,
    reset_requests: Mutex<Vec<String>>,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::shared(Accounts::default(), None)
    }

    fn shared(accounts: Accounts, restored: Option<Session>) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            accounts,
            session: Mutex::new(restored),
            changes,
            restore_error: false,
            sign_out_error: false,
            require_confirmation: false,
            sign_in_attempts: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            reset_requests: Mutex::new(Vec::new()),
        }
    }

    /// Start with `session` already stored, as if restored from a cookie.
    #[must_use]
    pub fn with_session(self, session: Session) -> Self {
        *lock(&self.session) = Some(session);
        self
    }

    /// `current_session` fails.
    #[must_use]
    pub fn with_restore_error(mut self) -> Self {
        self.restore_error = true;
        self
    }

    /// `sign_out` fails after dropping the local session.
    #[must_use]
    pub fn with_sign_out_error(mut self) -> Self {
        self.sign_out_error = true;
        self
    }

    /// `sign_up` returns a user but no session.
    #[must_use]
    pub fn requiring_confirmation(mut self) -> Self {
        self.require_confirmation = true;
        self
    }

    /// Create an account and return its user id.
    ///
    /// # Panics
    ///
    /// Panics if `email` is not a valid email address.
    pub fn register(&self, email: &str, password: &str) -> UserId {
        let email = Email::parse(email).expect("valid test email");
        register(&self.accounts, &email, password)
    }

    #[must_use]
    pub fn sign_in_attempts(&self) -> usize {
        self.sign_in_attempts.load(Ordering::SeqCst)
    }

    /// Number of token refreshes performed.
    #[must_use]
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Move the stored session's expiry into the past, as if its access
    /// token had outlived its lifetime.
    pub fn expire_session(&self) {
        if let Some(session) = lock(&self.session).as_mut() {
            session.expires_at = Utc::now() - chrono::Duration::minutes(1);
        }
    }

    #[must_use]
    pub fn reset_requests(&self) -> Vec<String> {
        lock(&self.reset_requests).clone()
    }

    /// Push a notification as if it came from the provider.
    pub fn emit(&self, change: AuthChange) {
        let _ = self.changes.send(change);
    }

    fn establish(&self, session: Session) {
        *lock(&self.session) = Some(session.clone());
        self.emit(AuthChange::SignedIn(session));
    }

    /// The stored session, swapped for fresh tokens if it expired.
    fn valid_session(&self) -> Option<Session> {
        let mut stored = lock(&self.session);
        let session = stored.as_ref()?;
        if !session.is_expired() {
            return Some(session.clone());
        }
        let refreshed = session_for(session.user.clone());
        *stored = Some(refreshed.clone());
        drop(stored);

        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.emit(AuthChange::TokenRefreshed(refreshed.clone()));
        Some(refreshed)
    }
}

fn register(accounts: &Accounts, email: &Email, password: &str) -> UserId {
    let user = AuthUser {
        id: UserId::new(Uuid::new_v4()),
        email: Some(email.to_string()),
        full_name: None,
        created_at: Some(Utc::now()),
    };
    let id = user.id;
    lock(accounts).insert(
        email.as_str().to_string(),
        Account {
            password: password.to_string(),
            user,
        },
    );
    id
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        if self.restore_error {
            return Err(api_error(503, None, "identity service unavailable"));
        }
        Ok(self.valid_session())
    }

    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<Session, BackendError> {
        self.sign_in_attempts.fetch_add(1, Ordering::SeqCst);
        let account = lock(&self.accounts).get(email.as_str()).cloned();
        match account {
            Some(account) if account.password == password => {
                let session = session_for(account.user);
                self.establish(session.clone());
                Ok(session)
            }
            _ => Err(api_error(
                400,
                Some("invalid_credentials"),
                "Invalid login credentials",
            )),
        }
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<SignUpOutcome, BackendError> {
        if lock(&self.accounts).contains_key(email.as_str()) {
            return Err(api_error(
                422,
                Some("user_already_exists"),
                "User already registered",
            ));
        }
        register(&self.accounts, email, password);
        let mut user = lock(&self.accounts)
            .get(email.as_str())
            .map(|a| a.user.clone())
            .ok_or_else(|| BackendError::NotFound(email.to_string()))?;
        user.full_name.clone_from(&metadata.full_name);

        if self.require_confirmation {
            return Ok(SignUpOutcome {
                user,
                session: None,
            });
        }
        let session = session_for(user.clone());
        self.establish(session.clone());
        Ok(SignUpOutcome {
            user,
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        *lock(&self.session) = None;
        self.emit(AuthChange::SignedOut);
        if self.sign_out_error {
            return Err(api_error(500, None, "logout failed"));
        }
        Ok(())
    }

    async fn send_password_reset(
        &self,
        email: &Email,
        _redirect_to: Option<&str>,
    ) -> Result<(), BackendError> {
        lock(&self.reset_requests).push(email.to_string());
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<AuthUser, BackendError> {
        let session = self.valid_session().ok_or(BackendError::NotSignedIn)?;
        if let Some(email) = &session.user.email
            && let Some(account) = lock(&self.accounts).get_mut(email)
        {
            account.password = new_password.to_string();
        }
        self.emit(AuthChange::UserUpdated(session.clone()));
        Ok(session.user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

/// Role directory with controllable latency and failure.
#[derive(Default)]
pub struct FakeRoles {
    admins: Mutex<HashSet<UserId>>,
    delay: Option<Duration>,
    gate: Option<Notify>,
    started: Notify,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeRoles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every lookup sleeps for `delay` first.
    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Every lookup blocks until [`release`](Self::release) is called.
    #[must_use]
    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::default()
        }
    }

    /// Every lookup fails.
    #[must_use]
    pub fn failing() -> Self {
        let roles = Self::default();
        roles.fail.store(true, Ordering::SeqCst);
        roles
    }

    pub fn grant_admin(&self, user_id: UserId) {
        lock(&self.admins).insert(user_id);
    }

    /// Let one gated lookup through.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// Resolves once a lookup has started.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoleDirectory for FakeRoles {
    async fn is_admin(&self, session: &Session) -> Result<bool, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(api_error(500, Some("PGRST000"), "role query failed"));
        }
        Ok(lock(&self.admins).contains(&session.user.id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Profiles
// ─────────────────────────────────────────────────────────────────────────────

/// Profile rows in a map. Expired sessions are rejected the way the data
/// API rejects an expired JWT.
#[derive(Default)]
pub struct FakeProfiles {
    rows: Mutex<HashMap<UserId, Profile>>,
}

impl FakeProfiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, profile: Profile) {
        lock(&self.rows).insert(profile.id, profile);
    }

    #[must_use]
    pub fn get(&self, id: &UserId) -> Option<Profile> {
        lock(&self.rows).get(id).cloned()
    }
}

fn authorize(session: &Session) -> Result<(), BackendError> {
    if session.is_expired() {
        return Err(api_error(401, Some("PGRST301"), "JWT expired"));
    }
    Ok(())
}

#[async_trait]
impl ProfileStore for FakeProfiles {
    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, BackendError> {
        authorize(session)?;
        Ok(self.get(&session.user.id))
    }

    async fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        authorize(session)?;
        let mut rows = lock(&self.rows);
        let row = rows
            .get_mut(&session.user.id)
            .ok_or_else(|| BackendError::NotFound(format!("profiles row {}", session.user.id)))?;
        if let Some(full_name) = &update.full_name {
            row.full_name = Some(full_name.clone());
        }
        if let Some(phone) = &update.phone {
            row.phone = Some(phone.clone());
        }
        if let Some(avatar_url) = &update.avatar_url {
            row.avatar_url = Some(avatar_url.clone());
        }
        row.updated_at = Some(Utc::now());
        Ok(row.clone())
    }

    async fn create_profile(
        &self,
        _session: &Session,
        profile: &Profile,
    ) -> Result<Profile, BackendError> {
        let mut rows = lock(&self.rows);
        if rows.contains_key(&profile.id) {
            return Err(api_error(409, Some("23505"), "duplicate key"));
        }
        rows.insert(profile.id, profile.clone());
        Ok(profile.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connector
// ─────────────────────────────────────────────────────────────────────────────

/// [`BackendConnector`] over the fakes above.
///
/// Every visitor gets its own [`FakeIdentity`]; accounts, roles and profiles
/// are shared.
#[derive(Default)]
pub struct FakeConnector {
    accounts: Accounts,
    roles: Arc<FakeRoles>,
    profiles: Arc<FakeProfiles>,
}

impl FakeConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account.
    ///
    /// # Panics
    ///
    /// Panics if `email` is not a valid email address.
    pub fn register(&self, email: &str, password: &str) -> UserId {
        let email = Email::parse(email).expect("valid test email");
        register(&self.accounts, &email, password)
    }

    /// Create an account holding the admin role.
    pub fn register_admin(&self, email: &str, password: &str) -> UserId {
        let id = self.register(email, password);
        self.roles.grant_admin(id);
        id
    }

    #[must_use]
    pub fn profiles_store(&self) -> &FakeProfiles {
        &self.profiles
    }
}

impl BackendConnector for FakeConnector {
    fn identity_for(&self, restored: Option<Session>) -> Arc<dyn IdentityProvider> {
        Arc::new(FakeIdentity::shared(Arc::clone(&self.accounts), restored))
    }

    fn roles(&self) -> Arc<dyn RoleDirectory> {
        Arc::clone(&self.roles) as Arc<dyn RoleDirectory>
    }

    fn profiles(&self) -> Arc<dyn ProfileStore> {
        Arc::clone(&self.profiles) as Arc<dyn ProfileStore>
    }
}
