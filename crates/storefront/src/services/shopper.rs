//! Per-visitor shopper state.
//!
//! Every browser session owns one [`ShopperSession`]: a cart, a wishlist
//! and an Auth Session Controller. Sessions live in a `moka` cache keyed by
//! the visitor id stored in the cookie session and are evicted after a
//! period of inactivity.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use moka::future::Cache;
use tracing::info;
use uuid::Uuid;

use atelier_core::{CartStore, WishlistStore};

use crate::models::Session;
use crate::services::auth::{AuthController, AuthSettings, BackendConnector};

/// Upper bound on concurrently cached shoppers.
const MAX_SHOPPERS: u64 = 100_000;

/// One visitor's cart, wishlist and auth state.
pub struct ShopperSession {
    visitor: Uuid,
    cart: Mutex<CartStore>,
    wishlist: Mutex<WishlistStore>,
    auth: Arc<AuthController>,
}

impl ShopperSession {
    #[must_use]
    pub fn new(visitor: Uuid, auth: Arc<AuthController>) -> Self {
        Self {
            visitor,
            cart: Mutex::new(CartStore::new()),
            wishlist: Mutex::new(WishlistStore::new()),
            auth,
        }
    }

    #[must_use]
    pub const fn visitor_id(&self) -> Uuid {
        self.visitor
    }

    #[must_use]
    pub const fn auth(&self) -> &Arc<AuthController> {
        &self.auth
    }

    /// Run `f` with exclusive access to the cart.
    pub fn cart<R>(&self, f: impl FnOnce(&mut CartStore) -> R) -> R {
        let mut cart = self.cart.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut cart)
    }

    /// Run `f` with exclusive access to the wishlist.
    pub fn wishlist<R>(&self, f: impl FnOnce(&mut WishlistStore) -> R) -> R {
        let mut wishlist = self.wishlist.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut wishlist)
    }
}

/// Visitor id → shopper session.
#[derive(Clone)]
pub struct ShopperRegistry {
    shoppers: Cache<Uuid, Arc<ShopperSession>>,
    backend: Arc<dyn BackendConnector>,
    settings: AuthSettings,
}

impl ShopperRegistry {
    #[must_use]
    pub fn new(backend: Arc<dyn BackendConnector>, settings: AuthSettings, idle: Duration) -> Self {
        let shoppers = Cache::builder()
            .max_capacity(MAX_SHOPPERS)
            .time_to_idle(idle)
            .build();

        Self {
            shoppers,
            backend,
            settings,
        }
    }

    /// The visitor's shopper session, starting one if needed.
    ///
    /// A new session's controller is seeded with `restored` and started
    /// (listener subscribed, bootstrap spawned).
    pub async fn get_or_start(&self, visitor: Uuid, restored: Option<Session>) -> Arc<ShopperSession> {
        self.shoppers
            .get_with(visitor, async { self.start(visitor, restored) })
            .await
    }

    fn start(&self, visitor: Uuid, restored: Option<Session>) -> Arc<ShopperSession> {
        let restoring = restored.is_some();
        let auth = Arc::new(AuthController::new(
            self.backend.identity_for(restored),
            self.backend.roles(),
            self.backend.profiles(),
            self.settings.clone(),
        ));
        auth.start();

        info!(%visitor, restoring, "Started shopper session");
        Arc::new(ShopperSession::new(visitor, auth))
    }

    /// Approximate number of live shopper sessions.
    #[must_use]
    pub fn active(&self) -> u64 {
        self.shoppers.entry_count()
    }

    /// Flush pending cache maintenance so [`active`](Self::active) is exact.
    pub async fn sync(&self) {
        self.shoppers.run_pending_tasks().await;
    }
}
