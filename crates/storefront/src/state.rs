//! Application state shared across handlers.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::StorefrontConfig;
use crate::services::ShopperRegistry;
use crate::services::auth::{AuthSettings, BackendConnector};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// catalog, the per-visitor shopper sessions and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    catalog: Catalog,
    shoppers: ShopperRegistry,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `catalog` - Loaded product catalog
    /// * `backend` - Hands out identity, role and profile clients per visitor
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        catalog: Catalog,
        backend: Arc<dyn BackendConnector>,
    ) -> Self {
        let settings = AuthSettings {
            role_timeout: config.backend.role_lookup_timeout,
            reset_redirect: Some(config.password_reset_redirect()),
            ..AuthSettings::default()
        };
        let shoppers = ShopperRegistry::new(backend, settings, config.session_idle);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                catalog,
                shoppers,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the product catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Get a reference to the shopper session registry.
    #[must_use]
    pub fn shoppers(&self) -> &ShopperRegistry {
        &self.inner.shoppers
    }
}
