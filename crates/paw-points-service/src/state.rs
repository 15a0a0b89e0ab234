//! Application state.

use std::sync::Arc;

use paw_points_core::CatalogProvider;
use paw_points_store::Store;

use crate::config::ServiceConfig;
use crate::inventory::InventoryManager;
use crate::ledger::PointsLedger;
use crate::purchase::PurchaseCoordinator;
use crate::rate_limit::{InMemoryRateLimiter, RateLimiter};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Shop catalog.
    pub catalog: Arc<dyn CatalogProvider>,

    /// Admission control for the HTTP surface.
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    /// Create a new application state with an in-memory rate limiter.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        catalog: Arc<dyn CatalogProvider>,
    ) -> Self {
        let rate_limiter = Arc::new(InMemoryRateLimiter::new(config.rate_limits));

        Self {
            store,
            config,
            catalog,
            rate_limiter,
        }
    }

    /// Replace the rate limiter (e.g. with a shared-counter implementation).
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// The points ledger over this state's store.
    #[must_use]
    pub fn ledger(&self) -> PointsLedger<'_> {
        PointsLedger::new(self.store.as_ref(), &self.config.points)
    }

    /// The purchase coordinator over this state's store and catalog.
    #[must_use]
    pub fn purchases(&self) -> PurchaseCoordinator<'_> {
        PurchaseCoordinator::new(self.store.as_ref(), self.catalog.as_ref())
    }

    /// The equip/inventory manager over this state's store and catalog.
    #[must_use]
    pub fn inventory(&self) -> InventoryManager<'_> {
        InventoryManager::new(self.store.as_ref(), self.catalog.as_ref())
    }
}
