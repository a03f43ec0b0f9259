//! # Stock Sync
//!
//! Keeps the stock cache fresh and the customer's cart consistent with it.
//!
//! ## Refresh Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  timer tick / before checkout                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  GET /products ──fails──► keep stale cache, log, retry next tick       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StockCache::replace                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Cart::reconcile ──► inactive / zero / missing → line removed          │
//! │       │              stock < quantity        → quantity clamped        │
//! │       │              stock >= quantity       → figure updated          │
//! │       ▼                                                                 │
//! │  save cart + cart_changed event (only when something changed)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cart reads and writes on this device are serialised through one mutex so
//! a refresh never overwrites a concurrent add with an older snapshot.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::{SyncError, SyncResult};
use crate::events::ShopEventEmitter;
use crate::task::{spawn_periodic, TaskHandle, TickControl};
use vitrina_core::{Cart, CartChanges, CartError, ProductSnapshot, StockCache};
use vitrina_db::Database;

#[derive(Clone)]
pub struct StockSync {
    backend: Arc<dyn Backend>,
    db: Database,
    session_id: String,
    cache: Arc<RwLock<StockCache>>,
    cart_lock: Arc<Mutex<()>>,
    emitter: Arc<dyn ShopEventEmitter>,
}

impl StockSync {
    pub fn new(
        backend: Arc<dyn Backend>,
        db: Database,
        session_id: impl Into<String>,
        emitter: Arc<dyn ShopEventEmitter>,
    ) -> Self {
        StockSync {
            backend,
            db,
            session_id: session_id.into(),
            cache: Arc::new(RwLock::new(StockCache::new())),
            cart_lock: Arc::new(Mutex::new(())),
            emitter,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Refreshes the cache and reconciles the cart.
    ///
    /// Failures are logged and swallowed: the stale cache stays and the next
    /// tick tries again. Returns `None` when nothing could be fetched.
    pub async fn refresh(&self) -> Option<CartChanges> {
        match self.try_refresh().await {
            Ok(changes) => Some(changes),
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Stock refresh failed");
                self.emitter
                    .background_error("stock_refresh", &e.to_string(), e.is_retryable());
                None
            }
        }
    }

    /// [`StockSync::refresh`] with the error surfaced.
    pub async fn try_refresh(&self) -> SyncResult<CartChanges> {
        let products = self.backend.list_products().await?;
        debug!(count = products.len(), "Fetched products");

        self.cache.write().await.replace(products, Utc::now());

        let _guard = self.cart_lock.lock().await;
        let cart = self.load().await?;
        let reconciliation = {
            let cache = self.cache.read().await;
            cart.reconcile(cache.products())
        };

        // A lower figure that still covers the quantity is saved silently.
        if reconciliation.cart != cart {
            self.save(&reconciliation.cart).await?;
        }

        let changes = reconciliation.changes;
        if changes.is_empty() {
            return Ok(changes);
        }

        for removed in &changes.removed {
            info!(
                product_id = %removed.product_id,
                reason = ?removed.reason,
                "Cart line removed after stock refresh"
            );
        }
        for adjusted in &changes.adjusted {
            info!(
                product_id = %adjusted.product_id,
                from = adjusted.from,
                to = adjusted.to,
                "Cart quantity clamped after stock refresh"
            );
        }

        self.emitter
            .cart_changed(&self.session_id, &reconciliation.cart, &changes);
        Ok(changes)
    }

    // =========================================================================
    // Cache Reads
    // =========================================================================

    pub async fn product(&self, product_id: &str) -> Option<ProductSnapshot> {
        self.cache.read().await.get(product_id).cloned()
    }

    /// Active products with stock, in backend order.
    pub async fn sellable(&self) -> Vec<ProductSnapshot> {
        self.cache.read().await.sellable().cloned().collect()
    }

    pub async fn cache_snapshot(&self) -> StockCache {
        self.cache.read().await.clone()
    }

    // =========================================================================
    // Cart Mutations
    // =========================================================================

    pub async fn cart(&self) -> SyncResult<Cart> {
        let _guard = self.cart_lock.lock().await;
        self.load().await
    }

    /// Adds one unit of a cached product.
    ///
    /// Going past the cached stock is refused with a warning; the backend
    /// still has the final word at checkout.
    pub async fn add_to_cart(&self, product_id: &str) -> SyncResult<Cart> {
        let product = self
            .product(product_id)
            .await
            .ok_or_else(|| SyncError::UnknownProduct(product_id.to_string()))?;
        self.mutate(|cart| cart.add(&product)).await
    }

    pub async fn increase(&self, product_id: &str) -> SyncResult<Cart> {
        self.mutate(|cart| cart.increase(product_id)).await
    }

    pub async fn decrease(&self, product_id: &str) -> SyncResult<Cart> {
        self.mutate(|cart| cart.decrease(product_id)).await
    }

    /// `quantity == 0` removes the line.
    pub async fn set_quantity(&self, product_id: &str, quantity: i64) -> SyncResult<Cart> {
        self.mutate(|cart| cart.set_quantity(product_id, quantity))
            .await
    }

    pub async fn remove(&self, product_id: &str) -> SyncResult<Cart> {
        self.mutate(|cart| cart.remove(product_id)).await
    }

    pub async fn clear(&self) -> SyncResult<()> {
        let _guard = self.cart_lock.lock().await;
        self.clear_locked().await
    }

    async fn mutate<F>(&self, op: F) -> SyncResult<Cart>
    where
        F: FnOnce(&Cart) -> Result<Cart, CartError>,
    {
        let _guard = self.cart_lock.lock().await;
        let cart = self.load().await?;

        let updated = match op(&cart) {
            Ok(updated) => updated,
            Err(e) => {
                if matches!(e, CartError::StockLimit { .. } | CartError::ProductInactive { .. }) {
                    warn!(session_id = %self.session_id, error = %e, "Cart change refused");
                }
                return Err(e.into());
            }
        };

        self.save(&updated).await?;
        self.emitter
            .cart_changed(&self.session_id, &updated, &CartChanges::default());
        Ok(updated)
    }

    // =========================================================================
    // Locked Access (checkout)
    // =========================================================================

    /// Holds the cart for the duration of a checkout.
    pub(crate) async fn lock_cart(&self) -> MutexGuard<'_, ()> {
        self.cart_lock.lock().await
    }

    /// Reads the cart; the caller holds [`StockSync::lock_cart`].
    pub(crate) async fn load(&self) -> SyncResult<Cart> {
        Ok(self.db.carts().load(&self.session_id).await?)
    }

    async fn save(&self, cart: &Cart) -> SyncResult<()> {
        Ok(self.db.carts().replace(&self.session_id, cart).await?)
    }

    /// Clears the cart; the caller holds [`StockSync::lock_cart`].
    pub(crate) async fn clear_locked(&self) -> SyncResult<()> {
        self.db.carts().clear(&self.session_id).await?;
        self.emitter
            .cart_changed(&self.session_id, &Cart::new(), &CartChanges::default());
        Ok(())
    }

    // =========================================================================
    // Timer
    // =========================================================================

    /// Refreshes every `period` until the handle is shut down or dropped.
    pub fn spawn(&self, period: Duration) -> TaskHandle {
        let sync = self.clone();
        spawn_periodic("stock_refresh", period, move || {
            let sync = sync.clone();
            async move {
                sync.refresh().await;
                TickControl::Continue
            }
        })
    }
}
