//! In-memory order and catalog stores.
//!
//! Reference implementations of the [`OrderStore`] and [`CatalogStore`]
//! seams. The order store enforces idempotency-key uniqueness under a single
//! lock, so concurrent creations with the same key cannot both commit: the
//! loser observes [`InsertOutcome::Existing`].

use std::{
    collections::HashMap,
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::{
    error::{GatewayError, Result},
    store::{
        CatalogStore, Coupon, InsertOutcome, NewOrder, OrderRecord, OrderStatus, OrderStore,
        Product, StockStatus,
    },
};

#[derive(Debug, Default)]
struct OrderStoreInner {
    orders: HashMap<u64, OrderRecord>,
    by_idempotency_key: HashMap<String, u64>,
    next_id: u64,
}

/// In-memory [`OrderStore`].
///
/// Lookup and insert share one mutex, which makes the
/// check-then-create sequence atomic per store instance.
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    inner: Mutex<OrderStoreInner>,
}

impl MemoryOrderStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of persisted orders.
    pub fn order_count(&self) -> usize {
        self.lock().map(|inner| inner.orders.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, OrderStoreInner>> {
        self.inner
            .lock()
            .map_err(|_| GatewayError::Store("order store lock poisoned".to_owned()))
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.lock()?.by_idempotency_key.get(key).copied())
    }

    async fn insert(&self, order: NewOrder) -> Result<InsertOutcome> {
        let mut inner = self.lock()?;

        if let Some(key) = order.idempotency_key.as_deref().filter(|key| !key.is_empty()) {
            if let Some(&existing) = inner.by_idempotency_key.get(key) {
                debug!(order_id = existing, "insert matched existing idempotency key");
                return Ok(InsertOutcome::Existing(existing));
            }
        }

        inner.next_id += 1;
        let id = inner.next_id;
        let record = OrderRecord {
            id,
            line_items: order.line_items,
            buyer: order.buyer,
            applied_coupons: order.applied_coupons,
            currency: order.currency,
            total: order.total,
            status: order.status,
            payment_method: order.payment_method,
            idempotency_key: order.idempotency_key.clone(),
            agent_profile: order.agent_profile,
            created_at: Utc::now(),
        };

        if let Some(key) = order.idempotency_key.filter(|key| !key.is_empty()) {
            inner.by_idempotency_key.insert(key, id);
        }
        inner.orders.insert(id, record);

        Ok(InsertOutcome::Created(id))
    }

    async fn get(&self, id: u64) -> Result<Option<OrderRecord>> {
        Ok(self.lock()?.orders.get(&id).cloned())
    }

    async fn update_status(&self, id: u64, status: OrderStatus, note: &str) -> Result<()> {
        let mut inner = self.lock()?;
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| GatewayError::Store(format!("order {id} not found")))?;
        order.status = status;
        info!(order_id = id, ?status, note, "order status updated");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CatalogInner {
    products: HashMap<u64, Product>,
    coupons: HashMap<String, Coupon>,
}

/// In-memory [`CatalogStore`].
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    inner: Mutex<CatalogInner>,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog pre-populated with `products` and `coupons`.
    #[must_use]
    pub fn with_contents(products: Vec<Product>, coupons: Vec<Coupon>) -> Self {
        let catalog = Self::new();
        for product in products {
            catalog.add_product(product);
        }
        for coupon in coupons {
            catalog.add_coupon(coupon);
        }
        catalog
    }

    /// Adds or replaces a product.
    pub fn add_product(&self, product: Product) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.products.insert(product.id, product);
        }
    }

    /// Adds or replaces a coupon.
    pub fn add_coupon(&self, coupon: Coupon) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.coupons.insert(coupon.code.clone(), coupon);
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn product(&self, id: u64) -> Option<Product> {
        self.inner.lock().ok()?.products.get(&id).cloned()
    }

    async fn recent_products(&self, limit: usize) -> Vec<Product> {
        let mut products: Vec<Product> = match self.inner.lock() {
            Ok(inner) => inner.products.values().cloned().collect(),
            Err(_) => return Vec::new(),
        };
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        products.truncate(limit);
        products
    }

    async fn coupon(&self, code: &str) -> Option<Coupon> {
        self.inner.lock().ok()?.coupons.get(code).cloned()
    }

    async fn reduce_stock(&self, product_id: u64, quantity: u32) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let Some(product) = inner.products.get_mut(&product_id) else {
            return;
        };
        if let Some(on_hand) = product.stock_quantity {
            let remaining = on_hand.saturating_sub(quantity);
            product.stock_quantity = Some(remaining);
            if remaining == 0 {
                product.stock_status = StockStatus::OutOfStock;
            }
            debug!(product_id, remaining, "stock reduced");
        }
    }
}
