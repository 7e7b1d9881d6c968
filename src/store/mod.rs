//! Order and catalog storage abstractions.
//!
//! The host commerce platform owns orders, products, and coupons; the
//! gateway core only consumes them. This module defines the trait seams —
//! [`OrderStore`] and [`CatalogStore`] — plus the data model shared across
//! the crate. In-memory implementations live in [`memory`] and are used by
//! the server binary and the test suite; a production deployment substitutes
//! platform-backed implementations.
//!
//! # Idempotency invariant
//!
//! At most one order exists per non-empty idempotency key. This is enforced
//! by [`OrderStore::insert`], which must atomically either create a new
//! order or return the existing order for the same key. Callers treat the
//! conflict as "return the existing order", never as a hard failure.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::{MemoryCatalog, MemoryOrderStore};

/// Stock status of a product.
///
/// Serialized with the commerce-platform wire spellings (`instock`,
/// `outofstock`, `onbackorder`) so the products endpoint and catalog
/// configuration round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockStatus {
    /// Product can be sold.
    #[serde(rename = "instock")]
    InStock,
    /// Product is sold out.
    #[serde(rename = "outofstock")]
    OutOfStock,
    /// Product is orderable but not on hand.
    #[serde(rename = "onbackorder")]
    OnBackorder,
}

/// Product in the merchant catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier.
    pub id: u64,
    /// Product name.
    pub name: String,
    /// Plain-text product description.
    #[serde(default)]
    pub description: String,
    /// Unit price.
    pub price: Decimal,
    /// Currency code (ISO 4217).
    pub currency: String,
    /// Public product page URL.
    #[serde(default)]
    pub url: String,
    /// Primary image URL, if any.
    #[serde(default)]
    pub image: Option<String>,
    /// Stock status.
    pub stock_status: StockStatus,
    /// Units on hand, when the product is stock-managed.
    #[serde(default)]
    pub stock_quantity: Option<u32>,
    /// Publication time; drives recency ordering in product discovery.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Returns true if the product can currently be sold.
    ///
    /// A stock-managed product with zero units is not sellable even when
    /// its status still says in stock.
    #[must_use]
    pub fn is_in_stock(&self) -> bool {
        self.stock_status == StockStatus::InStock
            && self.stock_quantity.is_none_or(|quantity| quantity > 0)
    }
}

/// Discount scheme of a coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    /// Percentage off the order subtotal.
    Percent,
    /// Fixed amount off the order subtotal.
    Fixed,
}

/// Discount coupon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    /// Coupon code as submitted by the caller.
    pub code: String,
    /// Discount scheme.
    pub kind: CouponKind,
    /// Percentage (0–100) or fixed amount, per [`CouponKind`].
    pub amount: Decimal,
}

impl Coupon {
    /// Computes the discount this coupon grants on `subtotal`.
    ///
    /// Percentage discounts are rounded to two decimal places; fixed
    /// discounts never exceed the subtotal.
    #[must_use]
    pub fn discount_for(&self, subtotal: Decimal) -> Decimal {
        match self.kind {
            CouponKind::Percent => {
                (subtotal * self.amount / Decimal::from(100)).round_dp(2)
            }
            CouponKind::Fixed => self.amount.min(subtotal),
        }
    }
}

/// Lifecycle status of an order.
///
/// Orders are created [`Pending`](Self::Pending); the payment handler moves
/// them to the configured default status once payment is confirmed. Later
/// transitions belong to the external fulfilment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    /// Awaiting payment confirmation.
    Pending,
    /// Paid, being fulfilled.
    Processing,
    /// Paid, held for manual review.
    OnHold,
    /// Fulfilled.
    Completed,
    /// Cancelled.
    Cancelled,
}

/// One purchased line of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    /// Product the line refers to.
    pub product_id: u64,
    /// Product name at purchase time.
    pub name: String,
    /// Units purchased.
    pub quantity: u32,
    /// Unit price at purchase time.
    pub unit_price: Decimal,
}

/// Buyer contact details attached to an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Buyer {
    /// Buyer's full name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Buyer's email address.
    #[serde(default)]
    pub email: Option<String>,
}

/// A fully priced order ready to be persisted.
///
/// Built by the session manager only after every validation and risk gate
/// has passed; nothing about a draft is visible to the store before this.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Purchased lines, in request order.
    pub line_items: Vec<OrderLine>,
    /// Buyer contact details, when provided.
    pub buyer: Option<Buyer>,
    /// Coupon codes that were successfully applied.
    pub applied_coupons: Vec<String>,
    /// Currency code (ISO 4217).
    pub currency: String,
    /// Order total after discounts.
    pub total: Decimal,
    /// Initial status.
    pub status: OrderStatus,
    /// Payment method identifier.
    pub payment_method: String,
    /// Idempotency key, when the caller supplied one.
    pub idempotency_key: Option<String>,
    /// Profile URL of the agent that created the order.
    pub agent_profile: Option<String>,
}

/// A persisted order record.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    /// Store-assigned order id.
    pub id: u64,
    /// Purchased lines.
    pub line_items: Vec<OrderLine>,
    /// Buyer contact details.
    pub buyer: Option<Buyer>,
    /// Applied coupon codes.
    pub applied_coupons: Vec<String>,
    /// Currency code.
    pub currency: String,
    /// Order total.
    pub total: Decimal,
    /// Current status.
    pub status: OrderStatus,
    /// Payment method identifier.
    pub payment_method: String,
    /// Idempotency key the order was created under, if any.
    pub idempotency_key: Option<String>,
    /// Profile URL of the creating agent, if any.
    pub agent_profile: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Outcome of an [`OrderStore::insert`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new order was created.
    Created(u64),
    /// An order with the same idempotency key already existed; no new order
    /// was created.
    Existing(u64),
}

impl InsertOutcome {
    /// Returns the order id regardless of outcome.
    #[must_use]
    pub const fn order_id(self) -> u64 {
        match self {
            Self::Created(id) | Self::Existing(id) => id,
        }
    }
}

/// Order persistence owned by the host commerce platform.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Looks up an existing order by idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`](crate::GatewayError::Store) if the
    /// underlying storage fails.
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<u64>>;

    /// Persists a new order.
    ///
    /// When `order.idempotency_key` is non-empty, the lookup and insert MUST
    /// be atomic: a concurrent insert under the same key yields
    /// [`InsertOutcome::Existing`] for the loser instead of a duplicate
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`](crate::GatewayError::Store) if the
    /// underlying storage fails.
    async fn insert(&self, order: NewOrder) -> Result<InsertOutcome>;

    /// Fetches an order by id.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`](crate::GatewayError::Store) if the
    /// underlying storage fails.
    async fn get(&self, id: u64) -> Result<Option<OrderRecord>>;

    /// Transitions an order to `status`, recording `note` alongside.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`](crate::GatewayError::Store) if the
    /// order does not exist or storage fails.
    async fn update_status(&self, id: u64, status: OrderStatus, note: &str) -> Result<()>;
}

/// Read access to the merchant's product catalog and coupons.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Looks up a product by id.
    async fn product(&self, id: u64) -> Option<Product>;

    /// Returns up to `limit` published products, most recent first.
    async fn recent_products(&self, limit: usize) -> Vec<Product>;

    /// Looks up a coupon by code.
    async fn coupon(&self, code: &str) -> Option<Coupon>;

    /// Reduces a product's stock level after payment confirmation.
    ///
    /// A product that reaches zero units becomes out of stock. Unknown
    /// products and stock-unmanaged products are ignored.
    async fn reduce_stock(&self, product_id: u64, quantity: u32);
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn product(stock_status: StockStatus, stock_quantity: Option<u32>) -> Product {
        Product {
            id: 1,
            name: "Widget".to_owned(),
            description: String::new(),
            price: dec!(9.99),
            currency: "USD".to_owned(),
            url: String::new(),
            image: None,
            stock_status,
            stock_quantity,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_in_stock_without_managed_quantity() {
        assert!(product(StockStatus::InStock, None).is_in_stock());
    }

    #[test]
    fn test_zero_quantity_is_not_sellable() {
        assert!(!product(StockStatus::InStock, Some(0)).is_in_stock());
    }

    #[test]
    fn test_backorder_is_not_sellable() {
        assert!(!product(StockStatus::OnBackorder, Some(5)).is_in_stock());
        assert!(!product(StockStatus::OutOfStock, None).is_in_stock());
    }

    #[test]
    fn test_percent_coupon_rounds_to_cents() {
        let coupon =
            Coupon { code: "TEN".to_owned(), kind: CouponKind::Percent, amount: dec!(10) };
        assert_eq!(coupon.discount_for(dec!(9.99)), dec!(1.00));
        assert_eq!(coupon.discount_for(dec!(100)), dec!(10.00));
    }

    #[test]
    fn test_fixed_coupon_is_capped_at_subtotal() {
        let coupon =
            Coupon { code: "FIVE".to_owned(), kind: CouponKind::Fixed, amount: dec!(5) };
        assert_eq!(coupon.discount_for(dec!(20)), dec!(5));
        assert_eq!(coupon.discount_for(dec!(3)), dec!(3));
    }

    #[test]
    fn test_stock_status_wire_spelling() {
        let json = serde_json::to_string(&StockStatus::InStock).unwrap();
        assert_eq!(json, "\"instock\"");
        let parsed: StockStatus = serde_json::from_str("\"onbackorder\"").unwrap();
        assert_eq!(parsed, StockStatus::OnBackorder);
    }

    #[test]
    fn test_order_status_kebab_case() {
        let json = serde_json::to_string(&OrderStatus::OnHold).unwrap();
        assert_eq!(json, "\"on-hold\"");
    }

    #[test]
    fn test_insert_outcome_order_id() {
        assert_eq!(InsertOutcome::Created(7).order_id(), 7);
        assert_eq!(InsertOutcome::Existing(7).order_id(), 7);
    }
}
