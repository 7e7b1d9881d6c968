//! Checkout session management.
//!
//! [`SessionManager`] turns an authenticated checkout payload into a
//! persisted order. The order of operations matters and is fixed:
//!
//! 1. idempotency short-circuit — a repeated key returns the existing order
//!    with no re-validation or re-pricing;
//! 2. capability and payment-handler gates;
//! 3. payload validation;
//! 4. per-line product resolution and stock gating, in input order, first
//!    failure aborting the whole session;
//! 5. best-effort coupon application — a bad coupon is logged and skipped;
//! 6. buyer metadata, currency, payment method, agent metadata;
//! 7. totals;
//! 8. spend-limit enforcement — a draft over the cap is discarded, never
//!    persisted;
//! 9. atomic persist (create, or return the existing order on an
//!    idempotency-key conflict).
//!
//! The draft order exists only on the stack until step 9, so no failure
//! path can leave a partial order behind.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{GatewayError, Result},
    payment::{self, UcpPaymentHandler},
    settings::{Capability, Settings},
    store::{Buyer, CatalogStore, NewOrder, OrderLine, OrderStatus, OrderStore, StockStatus},
};

/// Currency assigned when the payload names none.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Reference to a purchasable item in a checkout payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRef {
    /// Product identifier.
    pub id: u64,
}

/// One requested line of a checkout payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    /// The item being purchased.
    pub item: ItemRef,
    /// Units requested.
    pub quantity: u32,
}

/// A discount code submitted with a checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscountRef {
    /// Coupon code.
    pub code: String,
}

/// An inbound checkout-session payload.
///
/// `agent_profile` is never read from the body: the gateway derives it from
/// the verified `UCP-Agent` header after authentication, and `serde(skip)`
/// keeps callers from injecting it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    /// Requested lines.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// Buyer contact details.
    #[serde(default)]
    pub buyer: Option<Buyer>,
    /// Discount codes, applied best-effort.
    #[serde(default)]
    pub discounts: Vec<DiscountRef>,
    /// Currency code; defaults to [`DEFAULT_CURRENCY`].
    #[serde(default)]
    pub currency: Option<String>,
    /// Idempotency key; the `idempotency-key` header takes precedence.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Profile URL of the authenticated agent.
    #[serde(skip)]
    pub agent_profile: Option<String>,
}

/// A quoted shipping option.
#[derive(Debug, Clone, Serialize)]
pub struct ShippingRate {
    /// Rate identifier.
    pub id: &'static str,
    /// Human-readable title.
    pub title: &'static str,
    /// Rate amount.
    pub amount: Decimal,
    /// Currency code.
    pub currency: String,
}

/// Creates orders from validated checkout payloads.
pub struct SessionManager {
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn CatalogStore>,
    settings: Arc<Settings>,
    payment: Option<Arc<UcpPaymentHandler>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("payment_registered", &self.payment.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a session manager over the given stores and settings.
    ///
    /// `payment` is the registered payment handler; passing `None` models a
    /// deployment without a payment backend, which makes every checkout
    /// fail with [`GatewayError::Unavailable`].
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn CatalogStore>,
        settings: Arc<Settings>,
        payment: Option<Arc<UcpPaymentHandler>>,
    ) -> Self {
        Self { orders, catalog, settings, payment }
    }

    /// Creates a checkout session and returns the order id.
    ///
    /// Safe under client retries: a non-empty idempotency key maps to at
    /// most one order, whether the repeat arrives before or after the first
    /// request commits.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Unavailable`]: checkout capability disabled, or no
    ///   enabled payment handler.
    /// - [`GatewayError::Validation`]: empty line items, unknown product,
    ///   zero quantity.
    /// - [`GatewayError::Stock`]: a product cannot currently be sold.
    /// - [`GatewayError::LimitExceeded`]: total exceeds `max_order_total`.
    /// - [`GatewayError::Store`]: the order store failed.
    #[instrument(skip(self, request), fields(line_count = request.line_items.len()))]
    pub async fn create_session(&self, request: CheckoutRequest) -> Result<u64> {
        let idempotency_key =
            request.idempotency_key.as_deref().filter(|key| !key.is_empty());

        if let Some(key) = idempotency_key {
            if let Some(existing) = self.orders.find_by_idempotency_key(key).await? {
                debug!(order_id = existing, "idempotency key matched, returning existing order");
                return Ok(existing);
            }
        }

        if !self.settings.capability_enabled(Capability::Checkout) {
            return Err(GatewayError::Unavailable(
                "checkout capability is disabled".to_owned(),
            ));
        }
        let payment_enabled = self.payment.as_ref().is_some_and(|handler| handler.is_enabled());
        if !payment_enabled {
            return Err(GatewayError::Unavailable(
                "UCP payment handler is disabled or not registered".to_owned(),
            ));
        }

        if request.line_items.is_empty() {
            return Err(GatewayError::Validation("no line items provided".to_owned()));
        }

        let mut lines = Vec::with_capacity(request.line_items.len());
        let mut subtotal = Decimal::ZERO;
        for line in &request.line_items {
            if line.quantity == 0 {
                return Err(GatewayError::Validation(format!(
                    "quantity for product {} must be at least 1",
                    line.item.id
                )));
            }

            let product = self.catalog.product(line.item.id).await.ok_or_else(|| {
                GatewayError::Validation(format!("product {} not found", line.item.id))
            })?;

            if !product.is_in_stock() {
                return Err(GatewayError::Stock(format!(
                    "product \"{}\" is out of stock",
                    product.name
                )));
            }
            if product.stock_status != StockStatus::InStock {
                return Err(GatewayError::Stock(format!(
                    "product \"{}\" is not available",
                    product.name
                )));
            }

            subtotal += product.price * Decimal::from(line.quantity);
            lines.push(OrderLine {
                product_id: product.id,
                name: product.name,
                quantity: line.quantity,
                unit_price: product.price,
            });
        }

        let mut discount_total = Decimal::ZERO;
        let mut applied_coupons = Vec::new();
        for discount in &request.discounts {
            if discount.code.is_empty() {
                continue;
            }
            match self.catalog.coupon(&discount.code).await {
                Some(coupon) => {
                    let amount = coupon.discount_for(subtotal);
                    discount_total += amount;
                    info!(code = %discount.code, %amount, "coupon applied");
                    applied_coupons.push(discount.code.clone());
                }
                // A bad coupon never aborts the session.
                None => warn!(code = %discount.code, "coupon rejected, skipping"),
            }
        }

        let currency = request
            .currency
            .clone()
            .filter(|currency| !currency.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned());

        let total = (subtotal - discount_total).max(Decimal::ZERO);

        let max_total = self.settings.max_order_total;
        if max_total > Decimal::ZERO && total > max_total {
            warn!(%total, %max_total, "order rejected by spend limit, draft discarded");
            return Err(GatewayError::LimitExceeded { total, max: max_total });
        }

        let order = NewOrder {
            line_items: lines,
            buyer: request.buyer.clone(),
            applied_coupons,
            currency,
            total,
            status: OrderStatus::Pending,
            payment_method: payment::GATEWAY_ID.to_owned(),
            idempotency_key: idempotency_key.map(str::to_owned),
            agent_profile: request.agent_profile.clone(),
        };

        let outcome = self.orders.insert(order).await?;
        let order_id = outcome.order_id();
        match outcome {
            crate::store::InsertOutcome::Created(_) => {
                info!(order_id, %total, "checkout session created");
            }
            crate::store::InsertOutcome::Existing(_) => {
                debug!(order_id, "concurrent create lost the race, returning existing order");
            }
        }
        Ok(order_id)
    }

    /// Quotes shipping rates for a checkout.
    ///
    /// Unauthenticated static quote: a fixed standard/express pair echoing
    /// the requested currency. Real rate calculation belongs to the host
    /// platform.
    #[must_use]
    pub fn shipping_rates(&self, currency: Option<&str>) -> Vec<ShippingRate> {
        let currency = currency
            .filter(|currency| !currency.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_owned();
        vec![
            ShippingRate {
                id: "standard_shipping",
                title: "Standard Shipping",
                amount: Decimal::new(500, 2),
                currency: currency.clone(),
            },
            ShippingRate {
                id: "express_shipping",
                title: "Express Shipping",
                amount: Decimal::new(1500, 2),
                currency,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::store::{
        Coupon, CouponKind, MemoryCatalog, MemoryOrderStore, Product,
    };

    fn product(id: u64, price: Decimal, stock_status: StockStatus) -> Product {
        Product {
            id,
            name: format!("Product {id}"),
            description: String::new(),
            price,
            currency: "USD".to_owned(),
            url: String::new(),
            image: None,
            stock_status,
            stock_quantity: None,
            created_at: Utc::now(),
        }
    }

    struct Fixture {
        orders: Arc<MemoryOrderStore>,
        manager: SessionManager,
    }

    fn fixture(settings: Settings) -> Fixture {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.add_product(product(1, dec!(10.00), StockStatus::InStock));
        catalog.add_product(product(2, dec!(50.00), StockStatus::InStock));
        catalog.add_product(product(3, dec!(5.00), StockStatus::OutOfStock));
        catalog.add_coupon(Coupon {
            code: "TEN_OFF".to_owned(),
            kind: CouponKind::Fixed,
            amount: dec!(10),
        });
        catalog.add_coupon(Coupon {
            code: "HALF".to_owned(),
            kind: CouponKind::Percent,
            amount: dec!(50),
        });

        let orders = Arc::new(MemoryOrderStore::new());
        let settings = Arc::new(settings);
        let payment = Arc::new(UcpPaymentHandler::new(&settings));
        let manager = SessionManager::new(
            Arc::clone(&orders) as Arc<dyn OrderStore>,
            catalog,
            settings,
            Some(payment),
        );
        Fixture { orders, manager }
    }

    fn request(lines: &[(u64, u32)]) -> CheckoutRequest {
        CheckoutRequest {
            line_items: lines
                .iter()
                .map(|&(id, quantity)| LineItem { item: ItemRef { id }, quantity })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_session_persists_order() {
        let fx = fixture(Settings::default());
        let mut req = request(&[(1, 2), (2, 1)]);
        req.buyer = Some(Buyer {
            full_name: Some("Ada Lovelace".to_owned()),
            email: Some("ada@example.com".to_owned()),
        });
        req.agent_profile = Some("https://agent.test/profile".to_owned());

        let id = fx.manager.create_session(req).await.unwrap();
        let order = fx.orders.get(id).await.unwrap().unwrap();

        assert_eq!(order.total, dec!(70.00));
        assert_eq!(order.currency, "USD");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_method, "ucp_gateway");
        assert_eq!(order.agent_profile.as_deref(), Some("https://agent.test/profile"));
        assert_eq!(order.buyer.as_ref().unwrap().email.as_deref(), Some("ada@example.com"));
        assert_eq!(order.line_items.len(), 2);
    }

    #[tokio::test]
    async fn test_idempotent_replay_returns_same_order() {
        let fx = fixture(Settings::default());

        let mut first = request(&[(1, 1)]);
        first.idempotency_key = Some("retry-key".to_owned());
        let first_id = fx.manager.create_session(first).await.unwrap();

        // Same key with different line items still returns the original.
        let mut second = request(&[(2, 3)]);
        second.idempotency_key = Some("retry-key".to_owned());
        let second_id = fx.manager.create_session(second).await.unwrap();

        assert_eq!(first_id, second_id);
        assert_eq!(fx.orders.order_count(), 1, "exactly one order exists");
    }

    #[tokio::test]
    async fn test_empty_idempotency_key_is_ignored() {
        let fx = fixture(Settings::default());

        let mut first = request(&[(1, 1)]);
        first.idempotency_key = Some(String::new());
        let mut second = request(&[(1, 1)]);
        second.idempotency_key = Some(String::new());

        let a = fx.manager.create_session(first).await.unwrap();
        let b = fx.manager.create_session(second).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_checkout_capability_disabled() {
        let fx = fixture(Settings {
            capabilities: vec![Capability::Discovery],
            ..Default::default()
        });

        let err = fx.manager.create_session(request(&[(1, 1)])).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_payment_handler() {
        let catalog = Arc::new(MemoryCatalog::new());
        let orders = Arc::new(MemoryOrderStore::new());
        let manager = SessionManager::new(
            orders,
            catalog,
            Arc::new(Settings::default()),
            None,
        );

        let err = manager.create_session(request(&[(1, 1)])).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_disabled_payment_handler() {
        let catalog = Arc::new(MemoryCatalog::new());
        let orders = Arc::new(MemoryOrderStore::new());
        let settings = Arc::new(Settings::default());
        let payment = Arc::new(UcpPaymentHandler::new(&settings).with_enabled(false));
        let manager = SessionManager::new(orders, catalog, settings, Some(payment));

        let err = manager.create_session(request(&[(1, 1)])).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_line_items() {
        let fx = fixture(Settings::default());
        let err = fx.manager.create_session(request(&[])).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let fx = fixture(Settings::default());
        let err = fx.manager.create_session(request(&[(1, 1), (99, 1)])).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(fx.orders.order_count(), 0, "no partial order persists");
    }

    #[tokio::test]
    async fn test_zero_quantity() {
        let fx = fixture(Settings::default());
        let err = fx.manager.create_session(request(&[(1, 0)])).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn test_out_of_stock_aborts_whole_session() {
        let fx = fixture(Settings::default());
        let err = fx.manager.create_session(request(&[(1, 1), (3, 1)])).await.unwrap_err();

        assert!(matches!(err, GatewayError::Stock(_)));
        assert_eq!(fx.orders.order_count(), 0, "no partial order persists");
    }

    #[tokio::test]
    async fn test_spend_limit_discards_draft() {
        let fx = fixture(Settings { max_order_total: dec!(100), ..Default::default() });

        // 3 × 50.00 = 150.00 > 100.
        let err = fx.manager.create_session(request(&[(2, 3)])).await.unwrap_err();
        assert!(matches!(err, GatewayError::LimitExceeded { .. }));
        assert_eq!(fx.orders.order_count(), 0, "rejected draft must not persist");
    }

    #[tokio::test]
    async fn test_zero_spend_limit_means_unlimited() {
        let fx = fixture(Settings { max_order_total: Decimal::ZERO, ..Default::default() });
        let id = fx.manager.create_session(request(&[(2, 100)])).await.unwrap();
        let order = fx.orders.get(id).await.unwrap().unwrap();
        assert_eq!(order.total, dec!(5000.00));
    }

    #[tokio::test]
    async fn test_discount_at_exactly_the_cap_is_allowed() {
        let fx = fixture(Settings { max_order_total: dec!(100), ..Default::default() });
        // 2 × 50.00 = 100.00, not above the cap.
        assert!(fx.manager.create_session(request(&[(2, 2)])).await.is_ok());
    }

    #[tokio::test]
    async fn test_coupons_reduce_total() {
        let fx = fixture(Settings::default());
        let mut req = request(&[(2, 2)]); // 100.00
        req.discounts = vec![
            DiscountRef { code: "TEN_OFF".to_owned() },
            DiscountRef { code: "HALF".to_owned() },
        ];

        let id = fx.manager.create_session(req).await.unwrap();
        let order = fx.orders.get(id).await.unwrap().unwrap();

        // 100 − 10 (fixed) − 50 (50%) = 40.
        assert_eq!(order.total, dec!(40.00));
        assert_eq!(order.applied_coupons, vec!["TEN_OFF".to_owned(), "HALF".to_owned()]);
    }

    #[tokio::test]
    async fn test_unknown_coupon_is_skipped_not_fatal() {
        let fx = fixture(Settings::default());
        let mut req = request(&[(1, 1)]);
        req.discounts = vec![
            DiscountRef { code: "NO_SUCH_CODE".to_owned() },
            DiscountRef { code: "TEN_OFF".to_owned() },
        ];

        let id = fx.manager.create_session(req).await.unwrap();
        let order = fx.orders.get(id).await.unwrap().unwrap();

        assert_eq!(order.total, dec!(0.00), "10.00 − 10 off, floored at zero");
        assert_eq!(order.applied_coupons, vec!["TEN_OFF".to_owned()]);
    }

    #[tokio::test]
    async fn test_currency_defaults_to_usd() {
        let fx = fixture(Settings::default());

        let id = fx.manager.create_session(request(&[(1, 1)])).await.unwrap();
        assert_eq!(fx.orders.get(id).await.unwrap().unwrap().currency, "USD");

        let mut eur = request(&[(1, 1)]);
        eur.currency = Some("EUR".to_owned());
        let id = fx.manager.create_session(eur).await.unwrap();
        assert_eq!(fx.orders.get(id).await.unwrap().unwrap().currency, "EUR");
    }

    #[test]
    fn test_shipping_rates_static_pair() {
        let fx = fixture(Settings::default());

        let rates = fx.manager.shipping_rates(Some("EUR"));
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].id, "standard_shipping");
        assert_eq!(rates[0].amount, dec!(5.00));
        assert_eq!(rates[1].id, "express_shipping");
        assert_eq!(rates[1].amount, dec!(15.00));
        assert!(rates.iter().all(|rate| rate.currency == "EUR"));

        let defaulted = fx.manager.shipping_rates(None);
        assert!(defaulted.iter().all(|rate| rate.currency == "USD"));
    }

    #[tokio::test]
    async fn test_request_body_cannot_set_agent_profile() {
        let raw = r#"{
            "line_items": [{"item": {"id": 1}, "quantity": 1}],
            "agent_profile": "https://evil.test/profile"
        }"#;
        let parsed: CheckoutRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.agent_profile, None, "agent_profile is derived, not trusted input");
    }
}
