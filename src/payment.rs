//! UCP payment handler.
//!
//! Payment capture itself is delegated to the external payment subsystem;
//! this module owns what the gateway needs from it: the handler descriptor
//! advertised in the discovery manifest, the registration check that gates
//! checkout, and the post-payment confirmation flow (status transition,
//! stock reduction, status-change callbacks).
//!
//! Extension points that the host platform previously wired through
//! lifecycle hooks are explicit here: callbacks registered with
//! [`UcpPaymentHandler::on_status_change`] run at the single call site in
//! [`UcpPaymentHandler::confirm_payment`].

use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    error::{GatewayError, Result},
    settings::Settings,
    store::{CatalogStore, OrderRecord, OrderStatus, OrderStore},
};

/// Payment method identifier attached to UCP-created orders.
pub const GATEWAY_ID: &str = "ucp_gateway";

/// Protocol version advertised by the handler.
const HANDLER_VERSION: &str = "2026-01-11";

/// Payment-handler descriptor published in the discovery manifest.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentHandlerDescriptor {
    /// Handler identifier.
    pub id: String,
    /// Handler protocol name.
    pub name: String,
    /// Handler protocol version.
    pub version: String,
    /// Specification URL.
    pub spec: String,
    /// Configuration schema URL.
    pub config_schema: String,
    /// Accepted payment-instrument schema URLs.
    pub instrument_schemas: Vec<String>,
    /// Handler configuration.
    pub config: PaymentHandlerConfig,
}

/// Handler configuration block of the descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentHandlerConfig {
    /// Payment tokens the mock handler accepts.
    pub supported_tokens: Vec<String>,
}

/// Callback invoked after an order's status changes.
pub type StatusChangeCallback = Box<dyn Fn(&OrderRecord) + Send + Sync>;

/// The registered UCP payment handler.
///
/// Checkout requires a registered, enabled handler; its absence fails the
/// session with [`GatewayError::Unavailable`].
pub struct UcpPaymentHandler {
    enabled: bool,
    default_status: OrderStatus,
    status_callbacks: Vec<StatusChangeCallback>,
}

impl std::fmt::Debug for UcpPaymentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UcpPaymentHandler")
            .field("enabled", &self.enabled)
            .field("default_status", &self.default_status)
            .field("status_callbacks", &self.status_callbacks.len())
            .finish()
    }
}

impl UcpPaymentHandler {
    /// Creates an enabled handler from gateway settings.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            enabled: true,
            default_status: settings.default_order_status,
            status_callbacks: Vec::new(),
        }
    }

    /// Overrides the enabled flag. Used to model a disabled payment
    /// backend.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns true if the handler accepts payments.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Registers a callback to run after each status transition.
    pub fn on_status_change(&mut self, callback: StatusChangeCallback) {
        self.status_callbacks.push(callback);
    }

    /// Returns the descriptor advertised in the discovery manifest.
    #[must_use]
    pub fn descriptor(&self) -> PaymentHandlerDescriptor {
        PaymentHandlerDescriptor {
            id: "mock_payment_handler".to_owned(),
            name: "dev.ucp.mock_payment".to_owned(),
            version: HANDLER_VERSION.to_owned(),
            spec: "https://ucp.dev/specs/mock".to_owned(),
            config_schema: "https://ucp.dev/schemas/mock.json".to_owned(),
            instrument_schemas: vec![
                "https://ucp.dev/schemas/shopping/types/card_payment_instrument.json".to_owned(),
            ],
            config: PaymentHandlerConfig {
                supported_tokens: vec!["success_token".to_owned(), "fail_token".to_owned()],
            },
        }
    }

    /// Confirms payment for an order.
    ///
    /// Transitions the order to the configured default status, reduces
    /// catalog stock for every line, and invokes the registered
    /// status-change callbacks with the updated record.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] if the order does not exist and
    /// [`GatewayError::Store`] on storage failure.
    #[instrument(skip(self, orders, catalog))]
    pub async fn confirm_payment(
        &self,
        orders: &dyn OrderStore,
        catalog: &dyn CatalogStore,
        order_id: u64,
    ) -> Result<()> {
        let order = orders
            .get(order_id)
            .await?
            .ok_or_else(|| GatewayError::Validation(format!("order {order_id} not found")))?;

        orders
            .update_status(order_id, self.default_status, "Payment confirmed via UCP.")
            .await?;

        for line in &order.line_items {
            catalog.reduce_stock(line.product_id, line.quantity).await;
        }

        if let Some(updated) = orders.get(order_id).await? {
            for callback in &self.status_callbacks {
                callback(&updated);
            }
        }

        info!(order_id, status = ?self.default_status, "payment confirmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::store::{
        MemoryCatalog, MemoryOrderStore, NewOrder, OrderLine, Product, StockStatus,
    };

    fn seeded_stores() -> (MemoryOrderStore, MemoryCatalog) {
        let catalog = MemoryCatalog::new();
        catalog.add_product(Product {
            id: 1,
            name: "Widget".to_owned(),
            description: String::new(),
            price: dec!(10),
            currency: "USD".to_owned(),
            url: String::new(),
            image: None,
            stock_status: StockStatus::InStock,
            stock_quantity: Some(10),
            created_at: Utc::now(),
        });
        (MemoryOrderStore::new(), catalog)
    }

    async fn insert_order(orders: &MemoryOrderStore) -> u64 {
        orders
            .insert(NewOrder {
                line_items: vec![OrderLine {
                    product_id: 1,
                    name: "Widget".to_owned(),
                    quantity: 3,
                    unit_price: dec!(10),
                }],
                buyer: None,
                applied_coupons: Vec::new(),
                currency: "USD".to_owned(),
                total: dec!(30),
                status: OrderStatus::Pending,
                payment_method: GATEWAY_ID.to_owned(),
                idempotency_key: None,
                agent_profile: None,
            })
            .await
            .unwrap()
            .order_id()
    }

    #[test]
    fn test_descriptor_shape() {
        let handler = UcpPaymentHandler::new(&Settings::default());
        let descriptor = handler.descriptor();

        assert_eq!(descriptor.id, "mock_payment_handler");
        assert_eq!(descriptor.name, "dev.ucp.mock_payment");
        assert_eq!(descriptor.config.supported_tokens, vec!["success_token", "fail_token"]);

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["version"], "2026-01-11");
        assert!(json["instrument_schemas"][0]
            .as_str()
            .unwrap()
            .contains("card_payment_instrument"));
    }

    #[tokio::test]
    async fn test_confirm_payment_transitions_status_and_reduces_stock() {
        let (orders, catalog) = seeded_stores();
        let order_id = insert_order(&orders).await;

        let handler = UcpPaymentHandler::new(&Settings::default());
        handler.confirm_payment(&orders, &catalog, order_id).await.unwrap();

        let order = orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);

        let product = catalog.product(1).await.unwrap();
        assert_eq!(product.stock_quantity, Some(7));
    }

    #[tokio::test]
    async fn test_confirm_payment_uses_configured_status() {
        let (orders, catalog) = seeded_stores();
        let order_id = insert_order(&orders).await;

        let settings =
            Settings { default_order_status: OrderStatus::OnHold, ..Default::default() };
        let handler = UcpPaymentHandler::new(&settings);
        handler.confirm_payment(&orders, &catalog, order_id).await.unwrap();

        let order = orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::OnHold);
    }

    #[tokio::test]
    async fn test_status_change_callback_runs() {
        let (orders, catalog) = seeded_stores();
        let order_id = insert_order(&orders).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&calls);

        let mut handler = UcpPaymentHandler::new(&Settings::default());
        handler.on_status_change(Box::new(move |order| {
            assert_eq!(order.status, OrderStatus::Processing);
            observed.fetch_add(1, Ordering::SeqCst);
        }));

        handler.confirm_payment(&orders, &catalog, order_id).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_confirm_payment_unknown_order() {
        let (orders, catalog) = seeded_stores();
        let handler = UcpPaymentHandler::new(&Settings::default());

        let err = handler.confirm_payment(&orders, &catalog, 99).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }
}
