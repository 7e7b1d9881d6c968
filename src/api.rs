//! HTTP surface of the gateway.
//!
//! Routes:
//!
//! - `GET /.well-known/ucp`, `GET /ucp/v1/discovery` — discovery manifest,
//!   always available.
//! - `POST /ucp/v1/shipping-rates` — static shipping quote, unauthenticated.
//! - `POST /ucp/v1/checkout-sessions` — capability gate, signature
//!   verification, then session creation.
//! - `GET /ucp/v1/products` — bounded recency-ordered product list, gated on
//!   the discovery capability.
//!
//! Handlers are thin: they translate HTTP to the core components and map
//! [`GatewayError`] values onto status codes. Error bodies expose only
//! messages the error taxonomy marks as client-safe; everything else is
//! logged under a correlation id and reduced to a generic message.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{self, RequestAuthenticator},
    checkout::{CheckoutRequest, SessionManager},
    discovery::{self, DiscoveryManifest},
    error::GatewayError,
    payment::PaymentHandlerDescriptor,
    settings::{Capability, Settings},
    store::{CatalogStore, Product, StockStatus},
};

/// Maximum number of products returned by the products endpoint.
const PRODUCT_LIST_LIMIT: usize = 10;

/// Shared state handed to every handler.
///
/// Built once at process start; there is no ambient global lookup.
#[derive(Clone)]
pub struct AppState {
    /// Gateway settings.
    pub settings: Arc<Settings>,
    /// Request authenticator.
    pub authenticator: Arc<RequestAuthenticator>,
    /// Session manager.
    pub sessions: Arc<SessionManager>,
    /// Product catalog.
    pub catalog: Arc<dyn CatalogStore>,
    /// Payment-handler descriptors for the discovery manifest.
    pub payment_handlers: Arc<Vec<PaymentHandlerDescriptor>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

/// Builds the gateway router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/.well-known/ucp", get(get_discovery))
        .route("/ucp/v1/discovery", get(get_discovery))
        .route("/ucp/v1/shipping-rates", post(post_shipping_rates))
        .route("/ucp/v1/checkout-sessions", post(post_checkout_session))
        .route("/ucp/v1/products", get(get_products))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_discovery(State(state): State<AppState>) -> Json<DiscoveryManifest> {
    Json(discovery::build_manifest(&state.settings, (*state.payment_handlers).clone()))
}

async fn post_shipping_rates(State(state): State<AppState>, body: Bytes) -> Response {
    // The body is optional; a missing or malformed one quotes the default
    // currency, matching the endpoint's read-only, best-effort nature.
    let currency = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|params| params.get("currency")?.as_str().map(str::to_owned));

    let rates = state.sessions.shipping_rates(currency.as_deref());
    Json(serde_json::json!({ "rates": rates })).into_response()
}

async fn post_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();

    if !state.settings.capability_enabled(Capability::Checkout) {
        return error_body(StatusCode::FORBIDDEN, "Checkout capability is disabled");
    }

    let signature = header_str(&headers, auth::SIGNATURE_HEADER);
    let agent_header = header_str(&headers, auth::AGENT_HEADER);

    if !state.authenticator.verify(signature, agent_header, &body).await {
        warn!(%request_id, "checkout rejected: invalid signature");
        return error_body(StatusCode::UNAUTHORIZED, "Invalid signature");
    }

    let mut request: CheckoutRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(%request_id, error = %e, "checkout payload does not parse");
            return error_body(StatusCode::BAD_REQUEST, "malformed checkout payload");
        }
    };

    // The idempotency-key header takes precedence over any body field.
    if let Some(key) = header_str(&headers, "idempotency-key") {
        request.idempotency_key = Some(key.to_owned());
    }
    request.agent_profile = agent_header.and_then(auth::parse_agent_profile);

    match state.sessions.create_session(request).await {
        Ok(checkout_id) => {
            info!(%request_id, checkout_id, "checkout session created");
            (StatusCode::CREATED, Json(serde_json::json!({ "checkout_id": checkout_id })))
                .into_response()
        }
        Err(e) => {
            warn!(%request_id, error = %e, "checkout session failed");
            error_response(&e)
        }
    }
}

/// Product summary returned by the products endpoint.
#[derive(Debug, Serialize)]
struct ProductSummary {
    id: u64,
    title: String,
    description: String,
    price: rust_decimal::Decimal,
    currency: String,
    url: String,
    image: Option<String>,
    stock: StockStatus,
}

impl From<Product> for ProductSummary {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            title: product.name,
            description: product.description,
            price: product.price,
            currency: product.currency,
            url: product.url,
            image: product.image,
            stock: product.stock_status,
        }
    }
}

async fn get_products(State(state): State<AppState>) -> Response {
    if !state.settings.capability_enabled(Capability::Discovery) {
        return error_body(StatusCode::FORBIDDEN, "Product discovery is disabled");
    }

    let products: Vec<ProductSummary> = state
        .catalog
        .recent_products(PRODUCT_LIST_LIMIT)
        .await
        .into_iter()
        .map(ProductSummary::from)
        .collect();

    Json(serde_json::json!({ "products": products })).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn error_response(error: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if error.is_client_safe() {
        error_body(status, &error.to_string())
    } else {
        error_body(status, "internal error")
    }
}
