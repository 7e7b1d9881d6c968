//! UCP Gateway: agent checkout for merchants, with trust built in.
//!
//! A merchant-side implementation of the Universal Commerce Protocol (UCP):
//! autonomous agents discover this merchant's catalog and capabilities and
//! place orders over HTTP. The interesting part — and the part this crate
//! is built around — is the trust and integrity layer between an untrusted
//! network caller and an order-creation side effect with real financial
//! consequence:
//!
//! - **Signature verification** against keys the agent publishes at its
//!   profile URL, with the signature bound to a digest of the exact request
//!   body so it cannot be replayed across payloads.
//! - **Idempotent session creation**, so client retries never create
//!   duplicate orders.
//! - **Bounded risk controls**: a spend cap, stock re-validation, and an
//!   optional agent allow-list.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   AI Agent   │  publishes signing keys at its profile URL
//! └──────┬───────┘
//!        │ HTTPS + request-signature / UCP-Agent headers
//! ┌──────▼──────────────────────────────────────────────┐
//! │               UCP Gateway (this crate)              │
//! │  ┌───────────────┐       ┌──────────────────────┐   │
//! │  │ ProtocolGate- │──────▶│ RequestAuthenticator │   │
//! │  │ way (api)     │       │  └─▶ KeyResolver ────┼───┼──▶ agent profile URL
//! │  └──────┬────────┘       └──────────────────────┘   │
//! │         │ on accept                                 │
//! │  ┌──────▼────────┐                                  │
//! │  │ SessionManager│──▶ OrderStore / CatalogStore     │
//! │  └───────────────┘    (host commerce platform)      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Dependencies are constructed explicitly once at process start and passed
//! by reference — no singletons, no ambient lookup. The host platform's
//! order and catalog storage sit behind the [`store::OrderStore`] and
//! [`store::CatalogStore`] traits; in-memory implementations ship for the
//! server binary and tests.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//!
//! use ucp_gateway::{
//!     api::{self, AppState},
//!     auth::{KeyResolver, RequestAuthenticator, HttpProfileFetcher},
//!     checkout::SessionManager,
//!     payment::UcpPaymentHandler,
//!     store::{CatalogStore, MemoryCatalog, MemoryOrderStore, OrderStore},
//!     Settings,
//! };
//!
//! # fn example() -> ucp_gateway::Result<()> {
//! let settings = Arc::new(Settings::default());
//! let orders: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
//! let catalog: Arc<dyn CatalogStore> = Arc::new(MemoryCatalog::new());
//!
//! let resolver = Arc::new(KeyResolver::new(Box::new(HttpProfileFetcher::new()?)));
//! let authenticator =
//!     Arc::new(RequestAuthenticator::new(resolver, Arc::clone(&settings)));
//! let payment = Arc::new(UcpPaymentHandler::new(&settings));
//!
//! let sessions = Arc::new(SessionManager::new(
//!     Arc::clone(&orders),
//!     Arc::clone(&catalog),
//!     Arc::clone(&settings),
//!     Some(Arc::clone(&payment)),
//! ));
//!
//! let app = api::router(AppState {
//!     settings,
//!     authenticator,
//!     sessions,
//!     catalog,
//!     payment_handlers: Arc::new(vec![payment.descriptor()]),
//! });
//! # let _ = app;
//! # Ok(())
//! # }
//! ```
//!
//! # Module organization
//!
//! - [`auth`]: key resolution and request signature verification
//! - [`checkout`]: checkout-session creation and shipping quotes
//! - [`discovery`]: discovery manifest construction
//! - [`payment`]: payment-handler descriptor and confirmation flow
//! - [`api`]: axum routes tying the pipeline together
//! - [`store`]: order/catalog trait seams and in-memory implementations
//! - [`settings`]: typed configuration
//! - [`error`]: error taxonomy and HTTP status mapping

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod api;
pub mod auth;
pub mod checkout;
pub mod discovery;
pub mod error;
pub mod payment;
pub mod settings;
pub mod store;

pub use error::{GatewayError, Result};
pub use settings::{Capability, Settings};
