//! Error types for the UCP gateway.
//!
//! All fallible operations in this crate return [`Result`], whose error type
//! is [`GatewayError`]. The taxonomy mirrors the protocol surface:
//!
//! - **Request errors** ([`GatewayError::Validation`], [`GatewayError::Stock`],
//!   [`GatewayError::LimitExceeded`]): the caller sent something the merchant
//!   cannot fulfil — bad input, an inventory conflict, or a tripped risk
//!   control. Mapped to HTTP 400.
//! - **Availability errors** ([`GatewayError::Unavailable`]): the checkout
//!   capability or the payment handler is switched off. Mapped to HTTP 403.
//! - **Authentication errors** ([`GatewayError::Auth`]): signature or
//!   allow-list failure. Mapped to HTTP 401.
//! - **Key resolution errors** ([`GatewayError::KeyFetch`],
//!   [`GatewayError::KeyFormat`]): the agent's profile document could not be
//!   fetched or holds no usable signing keys. These never escape the
//!   authentication layer — they degrade to a rejection, not a crash.
//! - **Infrastructure errors** ([`GatewayError::Store`],
//!   [`GatewayError::Config`]): storage or configuration faults. Their
//!   detail is logged but never exposed to callers.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while serving UCP requests.
///
/// Display messages for the request-level variants are written to be safe to
/// return to callers verbatim; infrastructure variants are reduced to a
/// generic message at the HTTP boundary.
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The checkout payload is malformed or references unknown data.
    ///
    /// Covers empty line-item lists, unknown product ids, and zero
    /// quantities. The message names the offending field or product.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A line item references a product that cannot currently be sold.
    ///
    /// Raised when a product is out of stock or its stock status is not
    /// "in stock". The whole checkout is aborted; no partial order survives.
    #[error("inventory conflict: {0}")]
    Stock(String),

    /// The computed order total exceeds the configured spend cap.
    ///
    /// Risk control for agent-initiated orders. The draft order is discarded
    /// before anything is persisted.
    #[error("order total {total} exceeds the maximum allowed limit ({max})")]
    LimitExceeded {
        /// Computed total of the rejected order.
        total: Decimal,
        /// Configured `max_order_total` that was exceeded.
        max: Decimal,
    },

    /// Checkout is switched off or the payment handler is not registered.
    #[error("checkout unavailable: {0}")]
    Unavailable(String),

    /// Request signature verification failed.
    ///
    /// The message describes the rejection reason for logs; the HTTP layer
    /// returns a fixed "Invalid signature" body instead.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Fetching an agent's profile document failed.
    ///
    /// Wraps [`reqwest::Error`]: timeouts, connection refusals, DNS and TLS
    /// failures. The key resolver applies a bounded timeout and no retry, so
    /// a slow agent key endpoint degrades to a rejected request rather than
    /// a hung pipeline.
    #[error("agent profile fetch failed: {0}")]
    KeyFetch(#[from] reqwest::Error),

    /// An agent's profile document holds no usable signing keys.
    ///
    /// The profile either lacks a `signing_keys` field, or the field holds
    /// no key this gateway can verify with. Treated as "verification must
    /// fail", not as a hard error.
    #[error("agent profile has no usable signing keys: {0}")]
    KeyFormat(String),

    /// The order store reported a failure.
    #[error("order store error: {0}")]
    Store(String),

    /// The gateway configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Returns the HTTP status code this error maps to at the API boundary.
    ///
    /// Authentication failures are distinguished from business-rule failures
    /// (401 vs 400/403); both are terminal for the request.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Stock(_) | Self::LimitExceeded { .. } => 400,
            Self::Auth(_) | Self::KeyFetch(_) | Self::KeyFormat(_) => 401,
            Self::Unavailable(_) => 403,
            Self::Store(_) | Self::Config(_) => 500,
        }
    }

    /// Returns true if the error's display message is safe to expose to the
    /// caller. Infrastructure errors are not: their detail belongs in logs.
    #[must_use]
    pub const fn is_client_safe(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Config(_) | Self::KeyFetch(_))
    }
}
