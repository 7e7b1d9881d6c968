//! Agent authentication: key resolution and signature verification.
//!
//! Two components form the trust layer in front of checkout:
//!
//! - [`KeyResolver`] fetches and caches the JWK set an agent publishes at
//!   its profile URL (1-hour TTL, bounded fetch timeout, no retry).
//! - [`RequestAuthenticator`] turns the `request-signature` and `UCP-Agent`
//!   headers plus the raw request body into a single accept/reject
//!   decision, consulting the allow-list and the resolved keys.
//!
//! The signature is a compact JWS whose payload must bind to a digest of
//! the exact request body; see [`verifier`] for the format.

pub mod jwk;
pub mod resolver;
pub mod verifier;

pub use jwk::{Jwk, JwkSet};
pub use resolver::{HttpProfileFetcher, KeyResolver, ProfileFetcher, KEY_CACHE_TTL};
pub use verifier::{
    compute_request_digest, parse_agent_profile, RequestAuthenticator, AGENT_HEADER,
    DEV_BYPASS_SIGNATURE, SIGNATURE_HEADER,
};
