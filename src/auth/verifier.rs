//! Inbound request authentication.
//!
//! Checkout requests carry two headers: `request-signature`, a compact JWS
//! signed with one of the agent's published Ed25519 keys, and `UCP-Agent`,
//! which names the agent's profile URL (`profile="<url>"`). The
//! [`RequestAuthenticator`] resolves the profile's key set and verifies the
//! token in a single pass with no retries.
//!
//! # Payload binding
//!
//! A bare token proves key possession but nothing about the request it
//! accompanies, which would allow replaying one signature across different
//! request bodies. This gateway therefore requires the JWS payload to carry
//! a `request_digest` claim equal to the base64url SHA-256 of the exact raw
//! request body; a missing or mismatched digest rejects the request.
//!
//! Verification is a pure decision: the only external call is the key
//! resolution, and no order state is touched. Every failure path converts
//! to a rejection — exceptions never propagate to the request pipeline.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use ed25519_dalek::Signature;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use signature::Verifier;
use tracing::{debug, instrument, warn};

use crate::{
    auth::{jwk::JwkSet, resolver::KeyResolver},
    error::{GatewayError, Result},
    settings::Settings,
};

/// Header carrying the request signature (a compact JWS).
pub const SIGNATURE_HEADER: &str = "request-signature";

/// Header identifying the calling agent: `profile="<url>"`.
pub const AGENT_HEADER: &str = "UCP-Agent";

/// Signature value accepted verbatim when dev mode is enabled.
pub const DEV_BYPASS_SIGNATURE: &str = "test";

/// Extracts the profile URL from a `UCP-Agent` header value.
///
/// The header format is `profile="<url>"`; anything before or after the
/// quoted value is ignored. Returns `None` when the pattern is absent or
/// the URL is empty.
///
/// # Examples
///
/// ```
/// use ucp_gateway::auth::parse_agent_profile;
///
/// let profile = parse_agent_profile(r#"profile="https://agent.test/profile""#);
/// assert_eq!(profile.as_deref(), Some("https://agent.test/profile"));
///
/// assert_eq!(parse_agent_profile("no profile here"), None);
/// ```
#[must_use]
pub fn parse_agent_profile(header: &str) -> Option<String> {
    let rest = &header[header.find("profile=\"")? + "profile=\"".len()..];
    let url = &rest[..rest.find('"')?];
    if url.is_empty() {
        None
    } else {
        Some(url.to_owned())
    }
}

/// Computes the request digest a signature must bind to: base64url (no pad)
/// SHA-256 of the raw request body.
#[must_use]
pub fn compute_request_digest(body: &[u8]) -> String {
    let hash = Sha256::digest(body);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, hash)
}

/// Claims the gateway reads from a request signature token.
///
/// Unknown claims are ignored; agents may carry whatever else their
/// directory requires.
#[derive(Debug, Deserialize)]
struct SignatureClaims {
    /// Expiration (Unix seconds). Checked when present.
    #[serde(default)]
    exp: Option<u64>,
    /// Digest of the request body this signature covers. Required.
    #[serde(default)]
    request_digest: Option<String>,
}

/// Verifies inbound request signatures against agent-published keys.
pub struct RequestAuthenticator {
    resolver: Arc<KeyResolver>,
    settings: Arc<Settings>,
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("dev_mode", &self.settings.dev_mode)
            .finish_non_exhaustive()
    }
}

impl RequestAuthenticator {
    /// Creates an authenticator over `resolver` with the given settings.
    #[must_use]
    pub fn new(resolver: Arc<KeyResolver>, settings: Arc<Settings>) -> Self {
        Self { resolver, settings }
    }

    /// Decides whether a request is authentic.
    ///
    /// Single pass, in order: dev-mode bypass, header presence, profile
    /// extraction, allow-list membership, key resolution, token
    /// verification. Any failure rejects; reasons are logged, never
    /// returned to the caller.
    #[instrument(skip_all, fields(has_signature = signature.is_some()))]
    pub async fn verify(
        &self,
        signature: Option<&str>,
        agent_header: Option<&str>,
        body: &[u8],
    ) -> bool {
        if self.settings.dev_mode && signature == Some(DEV_BYPASS_SIGNATURE) {
            warn!("request accepted via dev-mode signature bypass");
            return true;
        }

        let (Some(signature), Some(agent_header)) = (signature, agent_header) else {
            debug!("request rejected: missing signature or agent header");
            return false;
        };

        let Some(profile_url) = parse_agent_profile(agent_header) else {
            debug!("request rejected: agent header has no profile URL");
            return false;
        };

        let allow_list = &self.settings.agent_whitelist;
        if !allow_list.is_empty() && !allow_list.contains(&profile_url) {
            warn!(profile_url, "agent profile blocked by allow-list");
            return false;
        }

        let keys = match self.resolver.resolve(&profile_url).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(profile_url, error = %e, "could not resolve agent signing keys");
                return false;
            }
        };

        match verify_token(signature, &keys, body) {
            Ok(()) => {
                debug!(profile_url, "request signature verified");
                true
            }
            Err(e) => {
                warn!(profile_url, error = %e, "request signature rejected");
                false
            }
        }
    }
}

/// Verifies a compact JWS against a resolved key set and the request body.
///
/// The token must be `header.payload.signature` with `alg: EdDSA`. When the
/// header names a `kid`, the matching key is tried first; otherwise every
/// usable key in the set is tried. Claims checks: `exp` must not have
/// passed, and `request_digest` must equal the digest of `body`.
///
/// # Errors
///
/// Returns [`GatewayError::Auth`] describing the first failed check.
pub fn verify_token(token: &str, keys: &JwkSet, body: &[u8]) -> Result<()> {
    let mut segments = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(GatewayError::Auth("token is not a compact JWS".to_owned()));
    };

    let header: serde_json::Value = serde_json::from_slice(&decode_segment(header_b64)?)
        .map_err(|e| GatewayError::Auth(format!("token header is not JSON: {e}")))?;

    if header.get("alg").and_then(serde_json::Value::as_str) != Some("EdDSA") {
        return Err(GatewayError::Auth("token algorithm is not EdDSA".to_owned()));
    }
    let token_kid = header.get("kid").and_then(serde_json::Value::as_str);

    let signature_bytes = decode_segment(signature_b64)?;
    let signature = Signature::from_bytes(
        &signature_bytes
            .try_into()
            .map_err(|_| GatewayError::Auth("signature is not 64 bytes".to_owned()))?,
    );

    // The signed message is the token's own encoded header and payload.
    let message = &token[..header_b64.len() + 1 + payload_b64.len()];

    let mut candidates = keys.verification_keys();
    if candidates.is_empty() {
        return Err(GatewayError::Auth("agent published no usable Ed25519 keys".to_owned()));
    }
    if let Some(kid) = token_kid {
        candidates.sort_by_key(|(candidate_kid, _)| *candidate_kid != Some(kid));
    }

    if !candidates
        .iter()
        .any(|(_, key)| key.verify(message.as_bytes(), &signature).is_ok())
    {
        return Err(GatewayError::Auth(
            "signature does not verify against any published key".to_owned(),
        ));
    }

    let claims: SignatureClaims = serde_json::from_slice(&decode_segment(payload_b64)?)
        .map_err(|e| GatewayError::Auth(format!("token payload is not JSON: {e}")))?;

    if let Some(exp) = claims.exp {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GatewayError::Auth(format!("system time error: {e}")))?
            .as_secs();
        if now > exp {
            return Err(GatewayError::Auth("token has expired".to_owned()));
        }
    }

    let expected_digest = compute_request_digest(body);
    if claims.request_digest.as_deref() != Some(expected_digest.as_str()) {
        return Err(GatewayError::Auth(
            "request_digest claim missing or does not match request body".to_owned(),
        ));
    }

    Ok(())
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, segment)
        .map_err(|e| GatewayError::Auth(format!("token segment is not base64url: {e}")))
}
