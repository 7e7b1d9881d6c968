//! Agent-published JSON Web Keys.
//!
//! Agents publish their public signing keys as a JWK set
//! ([RFC 7517](https://www.rfc-editor.org/rfc/rfc7517.html)) in the
//! `signing_keys` field of their profile document. This module parses that
//! structure and converts usable entries into Ed25519 verifying keys.
//!
//! Parsing is deliberately tolerant: profile documents are third-party
//! input, so unknown fields are ignored and non-Ed25519 keys are skipped
//! rather than rejected. A set only fails hard when it yields no usable key
//! at all — the caller treats that as "verification must fail".

use ed25519_dalek::VerifyingKey;
use serde::Deserialize;

use crate::error::{GatewayError, Result};

/// A single JSON Web Key as published by an agent.
///
/// Only OKP/Ed25519 keys are usable for verification; the remaining fields
/// are kept for key selection (`kid`) and diagnostics.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type (`OKP` for Ed25519).
    pub kty: String,
    /// Curve name.
    #[serde(default)]
    pub crv: Option<String>,
    /// Public key material, base64url-encoded without padding.
    #[serde(default)]
    pub x: Option<String>,
    /// Key identifier, matched against a token's `kid` header.
    #[serde(default)]
    pub kid: Option<String>,
    /// Declared algorithm.
    #[serde(default)]
    pub alg: Option<String>,
}

impl Jwk {
    /// Returns true if this entry declares an Ed25519 key.
    #[must_use]
    pub fn is_ed25519(&self) -> bool {
        self.kty == "OKP" && self.crv.as_deref() == Some("Ed25519")
    }

    /// Decodes this entry into an Ed25519 verifying key.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::KeyFormat`] if the entry is not an Ed25519
    /// key, its `x` coordinate is missing or not valid base64url, or the
    /// decoded material is not a valid 32-byte Ed25519 point.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        if !self.is_ed25519() {
            return Err(GatewayError::KeyFormat(format!(
                "unsupported key type {}/{}",
                self.kty,
                self.crv.as_deref().unwrap_or("?")
            )));
        }

        let x = self
            .x
            .as_deref()
            .ok_or_else(|| GatewayError::KeyFormat("JWK is missing 'x' coordinate".to_owned()))?;

        let raw = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, x)
            .map_err(|e| GatewayError::KeyFormat(format!("JWK 'x' is not base64url: {e}")))?;

        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| GatewayError::KeyFormat("Ed25519 key must be 32 bytes".to_owned()))?;

        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| GatewayError::KeyFormat(format!("invalid Ed25519 key: {e}")))
    }
}

/// An agent's published key set.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct JwkSet {
    /// Published keys, usable or not.
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Parses the `signing_keys` value of a profile document.
    ///
    /// Accepts both the canonical set shape (`{"keys": [...]}`) and a bare
    /// key array, since agent implementations publish either.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::KeyFormat`] if the value matches neither
    /// shape.
    pub fn from_signing_keys(value: &serde_json::Value) -> Result<Self> {
        if value.is_array() {
            let keys = serde_json::from_value(value.clone()).map_err(|e| {
                GatewayError::KeyFormat(format!("signing_keys array is malformed: {e}"))
            })?;
            return Ok(Self { keys });
        }
        serde_json::from_value(value.clone())
            .map_err(|e| GatewayError::KeyFormat(format!("signing_keys is malformed: {e}")))
    }

    /// Returns true if the set holds no keys at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Decodes every usable Ed25519 key, paired with its `kid`.
    ///
    /// Undecodable and non-Ed25519 entries are skipped.
    #[must_use]
    pub fn verification_keys(&self) -> Vec<(Option<&str>, VerifyingKey)> {
        self.keys
            .iter()
            .filter_map(|jwk| {
                jwk.verifying_key().ok().map(|key| (jwk.kid.as_deref(), key))
            })
            .collect()
    }
}
