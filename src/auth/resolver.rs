//! Agent signing-key resolution.
//!
//! [`KeyResolver`] fetches an agent's profile document from its profile URL
//! and extracts the published `signing_keys` JWK set, caching the result for
//! one hour keyed by a deterministic hash of the URL. The fetch has bounded
//! timeouts and no retry: a slow or dead key endpoint degrades to a rejected
//! request, never a hung pipeline.
//!
//! Concurrent refreshes of the same profile are last-writer-wins; a refresh
//! is idempotent (it yields the same or a newer key set), so no ordering
//! guarantee is needed.

use std::{
    num::NonZeroUsize,
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use lru::LruCache;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::{
    auth::jwk::JwkSet,
    error::{GatewayError, Result},
};

/// How long a fetched key set stays valid.
pub const KEY_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Maximum number of distinct agent profiles kept in the cache.
const KEY_CACHE_CAPACITY: usize = 256;

/// Fetches an agent profile document.
///
/// The seam between the resolver and the network, so tests can substitute
/// an in-memory fetcher.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Fetches and JSON-decodes the document at `profile_url`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::KeyFetch`] on network failure and
    /// [`GatewayError::KeyFormat`] if the body is not JSON.
    async fn fetch(&self, profile_url: &str) -> Result<serde_json::Value>;
}

/// [`ProfileFetcher`] backed by a pooled HTTP client.
#[derive(Debug, Clone)]
pub struct HttpProfileFetcher {
    client: Client,
}

impl HttpProfileFetcher {
    /// Creates a fetcher with bounded timeouts.
    ///
    /// Connect timeout 5 seconds, total timeout 10 seconds, no retry. Key
    /// endpoints that cannot answer in that window are treated as having no
    /// usable keys.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::KeyFetch`] if client construction fails.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(GatewayError::KeyFetch)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProfileFetcher for HttpProfileFetcher {
    async fn fetch(&self, profile_url: &str) -> Result<serde_json::Value> {
        let response = self.client.get(profile_url).send().await?.error_for_status()?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::KeyFormat(format!("profile body is not JSON: {e}")))
    }
}

#[derive(Debug, Clone)]
struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Resolves and caches agent signing keys.
pub struct KeyResolver {
    fetcher: Box<dyn ProfileFetcher>,
    cache: Mutex<LruCache<String, CachedKeys>>,
    ttl: Duration,
}

impl std::fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolver").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl KeyResolver {
    /// Creates a resolver with the default one-hour TTL.
    #[must_use]
    pub fn new(fetcher: Box<dyn ProfileFetcher>) -> Self {
        Self::with_ttl(fetcher, KEY_CACHE_TTL)
    }

    /// Creates a resolver with a custom TTL. Used by tests to force expiry.
    ///
    /// # Panics
    ///
    /// Never panics; the cache capacity constant is non-zero.
    #[must_use]
    pub fn with_ttl(fetcher: Box<dyn ProfileFetcher>, ttl: Duration) -> Self {
        let capacity =
            NonZeroUsize::new(KEY_CACHE_CAPACITY).expect("cache capacity constant is non-zero");
        Self { fetcher, cache: Mutex::new(LruCache::new(capacity)), ttl }
    }

    /// Resolves the signing keys published at `profile_url`.
    ///
    /// Returns the cached set when present and unexpired; otherwise fetches
    /// the profile document, extracts `signing_keys`, caches, and returns.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::KeyFetch`]: the profile could not be fetched.
    /// - [`GatewayError::KeyFormat`]: the document has no `signing_keys`
    ///   field, or the field is empty or malformed. Callers treat both as
    ///   "no usable keys" — verification must fail, nothing crashes.
    #[instrument(skip(self), fields(profile_url))]
    pub async fn resolve(&self, profile_url: &str) -> Result<JwkSet> {
        let cache_key = Self::cache_key(profile_url);

        if let Some(cached) = self.cached(&cache_key) {
            debug!(profile_url, "signing keys served from cache");
            return Ok(cached);
        }

        let document = self.fetcher.fetch(profile_url).await?;
        let signing_keys = document.get("signing_keys").ok_or_else(|| {
            GatewayError::KeyFormat("profile document has no signing_keys field".to_owned())
        })?;

        let keys = JwkSet::from_signing_keys(signing_keys)?;
        if keys.is_empty() {
            return Err(GatewayError::KeyFormat("signing_keys holds no keys".to_owned()));
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(cache_key, CachedKeys { keys: keys.clone(), fetched_at: Instant::now() });
        }
        info!(profile_url, key_count = keys.keys.len(), "agent signing keys cached");

        Ok(keys)
    }

    fn cached(&self, cache_key: &str) -> Option<JwkSet> {
        let mut cache = self.cache.lock().ok()?;
        let entry = cache.get(cache_key)?;
        if entry.fetched_at.elapsed() >= self.ttl {
            cache.pop(cache_key);
            return None;
        }
        Some(entry.keys.clone())
    }

    /// Deterministic cache key for a profile URL.
    fn cache_key(profile_url: &str) -> String {
        let hash = Sha256::digest(profile_url.as_bytes());
        base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, hash)
    }
}
