// src/keys/jwks.rs

use super::model::JsonWebKeySet;
use crate::cache::{PerEntryExpiry, TimeToLive};
use crate::error::NilaLtiError;
use jsonwebtoken::DecodingKey;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// A client for fetching and caching remote JSON Web Key Sets.
///
/// Unlike a single-issuer client, one instance serves any number of key
/// set URIs: each platform (and this service's own launch endpoint)
/// publishes its own set.
#[derive(Clone)]
pub struct JwksClient {
    // The client is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    http_client: reqwest::Client,
    default_cache_ttl: Duration,
    // Cache stores `jwks_uri` -> (`kid` -> `DecodingKey`).
    key_sets: Cache<String, CachedKeySet>,
}

#[derive(Clone)]
struct CachedKeySet {
    keys: Arc<HashMap<String, DecodingKey>>,
    ttl: Duration,
}

impl TimeToLive for CachedKeySet {
    fn time_to_live(&self) -> Option<Duration> {
        Some(self.ttl)
    }
}

impl JwksClient {
    /// Creates a new `JwksClient`.
    ///
    /// `default_cache_ttl` applies when a response carries no `max-age`.
    pub fn new(http_client: reqwest::Client, default_cache_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                http_client,
                default_cache_ttl,
                key_sets: Cache::builder()
                    .max_capacity(1_000)
                    .expire_after(PerEntryExpiry)
                    .build(),
            }),
        }
    }

    /// Retrieves the decoding key `kid` from the set published at `jwks_uri`.
    ///
    /// A cached set is used when present. If the set is not cached, or the
    /// cached set lacks `kid` (the remote side may have rotated), the set
    /// is fetched again once before giving up.
    #[instrument(skip(self), err)]
    pub async fn get_key(&self, jwks_uri: &str, kid: &str) -> Result<DecodingKey, NilaLtiError> {
        match self.inner.key_sets.get(jwks_uri).await {
            Some(set) => {
                if let Some(key) = set.keys.get(kid) {
                    debug!("JWK cache hit for kid: {}", kid);
                    return Ok(key.clone());
                }
                debug!("kid {} not in cached key set. Refetching.", kid);
            }
            None => debug!("JWKS cache miss for {}. Fetching.", jwks_uri),
        }

        let set = self.fetch_and_cache_keys(jwks_uri).await?;
        set.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| NilaLtiError::KeyNotFound(kid.to_string()))
    }

    /// Fetches the key set and replaces the cached copy.
    async fn fetch_and_cache_keys(&self, jwks_uri: &str) -> Result<CachedKeySet, NilaLtiError> {
        let unavailable = |reason: String| NilaLtiError::KeySetUnavailable {
            uri: jwks_uri.to_string(),
            reason,
        };

        let response = self
            .inner
            .http_client
            .get(jwks_uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable(e.to_string()))?;

        let ttl = parse_cache_control(&response).unwrap_or(self.inner.default_cache_ttl);

        let jwks: JsonWebKeySet = response.json().await.map_err(|e| unavailable(e.to_string()))?;

        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in jwks.keys {
            // Only RSA keys can verify the RS*/PS* tokens this crate accepts.
            if jwk.kty != "RSA" || jwk.kid.is_empty() {
                continue;
            }
            let n = jwk.n.as_deref().ok_or_else(|| {
                NilaLtiError::InvalidKeyFormat("RSA key missing 'n' component".to_string())
            })?;
            let e = jwk.e.as_deref().ok_or_else(|| {
                NilaLtiError::InvalidKeyFormat("RSA key missing 'e' component".to_string())
            })?;
            keys.insert(jwk.kid, DecodingKey::from_rsa_components(n, e)?);
        }

        debug!("Fetched {} keys from {}. Caching with TTL: {:?}", keys.len(), jwks_uri, ttl);

        let set = CachedKeySet { keys: Arc::new(keys), ttl };
        self.inner.key_sets.insert(jwks_uri.to_string(), set.clone()).await;
        Ok(set)
    }
}

/// Parses the `Cache-Control` header to determine the TTL.
fn parse_cache_control(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::CACHE_CONTROL)?
        .to_str()
        .ok()?
        .split(',')
        .find_map(|part| {
            part.trim()
                .strip_prefix("max-age=")?
                .parse::<u64>()
                .ok()
                .map(Duration::from_secs)
        })
}
