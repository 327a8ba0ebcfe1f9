//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! With a TTL of zero every lookup refetches the key set, so a rotated or
//! revoked key takes effect on the next request. A positive TTL keeps the
//! decoded keys in memory and refetches only when the TTL lapses or an
//! unknown `kid` shows up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::auth::idp::{IdentityProviderClient, IdpError};

/// Maximum stale cache age in seconds (24 hours).
pub const MAX_STALE_CACHE_SECONDS: u64 = 86400;

/// A single JSON Web Key from a JWKS document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA")
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    /// Key use (e.g., "sig" for signature)
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url encoded)
    pub n: Option<String>,
    /// RSA exponent (base64url encoded)
    pub e: Option<String>,
}

/// A JWKS document containing multiple keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Signing keys keyed by `kid`, with optional TTL caching.
pub struct JwksCache {
    idp: Arc<IdentityProviderClient>,
    cache_ttl: Duration,
    keys: RwLock<HashMap<String, DecodingKey>>,
    last_fetch: RwLock<Option<Instant>>,
}

impl JwksCache {
    /// `cache_ttl_seconds == 0` disables caching.
    pub fn new(idp: Arc<IdentityProviderClient>, cache_ttl_seconds: u64) -> Self {
        Self {
            idp,
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            keys: RwLock::new(HashMap::new()),
            last_fetch: RwLock::new(None),
        }
    }

    fn caching(&self) -> bool {
        !self.cache_ttl.is_zero()
    }

    /// Get the decoding key for `kid`, fetching the key set when needed.
    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey, JwksCacheError> {
        if self.caching() {
            let fresh = self
                .last_fetch
                .read()
                .await
                .map(|t| t.elapsed() <= self.cache_ttl)
                .unwrap_or(false);

            if fresh {
                if let Some(key) = self.keys.read().await.get(kid) {
                    return Ok(key.clone());
                }
                debug!("Key {} not in cache, refreshing JWKS", kid);
            }
        }

        match self.fetch_keys().await {
            Ok(()) => self
                .keys
                .read()
                .await
                .get(kid)
                .cloned()
                .ok_or_else(|| JwksCacheError::KeyNotFound(kid.to_string())),
            Err(e) => {
                if self.caching() {
                    let stale_ok = self
                        .last_fetch
                        .read()
                        .await
                        .map(|t| t.elapsed() < Duration::from_secs(MAX_STALE_CACHE_SECONDS))
                        .unwrap_or(false);

                    if stale_ok {
                        if let Some(key) = self.keys.read().await.get(kid) {
                            warn!("JWKS fetch failed, using stale cache: {}", e);
                            return Ok(key.clone());
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// Fetch the key set and replace the cached keys.
    pub async fn fetch_keys(&self) -> Result<(), JwksCacheError> {
        let jwks = self.idp.fetch_jwks().await.map_err(JwksCacheError::Fetch)?;

        let mut new_keys = HashMap::new();
        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                debug!("Skipping non-RSA key: {:?}", jwk.kty);
                continue;
            }
            if jwk.key_use.as_deref() == Some("enc") {
                debug!("Skipping encryption key");
                continue;
            }
            let Some(kid) = jwk.kid.clone() else {
                debug!("Skipping key without kid");
                continue;
            };

            match Self::jwk_to_decoding_key(&jwk) {
                Ok(key) => {
                    new_keys.insert(kid, key);
                }
                Err(e) => warn!("Failed to parse JWK {}: {}", kid, e),
            }
        }

        if new_keys.is_empty() {
            return Err(JwksCacheError::NoValidKeys);
        }

        debug!("Fetched {} signing keys", new_keys.len());
        *self.keys.write().await = new_keys;
        *self.last_fetch.write().await = Some(Instant::now());
        Ok(())
    }

    fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, JwksCacheError> {
        let n = jwk
            .n
            .as_ref()
            .ok_or_else(|| JwksCacheError::Parse("Missing 'n' in RSA key".to_string()))?;
        let e = jwk
            .e
            .as_ref()
            .ok_or_else(|| JwksCacheError::Parse("Missing 'e' in RSA key".to_string()))?;

        DecodingKey::from_rsa_components(n, e)
            .map_err(|e| JwksCacheError::Parse(format!("Invalid RSA components: {}", e)))
    }
}

/// Errors that can occur when working with the JWKS cache.
#[derive(Debug, Clone)]
pub enum JwksCacheError {
    /// The key set could not be fetched.
    Fetch(IdpError),
    /// A key in the set is malformed.
    Parse(String),
    /// The fetched set holds no usable signing key.
    NoValidKeys,
    /// No key matches the token's `kid`.
    KeyNotFound(String),
}

impl std::fmt::Display for JwksCacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "Failed to fetch JWKS: {}", e),
            Self::Parse(msg) => write!(f, "Failed to parse JWKS: {}", msg),
            Self::NoValidKeys => write!(f, "No valid keys found in JWKS"),
            Self::KeyNotFound(kid) => write!(f, "Key not found: {}", kid),
        }
    }
}

impl std::error::Error for JwksCacheError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TEST_KID, idp_config, jwks_json};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn cache_for(server: &MockServer, ttl: u64) -> JwksCache {
        let idp = IdentityProviderClient::new(idp_config(server)).unwrap();
        JwksCache::new(Arc::new(idp), ttl)
    }

    async fn mount_jwks(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json()))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn test_jwks_cache_error_display() {
        let err = JwksCacheError::KeyNotFound("key123".to_string());
        assert_eq!(err.to_string(), "Key not found: key123");
        assert_eq!(
            JwksCacheError::NoValidKeys.to_string(),
            "No valid keys found in JWKS"
        );
    }

    #[test]
    fn test_jwks_document_deserialization() {
        let doc: JwksDocument = serde_json::from_value(jwks_json()).unwrap();
        assert_eq!(doc.keys.len(), 1);
        assert_eq!(doc.keys[0].kid.as_deref(), Some(TEST_KID));
        assert_eq!(doc.keys[0].key_use.as_deref(), Some("sig"));
    }

    #[tokio::test]
    async fn test_zero_ttl_refetches_every_lookup() {
        let server = MockServer::start().await;
        mount_jwks(&server, 3).await;

        let cache = cache_for(&server, 0).await;
        for _ in 0..3 {
            cache.get_key(TEST_KID).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_positive_ttl_serves_from_cache() {
        let server = MockServer::start().await;
        mount_jwks(&server, 1).await;

        let cache = cache_for(&server, 600).await;
        for _ in 0..3 {
            cache.get_key(TEST_KID).await.unwrap();
        }
        assert_eq!(cache.keys.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_is_key_not_found() {
        let server = MockServer::start().await;
        mount_jwks(&server, 1).await;

        let cache = cache_for(&server, 0).await;
        match cache.get_key("rotated-away").await {
            Err(JwksCacheError::KeyNotFound(kid)) => assert_eq!(kid, "rotated-away"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_skips_unusable_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [
                    {"kty": "EC", "kid": "ec-key", "crv": "P-256"},
                    {"kty": "RSA", "kid": "enc-key", "use": "enc", "n": "AQAB", "e": "AQAB"}
                ]
            })))
            .mount(&server)
            .await;

        let cache = cache_for(&server, 0).await;
        assert!(matches!(
            cache.get_key("ec-key").await,
            Err(JwksCacheError::NoValidKeys)
        ));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = cache_for(&server, 0).await;
        assert!(matches!(
            cache.get_key(TEST_KID).await,
            Err(JwksCacheError::Fetch(IdpError::Status { status: 404, .. }))
        ));
    }
}
