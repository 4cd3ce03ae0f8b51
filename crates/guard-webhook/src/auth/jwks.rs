//! JWKS fetching and caching

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Deserialize;
use url::Url;

use super::error::{AuthError, Result};
use crate::helpers::build_http_client;

/// Minimum spacing between refreshes forced by an unknown `kid`
const MIN_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// JSON Web Key
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key ID
    #[serde(default)]
    pub kid: Option<String>,
    /// Key type (RSA, EC)
    pub kty: String,
    /// Algorithm
    #[serde(default)]
    pub alg: Option<String>,
    /// Key usage
    #[serde(default)]
    pub r#use: Option<String>,
    // RSA components
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    // EC components
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
}

/// JSON Web Key Set
#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

#[derive(Clone)]
struct JwkEntry {
    key: jsonwebtoken::DecodingKey,
    algorithm: jsonwebtoken::Algorithm,
}

impl std::fmt::Debug for JwkEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwkEntry")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct KeySet {
    named: HashMap<String, JwkEntry>,
    unnamed: Vec<JwkEntry>,
}

impl KeySet {
    fn find(&self, kid: Option<&str>, alg: jsonwebtoken::Algorithm) -> Option<jsonwebtoken::DecodingKey> {
        if let Some(kid) = kid {
            return self
                .named
                .get(kid)
                .filter(|entry| entry.algorithm == alg)
                .map(|entry| entry.key.clone());
        }

        self.unnamed
            .iter()
            .chain(self.named.values())
            .find(|entry| entry.algorithm == alg)
            .map(|entry| entry.key.clone())
    }

    fn len(&self) -> usize {
        self.named.len() + self.unnamed.len()
    }
}

/// Thread-safe JWKS cache
pub struct JwksCache {
    keys: RwLock<KeySet>,
    jwks_uri: Url,
    client: reqwest::Client,
    ttl: Duration,
    last_refresh: RwLock<Option<Instant>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("jwks_uri", &self.jwks_uri)
            .field("ttl", &self.ttl)
            .field("keys_count", &self.keys.read().len())
            .finish_non_exhaustive()
    }
}

impl JwksCache {
    pub fn new(jwks_uri: Url, ttl: Duration, timeout: Duration) -> Result<Self> {
        let client = build_http_client(timeout)
            .map_err(|e| AuthError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            keys: RwLock::new(KeySet::default()),
            jwks_uri,
            client,
            ttl,
            last_refresh: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub const fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    /// Get key for validation.
    ///
    /// An unknown `kid` triggers one refresh, since the issuer may have
    /// rotated keys since the last fetch.
    pub async fn get_key(
        &self,
        kid: Option<&str>,
        alg: jsonwebtoken::Algorithm,
    ) -> Result<jsonwebtoken::DecodingKey> {
        if self.needs_refresh() {
            self.refresh().await?;
        }

        if let Some(key) = self.keys.read().find(kid, alg) {
            return Ok(key);
        }

        if let Some(kid) = kid {
            if self.may_force_refresh() {
                tracing::debug!(kid, "Unknown key id, refreshing JWKS");
                self.refresh().await?;
                if let Some(key) = self.keys.read().find(Some(kid), alg) {
                    return Ok(key);
                }
            }
            return Err(AuthError::KeyNotFound(kid.to_string()));
        }

        Err(AuthError::NoMatchingKey)
    }

    /// Refresh JWKS from remote
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        tracing::debug!(jwks_uri = %self.jwks_uri, "Refreshing JWKS");

        let response = self
            .client
            .get(self.jwks_uri.clone())
            .send()
            .await
            .map_err(AuthError::JwksFetch)?;

        if !response.status().is_success() {
            return Err(AuthError::JwksParse(format!(
                "JWKS endpoint returned status {}",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::JwksParse(e.to_string()))?;

        let mut keys = KeySet::default();
        for jwk in jwks.keys {
            if let Some((key, algorithm)) = decode_jwk(&jwk)? {
                let entry = JwkEntry { key, algorithm };
                match &jwk.kid {
                    Some(kid) => {
                        keys.named.insert(kid.clone(), entry);
                    }
                    None => keys.unnamed.push(entry),
                }
            }
        }

        let count = keys.len();
        *self.keys.write() = keys;
        *self.last_refresh.write() = Some(Instant::now());

        tracing::info!(keys_count = count, "JWKS refreshed successfully");

        Ok(())
    }

    fn needs_refresh(&self) -> bool {
        self.last_refresh
            .read()
            .is_none_or(|t| t.elapsed() > self.ttl)
    }

    fn may_force_refresh(&self) -> bool {
        self.last_refresh
            .read()
            .is_none_or(|t| t.elapsed() >= MIN_FORCED_REFRESH_INTERVAL)
    }

    #[must_use]
    pub fn keys_count(&self) -> usize {
        self.keys.read().len()
    }
}

fn decode_jwk(jwk: &Jwk) -> Result<Option<(jsonwebtoken::DecodingKey, jsonwebtoken::Algorithm)>> {
    let alg = match jwk.alg.as_deref() {
        Some("RS256") => jsonwebtoken::Algorithm::RS256,
        Some("RS384") => jsonwebtoken::Algorithm::RS384,
        Some("RS512") => jsonwebtoken::Algorithm::RS512,
        Some("ES256") => jsonwebtoken::Algorithm::ES256,
        Some("ES384") => jsonwebtoken::Algorithm::ES384,
        // Azure AD publishes RSA keys without `alg`
        None => match jwk.kty.as_str() {
            "RSA" => jsonwebtoken::Algorithm::RS256,
            "EC" => match jwk.crv.as_deref() {
                Some("P-256") => jsonwebtoken::Algorithm::ES256,
                Some("P-384") => jsonwebtoken::Algorithm::ES384,
                _ => return Ok(None),
            },
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };

    let key = match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk
                .n
                .as_ref()
                .ok_or_else(|| AuthError::JwksParse("Missing 'n' in RSA key".into()))?;
            let e = jwk
                .e
                .as_ref()
                .ok_or_else(|| AuthError::JwksParse("Missing 'e' in RSA key".into()))?;
            jsonwebtoken::DecodingKey::from_rsa_components(n, e)
                .map_err(|e| AuthError::JwksParse(format!("Invalid RSA components: {e}")))?
        }
        "EC" => {
            let x = jwk
                .x
                .as_ref()
                .ok_or_else(|| AuthError::JwksParse("Missing 'x' in EC key".into()))?;
            let y = jwk
                .y
                .as_ref()
                .ok_or_else(|| AuthError::JwksParse("Missing 'y' in EC key".into()))?;
            jsonwebtoken::DecodingKey::from_ec_components(x, y)
                .map_err(|e| AuthError::JwksParse(format!("Invalid EC components: {e}")))?
        }
        other => {
            tracing::debug!(kty = other, "Skipping unsupported key type");
            return Ok(None);
        }
    };

    Ok(Some((key, alg)))
}

/// Background JWKS refresh task builder
pub struct JwksRefreshTask {
    cache: Arc<JwksCache>,
    interval: Duration,
}

impl std::fmt::Debug for JwksRefreshTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksRefreshTask")
            .field("cache", &self.cache)
            .field("interval", &self.interval)
            .finish()
    }
}

impl JwksRefreshTask {
    #[must_use]
    pub const fn new(cache: Arc<JwksCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    pub fn spawn(
        self,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; keys were fetched at startup
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.cache.refresh().await {
                            tracing::warn!(error = %e, "Background JWKS refresh failed");
                        }
                    }
                    () = shutdown.cancelled() => {
                        tracing::debug!("JWKS refresh task shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    // P-256 public point, base64url without padding
    const EC_X: &str = "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU";
    const EC_Y: &str = "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0";

    fn ec_jwks() -> serde_json::Value {
        serde_json::json!({
            "keys": [
                { "kid": "ec-key", "kty": "EC", "crv": "P-256", "x": EC_X, "y": EC_Y },
                { "kid": "oct-key", "kty": "oct", "alg": "HS256", "k": "c2VjcmV0" }
            ]
        })
    }

    fn cache(uri: &str) -> JwksCache {
        JwksCache::new(
            Url::parse(uri).unwrap(),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_jwk_set_deserialize() {
        let json = r#"{
            "keys": [
                {
                    "kid": "key1",
                    "kty": "RSA",
                    "use": "sig",
                    "n": "test_n",
                    "e": "AQAB"
                }
            ]
        }"#;
        let jwks: JwkSet = serde_json::from_str(json).unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, Some("key1".to_string()));
        assert_eq!(jwks.keys[0].r#use.as_deref(), Some("sig"));
        assert!(jwks.keys[0].alg.is_none());
    }

    #[test]
    fn test_decode_jwk_skips_unsupported() {
        let jwk = Jwk {
            kid: None,
            kty: "oct".to_string(),
            alg: Some("HS256".to_string()),
            r#use: None,
            n: None,
            e: None,
            crv: None,
            x: None,
            y: None,
        };
        assert!(decode_jwk(&jwk).unwrap().is_none());
    }

    #[test]
    fn test_decode_jwk_rsa_missing_modulus() {
        let jwk = Jwk {
            kid: Some("k".to_string()),
            kty: "RSA".to_string(),
            alg: None,
            r#use: None,
            n: None,
            e: Some("AQAB".to_string()),
            crv: None,
            x: None,
            y: None,
        };
        assert!(matches!(decode_jwk(&jwk), Err(AuthError::JwksParse(_))));
    }

    #[tokio::test]
    async fn test_needs_refresh_initially() {
        let cache = cache("https://example.com/discovery/v2.0/keys");
        assert!(cache.needs_refresh());
        assert!(cache.may_force_refresh());
        assert_eq!(cache.keys_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_and_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discovery/v2.0/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ec_jwks()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache(&format!("{}/discovery/v2.0/keys", server.uri()));

        let key = cache
            .get_key(Some("ec-key"), jsonwebtoken::Algorithm::ES256)
            .await;
        assert!(key.is_ok());
        assert_eq!(cache.keys_count(), 1);
        assert!(!cache.needs_refresh());

        // Lookup without kid matches by algorithm
        assert!(
            cache
                .get_key(None, jsonwebtoken::Algorithm::ES256)
                .await
                .is_ok()
        );
        assert!(matches!(
            cache.get_key(None, jsonwebtoken::Algorithm::RS256).await,
            Err(AuthError::NoMatchingKey)
        ));
    }

    #[tokio::test]
    async fn test_unknown_kid_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ec_jwks()))
            .mount(&server)
            .await;

        let cache = cache(&format!("{}/keys", server.uri()));

        let result = cache
            .get_key(Some("rotated"), jsonwebtoken::Algorithm::ES256)
            .await;
        assert!(matches!(result, Err(AuthError::KeyNotFound(kid)) if kid == "rotated"));
    }

    #[tokio::test]
    async fn test_refresh_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let cache = cache(&format!("{}/keys", server.uri()));
        assert!(matches!(
            cache.refresh().await,
            Err(AuthError::JwksParse(_))
        ));
        assert!(cache.needs_refresh());
    }

    #[tokio::test]
    async fn test_refresh_task_stops_on_cancel() {
        let cache = Arc::new(cache("https://example.com/keys"));
        let shutdown = tokio_util::sync::CancellationToken::new();

        let handle = JwksRefreshTask::new(cache, Duration::from_secs(3600)).spawn(shutdown.clone());
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
