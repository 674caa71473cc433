//! RS256 JWT verification against a JWKS endpoint.
//!
//! Keys are cached by `kid`. The cache refreshes when it is older than the
//! configured refresh interval (key rotation) and on unknown kids, the
//! latter bounded by the minimum refresh interval so a flood of bad tokens
//! cannot stampede the JWKS endpoint.

use std::collections::HashMap;
use std::time::Instant;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::JwtConfig;

#[derive(Debug, thiserror::Error)]
#[error("unauthorized")]
pub struct Unauthorized;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kty: String,
    #[serde(default)]
    kid: String,
    #[serde(default)]
    n: String,
    #[serde(default)]
    e: String,
}

#[derive(Default)]
struct KeyCache {
    keys_by_kid: HashMap<String, DecodingKey>,
    last_refresh: Option<Instant>,
}

pub struct JwtVerifier {
    cfg: JwtConfig,
    http: reqwest::Client,
    cache: Mutex<KeyCache>,
}

impl JwtVerifier {
    pub fn new(cfg: JwtConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .unwrap_or_default();
        Self {
            cfg,
            http,
            cache: Mutex::new(KeyCache::default()),
        }
    }

    /// Verify a token and return the authenticated subject (`sub` claim).
    ///
    /// Checks: RS256 with a known `kid`, signature, `iss`, `aud`, `exp` and
    /// `nbf` with the configured clock skew.
    pub async fn verify(&self, token: &str) -> Result<String, Unauthorized> {
        let header = decode_header(token).map_err(|_| Unauthorized)?;
        if header.alg != Algorithm::RS256 {
            return Err(Unauthorized);
        }
        let kid = header.kid.filter(|k| !k.is_empty()).ok_or(Unauthorized)?;

        let key = self.key_for(&kid).await.ok_or(Unauthorized)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.cfg.issuer]);
        validation.set_audience(&[&self.cfg.audience]);
        validation.leeway = self.cfg.clock_skew.as_secs();
        validation.validate_nbf = true;

        let data = decode::<Claims>(token, &key, &validation).map_err(|_| Unauthorized)?;
        if data.claims.sub.is_empty() {
            return Err(Unauthorized);
        }
        Ok(data.claims.sub)
    }

    /// Refresh rules: refresh periodically for rotation even when the kid is
    /// cached, and on unknown kids bounded by the minimum refresh interval.
    async fn key_for(&self, kid: &str) -> Option<DecodingKey> {
        let mut cache = self.cache.lock().await;
        let now = Instant::now();
        let age = |since: Instant| now.saturating_duration_since(since);

        let stale = cache
            .last_refresh
            .map_or(true, |t| age(t) >= self.cfg.jwks_refresh_interval);
        let unknown_kid = !cache.keys_by_kid.contains_key(kid);
        let refresh_allowed = cache
            .last_refresh
            .map_or(true, |t| age(t) >= self.cfg.jwks_min_refresh_interval);

        if stale || (unknown_kid && refresh_allowed) {
            match self.fetch_keys().await {
                Ok(keys) => {
                    cache.keys_by_kid = keys;
                    cache.last_refresh = Some(now);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "jwks refresh failed");
                    cache.last_refresh = Some(now);
                }
            }
        }
        cache.keys_by_kid.get(kid).cloned()
    }

    async fn fetch_keys(&self) -> Result<HashMap<String, DecodingKey>, reqwest::Error> {
        let doc: JwksDocument = self
            .http
            .get(self.cfg.jwks_url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut keys = HashMap::new();
        for jwk in doc.keys {
            if jwk.kty != "RSA" || jwk.kid.is_empty() {
                continue;
            }
            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(err) => {
                    tracing::warn!(kid = %jwk.kid, error = %err, "skipping unusable jwk");
                }
            }
        }
        Ok(keys)
    }
}
