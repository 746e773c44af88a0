use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, Principal, TokenVerifier};

const JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const KEY_TTL: Duration = Duration::from_secs(60 * 60);
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
}

#[derive(Default)]
struct KeyCache {
    set: Option<JwkSet>,
    fetched_at: Option<Instant>,
    last_attempt: Option<Instant>,
}

impl KeyCache {
    fn lookup(&self, kid: &str, allow_stale: bool) -> Option<DecodingKey> {
        let fresh = self
            .fetched_at
            .is_some_and(|fetched| fetched.elapsed() <= KEY_TTL);
        if !fresh && !allow_stale {
            return None;
        }
        let jwk = self.set.as_ref()?.find(kid)?;
        DecodingKey::from_jwk(jwk).ok()
    }

    fn refresh_allowed(&self) -> bool {
        self.last_attempt
            .is_none_or(|attempt| attempt.elapsed() >= MIN_REFRESH_INTERVAL)
    }

    fn throttled_miss(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(key) = self.lookup(kid, true) {
            return Ok(key);
        }
        match self.set {
            Some(_) => Err(AuthError::Rejected(format!("unknown signing key {kid}"))),
            None => Err(AuthError::KeyFetch(
                "signing keys unavailable, retry pending".to_string(),
            )),
        }
    }
}

/// Verifies Firebase ID tokens (RS256) against Google's published signing keys.
/// Keys are refetched at most once per `MIN_REFRESH_INTERVAL`, by one task.
pub struct FirebaseVerifier {
    project_id: String,
    client: reqwest::Client,
    jwks_url: String,
    keys: RwLock<KeyCache>,
}

impl FirebaseVerifier {
    pub fn new(project_id: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            project_id: project_id.into(),
            client,
            jwks_url: JWKS_URL.to_string(),
            keys: RwLock::new(KeyCache::default()),
        }
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    async fn fetch_keys(&self) -> Result<JwkSet, AuthError> {
        self.client
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|err| AuthError::KeyFetch(err.to_string()))?
            .json::<JwkSet>()
            .await
            .map_err(|err| AuthError::KeyFetch(err.to_string()))
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cache = self.keys.read().await;
            if let Some(key) = cache.lookup(kid, false) {
                return Ok(key);
            }
            if !cache.refresh_allowed() {
                return cache.throttled_miss(kid);
            }
        }

        let mut cache = self.keys.write().await;
        // Another task may have refreshed while this one waited for the lock.
        if let Some(key) = cache.lookup(kid, false) {
            return Ok(key);
        }
        if !cache.refresh_allowed() {
            return cache.throttled_miss(kid);
        }

        debug!(kid, "signing key not cached, refreshing");
        cache.last_attempt = Some(Instant::now());
        match self.fetch_keys().await {
            Ok(set) => {
                info!(keys = set.keys.len(), "refreshed firebase signing keys");
                cache.set = Some(set);
                cache.fetched_at = Some(Instant::now());
            }
            Err(err) => {
                warn!(error = %err, "firebase signing key refresh failed");
                return cache.throttled_miss(kid).or(Err(err));
            }
        }

        cache
            .lookup(kid, false)
            .ok_or_else(|| AuthError::Rejected(format!("unknown signing key {kid}")))
    }
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let header = decode_header(token).map_err(|err| AuthError::Rejected(err.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::Rejected(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::Rejected("token has no key id".to_string()))?;

        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[self.issuer()]);

        let data = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|err| AuthError::Rejected(err.to_string()))?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::Rejected("token has empty subject".to_string()));
        }

        Ok(Principal {
            uid: data.claims.sub,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use jsonwebtoken::jwk::JwkSet;

    use super::{FirebaseVerifier, KeyCache};
    use crate::auth::{AuthError, TokenVerifier};

    // Nothing listens on the discard port, so any fetch fails fast with KeyFetch.
    const UNREACHABLE_JWKS: &str = "http://127.0.0.1:9/jwks";

    fn verifier(cache: KeyCache) -> FirebaseVerifier {
        let mut verifier = FirebaseVerifier::new("demo-project", reqwest::Client::new());
        verifier.jwks_url = UNREACHABLE_JWKS.to_string();
        verifier.keys = tokio::sync::RwLock::new(cache);
        verifier
    }

    fn token_with_kid(kid: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(format!(r#"{{"alg":"RS256","kid":"{kid}"}}"#));
        format!("{header}.e30.c2ln")
    }

    #[tokio::test]
    async fn garbage_is_rejected_before_any_key_fetch() {
        let verifier = verifier(KeyCache::default());
        let err = verifier.verify("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
        assert!(verifier.keys.read().await.last_attempt.is_none());
    }

    #[test]
    fn issuer_is_derived_from_project() {
        let verifier = FirebaseVerifier::new("demo-project", reqwest::Client::new());
        assert_eq!(verifier.issuer(), "https://securetoken.google.com/demo-project");
    }

    #[tokio::test]
    async fn unknown_kid_on_recently_refreshed_cache_is_rejected_without_fetch() {
        let refreshed = Instant::now();
        let verifier = verifier(KeyCache {
            set: Some(JwkSet { keys: Vec::new() }),
            fetched_at: Some(refreshed),
            last_attempt: Some(refreshed),
        });

        for kid in ["forged-1", "forged-2", "forged-3"] {
            let err = verifier.verify(&token_with_kid(kid)).await.unwrap_err();
            assert!(matches!(err, AuthError::Rejected(_)), "{err:?}");
        }
        assert_eq!(verifier.keys.read().await.last_attempt, Some(refreshed));
    }

    #[tokio::test]
    async fn failed_refresh_is_not_retried_within_interval() {
        let verifier = verifier(KeyCache::default());

        let first = verifier.verify(&token_with_kid("kid-a")).await.unwrap_err();
        assert!(matches!(first, AuthError::KeyFetch(_)));
        let attempted = verifier.keys.read().await.last_attempt;
        assert!(attempted.is_some());

        let second = verifier.verify(&token_with_kid("kid-b")).await.unwrap_err();
        assert!(matches!(second, AuthError::KeyFetch(_)));
        assert_eq!(verifier.keys.read().await.last_attempt, attempted);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_refresh_attempt() {
        let verifier = std::sync::Arc::new(verifier(KeyCache::default()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let verifier = verifier.clone();
                tokio::spawn(async move { verifier.verify(&token_with_kid(&format!("kid-{i}"))).await })
            })
            .collect();
        let mut attempts = Vec::new();
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
            attempts.push(verifier.keys.read().await.last_attempt);
        }

        let first = attempts[0];
        assert!(first.is_some());
        assert!(attempts.iter().all(|attempt| *attempt == first));
    }
}
