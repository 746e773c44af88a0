pub mod firebase;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use thiserror::Error;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

pub use firebase::FirebaseVerifier;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("signing keys unavailable: {0}")]
    KeyFetch(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Rejected(_) => AppError::Forbidden("invalid or expired token".to_string()),
            AuthError::KeyFetch(msg) => AppError::Upstream(format!("token verification unavailable: {msg}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub uid: String,
}

/// Exchanges a bearer token for the identity it was issued to.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Fixed token table, for local runs and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticVerifier {
    tokens: HashMap<String, String>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, uid: &str) -> Self {
        self.tokens.insert(token.to_string(), uid.to_string());
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens
            .get(token)
            .map(|uid| Principal { uid: uid.clone() })
            .ok_or_else(|| AuthError::Rejected("unknown token".to_string()))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        match state.verifier.verify(token).await {
            Ok(principal) => Ok(AuthUser { uid: principal.uid }),
            Err(err) => {
                warn!(error = %err, "token verification failed");
                state.metrics.auth_failures_total.inc();
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header::AUTHORIZATION;
    use axum::http::{HeaderMap, HeaderValue};

    use super::{bearer_token, StaticVerifier, TokenVerifier};

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer   ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn static_verifier_resolves_known_tokens_only() {
        let verifier = StaticVerifier::new().with_token("tok-1", "uid-1");
        assert_eq!(verifier.verify("tok-1").await.unwrap().uid, "uid-1");
        assert!(verifier.verify("tok-2").await.is_err());
    }
}
