//! Bearer token → owner id resolution.
//!
//! Identity is issued elsewhere; this server only needs to know which owner a
//! token stands for. [`StaticTokenGate`] reads the table from `[server.tokens]`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use sv_core::config::ServerConfig;
use sv_core::VaultResult;

use crate::api::AppState;
use crate::error::ApiError;

#[async_trait]
pub trait TokenGate: Send + Sync {
    /// Owner id for `token`, or `None` if the token is not recognised.
    async fn owner_for(&self, token: &str) -> VaultResult<Option<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticTokenGate {
    tokens: BTreeMap<String, String>,
}

impl StaticTokenGate {
    pub fn new(tokens: BTreeMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn from_config(cfg: &ServerConfig) -> Self {
        Self::new(cfg.tokens.clone())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenGate for StaticTokenGate {
    async fn owner_for(&self, token: &str) -> VaultResult<Option<String>> {
        Ok(self.tokens.get(token).cloned())
    }
}

/// `Authorization: Bearer <token>`; scheme is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// The authenticated caller. Extracting it rejects the request with 401 when
/// the token is missing or unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl FromRequestParts<AppState> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = bearer_token(&parts.headers)
            .ok_or(ApiError::Unauthorized("No token, authorization denied"))?;
        match state.gate.owner_for(token).await? {
            Some(owner) => Ok(Owner(owner)),
            None => Err(ApiError::Unauthorized("Token is not valid")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&headers("abc")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_static_gate() {
        let gate =
            StaticTokenGate::new(BTreeMap::from([("tok-a".to_string(), "alice".to_string())]));
        assert_eq!(gate.owner_for("tok-a").await.unwrap().as_deref(), Some("alice"));
        assert_eq!(gate.owner_for("tok-b").await.unwrap(), None);
        assert_eq!(gate.len(), 1);
    }
}
