//! [`VaultStore`] over the vault HTTP API.
//!
//! Bearer-token auth on every request; mutations carry the idempotency key in
//! the `Idempotency-Key` header. Status mapping:
//!   - transport error / timeout → `Network`
//!   - 404 → `NotFound`
//!   - 401, 403 → `Unauthorized`
//!   - any other non-2xx → `Server { status, message }`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;

use sv_core::config::{expand_home, ClientConfig};
use sv_core::{
    CipherEnvelope, IdempotencyKey, MessageBody, RecordId, VaultError, VaultResult, VaultStore,
    WireRecord, IDEMPOTENCY_HEADER,
};

pub struct HttpVaultStore {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl std::fmt::Debug for HttpVaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVaultStore")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl HttpVaultStore {
    /// `base_url` is the API root, e.g. `http://localhost:5000/api`.
    pub fn new(
        base_url: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> VaultResult<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(cfg: &ClientConfig) -> VaultResult<Self> {
        let token = load_token(cfg)?;
        Self::new(
            cfg.server_url.clone(),
            token,
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        self.client
            .request(method, url)
            .bearer_auth(self.token.expose_secret())
    }

    async fn send(&self, req: RequestBuilder) -> VaultResult<Response> {
        let resp = req
            .send()
            .await
            .map_err(|e| VaultError::Network(e.to_string()))?;

        debug!(status = resp.status().as_u16(), url = %resp.url(), "vault api response");
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(api_error(resp).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> VaultResult<T> {
        let resp = self.send(req).await?;
        let status = resp.status().as_u16();
        resp.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                VaultError::Server {
                    status,
                    message: format!("unexpected response body: {e}"),
                }
            } else {
                VaultError::Network(e.to_string())
            }
        })
    }
}

/// Resolve the identity token: inline `token` first, then `token_file`.
pub fn load_token(cfg: &ClientConfig) -> VaultResult<SecretString> {
    if let Some(token) = &cfg.token {
        return Ok(SecretString::from(token.clone()));
    }
    if let Some(path) = &cfg.token_file {
        let path = expand_home(path);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            VaultError::Unauthorized(format!("reading token file {}: {e}", path.display()))
        })?;
        let token = content.trim();
        if token.is_empty() {
            return Err(VaultError::Unauthorized(format!(
                "token file {} is empty",
                path.display()
            )));
        }
        return Ok(SecretString::from(token.to_string()));
    }
    Err(VaultError::Unauthorized(
        "no identity token configured (set client.token or client.token_file)".into(),
    ))
}

/// Map a non-2xx response to the error taxonomy, reading `{ message }` when
/// the server sent one.
async fn api_error(resp: Response) -> VaultError {
    let status = resp.status();
    let message = resp
        .json::<MessageBody>()
        .await
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    match status {
        StatusCode::NOT_FOUND => VaultError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VaultError::Unauthorized(message),
        _ => VaultError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl VaultStore for HttpVaultStore {
    async fn list(&self) -> VaultResult<Vec<WireRecord>> {
        self.send_json(self.request(Method::GET, "/vault")).await
    }

    async fn create(
        &self,
        envelope: &CipherEnvelope,
        key: &IdempotencyKey,
    ) -> VaultResult<WireRecord> {
        let req = self
            .request(Method::POST, "/vault")
            .header(IDEMPOTENCY_HEADER, key.as_str())
            .json(envelope);
        self.send_json(req).await
    }

    async fn replace(
        &self,
        id: &RecordId,
        envelope: &CipherEnvelope,
        key: &IdempotencyKey,
    ) -> VaultResult<WireRecord> {
        let req = self
            .request(Method::PUT, &format!("/vault/{id}"))
            .header(IDEMPOTENCY_HEADER, key.as_str())
            .json(envelope);
        self.send_json(req).await
    }

    async fn delete(&self, id: &RecordId, key: &IdempotencyKey) -> VaultResult<()> {
        let req = self
            .request(Method::DELETE, &format!("/vault/{id}"))
            .header(IDEMPOTENCY_HEADER, key.as_str());
        let _: MessageBody = self.send_json(req).await?;
        Ok(())
    }
}
