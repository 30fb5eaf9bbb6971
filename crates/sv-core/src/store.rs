//! Client-side contract for the ciphertext store.
//!
//! Every call is implicitly scoped to the caller's identity: the transport
//! (bearer token over HTTP, or an owner-bound handle in-process) decides whose
//! records are visible. Implementations never see plaintext.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VaultResult;
use crate::types::{CipherEnvelope, RecordId, WireRecord};

/// Client-generated token naming one logical mutation. Retrying a request with
/// the same key must not apply it twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(pub String);

impl IdempotencyKey {
    pub fn generate() -> Self {
        IdempotencyKey(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// HTTP header carrying the idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[async_trait]
pub trait VaultStore: Send + Sync {
    /// All envelopes owned by the caller, in no particular order.
    async fn list(&self) -> VaultResult<Vec<WireRecord>>;

    async fn create(
        &self,
        envelope: &CipherEnvelope,
        key: &IdempotencyKey,
    ) -> VaultResult<WireRecord>;

    /// Full replace. `NotFound` if `id` is absent or not owned by the caller.
    async fn replace(
        &self,
        id: &RecordId,
        envelope: &CipherEnvelope,
        key: &IdempotencyKey,
    ) -> VaultResult<WireRecord>;

    /// `NotFound` if `id` is absent or not owned by the caller.
    async fn delete(&self, id: &RecordId, key: &IdempotencyKey) -> VaultResult<()>;
}

#[async_trait]
impl<T: VaultStore + ?Sized> VaultStore for Arc<T> {
    async fn list(&self) -> VaultResult<Vec<WireRecord>> {
        (**self).list().await
    }

    async fn create(
        &self,
        envelope: &CipherEnvelope,
        key: &IdempotencyKey,
    ) -> VaultResult<WireRecord> {
        (**self).create(envelope, key).await
    }

    async fn replace(
        &self,
        id: &RecordId,
        envelope: &CipherEnvelope,
        key: &IdempotencyKey,
    ) -> VaultResult<WireRecord> {
        (**self).replace(id, envelope, key).await
    }

    async fn delete(&self, id: &RecordId, key: &IdempotencyKey) -> VaultResult<()> {
        (**self).delete(id, key).await
    }
}
