//! Owner-scoped envelope store.
//!
//! Holds `(id, owner, encryptedData, iv, timestamps)` tuples and nothing else.
//! Every lookup is by id *and* owner; a record owned by someone else is
//! reported exactly like a missing one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use sv_core::{
    CipherEnvelope, IdempotencyKey, RecordId, VaultEnvelopeRecord, VaultError, VaultResult,
    VaultStore, WireRecord,
};

use crate::persist;
use crate::replay::{Outcome, ReplayCache, DEFAULT_CAPACITY};

#[derive(Debug)]
struct Inner {
    records: HashMap<RecordId, VaultEnvelopeRecord>,
    replay: ReplayCache,
}

#[derive(Debug)]
pub struct EnvelopeStore {
    inner: RwLock<Inner>,
    data_file: Option<PathBuf>,
}

/// Undo information for a mutation whose flush failed.
enum Undo {
    Remove(RecordId),
    Restore(VaultEnvelopeRecord),
}

fn key_reused() -> VaultError {
    VaultError::Server {
        status: 422,
        message: "idempotency key reused for a different request".into(),
    }
}

impl EnvelopeStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::with_records(Vec::new(), None)
    }

    /// Load from (or start) a JSON data file. Every mutation is flushed back.
    pub fn open(data_file: &Path) -> VaultResult<Self> {
        let records = persist::load(data_file)?;
        info!(
            path = %data_file.display(),
            records = records.len(),
            "opened envelope store"
        );
        Ok(Self::with_records(records, Some(data_file.to_path_buf())))
    }

    fn with_records(records: Vec<VaultEnvelopeRecord>, data_file: Option<PathBuf>) -> Self {
        let records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            inner: RwLock::new(Inner {
                records,
                replay: ReplayCache::new(DEFAULT_CAPACITY),
            }),
            data_file,
        }
    }

    pub fn data_file(&self) -> Option<&Path> {
        self.data_file.as_deref()
    }

    /// Total number of stored envelopes across all owners.
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Handle that acts as `owner` for every call.
    pub fn scoped(self: &Arc<Self>, owner: impl Into<String>) -> ScopedStore {
        ScopedStore {
            store: Arc::clone(self),
            owner: owner.into(),
        }
    }

    /// Envelopes owned by `owner`, most recently updated first.
    pub async fn list_by_owner(&self, owner: &str) -> Vec<WireRecord> {
        let inner = self.inner.read().await;
        let mut records: Vec<WireRecord> = inner
            .records
            .values()
            .filter(|r| r.owner_id == owner)
            .map(WireRecord::from)
            .collect();
        records.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    pub async fn create(
        &self,
        owner: &str,
        envelope: CipherEnvelope,
        key: Option<&IdempotencyKey>,
    ) -> VaultResult<WireRecord> {
        let mut inner = self.inner.write().await;

        if let Some(key) = key {
            match inner.replay.get(owner, key) {
                Some(Outcome::Created(rec)) => {
                    debug!(owner, id = %rec.id, "replaying create");
                    return Ok(rec.clone());
                }
                Some(_) => return Err(key_reused()),
                None => {}
            }
        }

        let now = Utc::now();
        let record = VaultEnvelopeRecord {
            id: RecordId::generate(),
            owner_id: owner.to_string(),
            envelope,
            created_at: now,
            updated_at: now,
        };
        let id = record.id.clone();
        let wire = WireRecord::from(&record);
        inner.records.insert(id.clone(), record);

        self.commit(&mut inner, Undo::Remove(id.clone())).await?;
        if let Some(key) = key {
            inner
                .replay
                .remember(owner, key, Outcome::Created(wire.clone()));
        }
        debug!(owner, %id, replay_entries = inner.replay.len(), "created envelope");
        Ok(wire)
    }

    /// Full replace of an owned envelope. `created_at` is preserved.
    pub async fn replace(
        &self,
        owner: &str,
        id: &RecordId,
        envelope: CipherEnvelope,
        key: Option<&IdempotencyKey>,
    ) -> VaultResult<WireRecord> {
        let mut inner = self.inner.write().await;

        if let Some(key) = key {
            match inner.replay.get(owner, key) {
                Some(Outcome::Replaced(rec)) if &rec.id == id => {
                    debug!(owner, %id, "replaying replace");
                    return Ok(rec.clone());
                }
                Some(_) => return Err(key_reused()),
                None => {}
            }
        }

        let existing = match inner.records.get_mut(id) {
            Some(r) if r.owner_id == owner => r,
            _ => return Err(VaultError::NotFound),
        };
        let previous = existing.clone();
        existing.envelope = envelope;
        existing.updated_at = Utc::now().max(previous.updated_at);
        let wire = WireRecord::from(&*existing);

        self.commit(&mut inner, Undo::Restore(previous)).await?;
        if let Some(key) = key {
            inner
                .replay
                .remember(owner, key, Outcome::Replaced(wire.clone()));
        }
        debug!(owner, %id, replay_entries = inner.replay.len(), "replaced envelope");
        Ok(wire)
    }

    pub async fn delete(
        &self,
        owner: &str,
        id: &RecordId,
        key: Option<&IdempotencyKey>,
    ) -> VaultResult<()> {
        let mut inner = self.inner.write().await;

        if let Some(key) = key {
            match inner.replay.get(owner, key) {
                Some(Outcome::Deleted(deleted)) if deleted == id => {
                    debug!(owner, %id, "replaying delete");
                    return Ok(());
                }
                Some(_) => return Err(key_reused()),
                None => {}
            }
        }

        let owned = inner
            .records
            .get(id)
            .is_some_and(|r| r.owner_id == owner);
        if !owned {
            return Err(VaultError::NotFound);
        }
        let Some(previous) = inner.records.remove(id) else {
            return Err(VaultError::NotFound);
        };

        self.commit(&mut inner, Undo::Restore(previous)).await?;
        if let Some(key) = key {
            inner
                .replay
                .remember(owner, key, Outcome::Deleted(id.clone()));
        }
        debug!(owner, %id, replay_entries = inner.replay.len(), "deleted envelope");
        Ok(())
    }

    /// Flush to the data file if there is one; roll the mutation back on failure.
    async fn commit(&self, inner: &mut Inner, undo: Undo) -> VaultResult<()> {
        let Some(path) = &self.data_file else {
            return Ok(());
        };

        if let Err(e) = persist::flush(path, inner.records.values()).await {
            error!(path = %path.display(), "flushing data file failed: {e:#}");
            match undo {
                Undo::Remove(id) => {
                    inner.records.remove(&id);
                }
                Undo::Restore(prev) => {
                    inner.records.insert(prev.id.clone(), prev);
                }
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// [`EnvelopeStore`] bound to one owner: the in-process counterpart of an
/// authenticated HTTP session.
#[derive(Debug, Clone)]
pub struct ScopedStore {
    store: Arc<EnvelopeStore>,
    owner: String,
}

impl ScopedStore {
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[async_trait]
impl VaultStore for ScopedStore {
    async fn list(&self) -> VaultResult<Vec<WireRecord>> {
        Ok(self.store.list_by_owner(&self.owner).await)
    }

    async fn create(
        &self,
        envelope: &CipherEnvelope,
        key: &IdempotencyKey,
    ) -> VaultResult<WireRecord> {
        self.store
            .create(&self.owner, envelope.clone(), Some(key))
            .await
    }

    async fn replace(
        &self,
        id: &RecordId,
        envelope: &CipherEnvelope,
        key: &IdempotencyKey,
    ) -> VaultResult<WireRecord> {
        self.store
            .replace(&self.owner, id, envelope.clone(), Some(key))
            .await
    }

    async fn delete(&self, id: &RecordId, key: &IdempotencyKey) -> VaultResult<()> {
        self.store.delete(&self.owner, id, Some(key)).await
    }
}
