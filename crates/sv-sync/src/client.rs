//! Vault sync client: decrypt on the way in, encrypt on the way out.
//!
//! The client owns a plaintext cache of the caller's records and drives each
//! one through the record state machine:
//!
//! ```text
//! Draft ──save──► Synced ──edit──► Dirty ──save──► Synced
//!                    │                │
//!                    └────delete──────┴──► Deleted (terminal)
//! ```
//!
//! Listings may lag behind the client's own writes. Until the server catches
//! up, three kinds of local knowledge win over a stale listing:
//!   - a cached entry whose `updated_at` is newer than the listed one
//!   - an entry with local edits that have not been saved yet
//!   - a tombstone for a record this client deleted
//!
//! A record this client created survives one listing that does not show it
//! yet. After that an absent record is treated as deleted elsewhere.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use sv_core::{
    IdempotencyKey, RecordEvent, RecordId, RecordState, VaultError, VaultRecord, VaultResult,
    VaultStore, WireRecord,
};
use sv_crypto::{decrypt_record, encrypt_record, EncryptionKey};

use crate::retry::with_retry;

/// Default number of extra attempts after a network failure.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Listings a fresh create may be missing from before it is dropped.
const UNLISTED_GRACE: u8 = 1;

#[derive(Debug, Clone)]
struct CacheEntry {
    record: VaultRecord,
    state: RecordState,
    updated_at: DateTime<Utc>,
    /// Remaining listings this entry may be absent from (fresh creates only)
    unlisted_grace: u8,
}

/// A record that could not be opened during [`VaultSyncClient::list_all`].
#[derive(Debug)]
pub struct RecordFailure {
    pub id: RecordId,
    pub error: VaultError,
}

#[derive(Debug, Default)]
pub struct ListOutcome {
    /// Successfully decrypted records, most recently updated first
    pub records: Vec<VaultRecord>,
    /// Envelopes that failed authentication or did not parse
    pub failures: Vec<RecordFailure>,
}

pub struct VaultSyncClient<S> {
    store: S,
    key: Arc<EncryptionKey>,
    cache: BTreeMap<RecordId, CacheEntry>,
    tombstones: HashSet<RecordId>,
    max_retries: u32,
}

impl<S: VaultStore> VaultSyncClient<S> {
    pub fn new(store: S, key: Arc<EncryptionKey>) -> Self {
        Self {
            store,
            key,
            cache: BTreeMap::new(),
            tombstones: HashSet::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch every envelope the caller owns and decrypt each one on its own.
    ///
    /// A record that fails to decrypt is reported in `failures` and left out;
    /// it never fails the whole listing. Transport and other errors do.
    pub async fn list_all(&mut self) -> VaultResult<ListOutcome> {
        let listing = with_retry("list", self.max_retries, || self.store.list()).await?;

        let mut failures = Vec::new();
        let mut listed: HashSet<RecordId> = HashSet::with_capacity(listing.len());

        for wire in listing {
            listed.insert(wire.id.clone());
            if self.tombstones.contains(&wire.id) {
                debug!(id = %wire.id, "listing still shows a deleted record; hiding it");
                continue;
            }
            match self.absorb(wire.clone()) {
                Ok(()) => {}
                Err(error) if error.is_record_local() => {
                    warn!(id = %wire.id, "skipping record that failed to decrypt: {error}");
                    failures.push(RecordFailure { id: wire.id, error });
                }
                Err(error) => return Err(error),
            }
        }

        // A tombstone is no longer needed once the listing stops showing it.
        self.tombstones.retain(|id| listed.contains(id));

        self.cache.retain(|id, entry| {
            if listed.contains(id) || entry.state == RecordState::Dirty {
                return true;
            }
            if entry.unlisted_grace > 0 {
                entry.unlisted_grace -= 1;
                debug!(%id, "fresh record not listed yet; keeping it");
                return true;
            }
            false
        });

        let mut entries: Vec<&CacheEntry> = self
            .cache
            .values()
            .filter(|e| e.state != RecordState::Deleted)
            .collect();
        entries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        let records: Vec<VaultRecord> = entries.into_iter().map(|e| e.record.clone()).collect();

        info!(
            records = records.len(),
            failures = failures.len(),
            "vault listed"
        );
        Ok(ListOutcome { records, failures })
    }

    /// Merge one listed envelope into the cache.
    fn absorb(&mut self, wire: WireRecord) -> VaultResult<()> {
        if let Some(entry) = self.cache.get_mut(&wire.id) {
            entry.unlisted_grace = 0;
            let local_wins =
                entry.state == RecordState::Dirty || entry.updated_at > wire.updated_at;
            if local_wins {
                debug!(id = %wire.id, state = ?entry.state, "keeping newer local copy");
                return Ok(());
            }
        }

        match decrypt_record(&wire.envelope, &self.key) {
            Ok(record) => {
                self.cache.insert(
                    wire.id.clone(),
                    CacheEntry {
                        record: record.with_id(wire.id),
                        state: RecordState::Synced,
                        updated_at: wire.updated_at,
                        unlisted_grace: 0,
                    },
                );
                Ok(())
            }
            Err(e) => {
                self.cache.remove(&wire.id);
                Err(e)
            }
        }
    }

    /// Record a local edit without sending it. The cached copy becomes
    /// `Dirty` until the next [`save`](Self::save).
    ///
    /// Records without an id are drafts; they are not cached and stay `Draft`.
    pub fn stage_edit(&mut self, record: VaultRecord) -> VaultResult<RecordState> {
        let Some(id) = record.id.clone() else {
            return Ok(RecordState::Draft);
        };
        let entry = self.cache.get_mut(&id).ok_or(VaultError::NotFound)?;
        let next = entry
            .state
            .apply(RecordEvent::Edited)
            .ok_or(VaultError::NotFound)?;
        entry.record = record;
        entry.state = next;
        debug!(%id, state = ?next, "staged local edit");
        Ok(next)
    }

    /// Encrypt `record` and send it: create when it has no id, full replace
    /// otherwise. Returns the record with its server-assigned id.
    pub async fn save(&mut self, record: VaultRecord) -> VaultResult<VaultRecord> {
        let envelope = encrypt_record(&record, &self.key)?;
        let idem = IdempotencyKey::generate();

        let (wire, prior) = match record.id.clone() {
            None => {
                let wire = with_retry("create", self.max_retries, || {
                    self.store.create(&envelope, &idem)
                })
                .await?;
                (wire, RecordState::Draft)
            }
            Some(id) => {
                if self.tombstones.contains(&id) {
                    return Err(VaultError::NotFound);
                }
                let prior = self
                    .cache
                    .get(&id)
                    .map(|e| e.state)
                    .unwrap_or(RecordState::Synced);
                let result = with_retry("replace", self.max_retries, || {
                    self.store.replace(&id, &envelope, &idem)
                })
                .await;
                match result {
                    Ok(wire) => (wire, prior),
                    Err(VaultError::NotFound) => {
                        self.cache.remove(&id);
                        return Err(VaultError::NotFound);
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let state = prior
            .apply(RecordEvent::Saved)
            .ok_or(VaultError::NotFound)?;
        let saved = record.with_id(wire.id.clone());
        let unlisted_grace = match self.cache.get(&wire.id) {
            Some(entry) => entry.unlisted_grace,
            None if prior == RecordState::Draft => UNLISTED_GRACE,
            None => 0,
        };
        self.cache.insert(
            wire.id.clone(),
            CacheEntry {
                record: saved.clone(),
                state,
                updated_at: wire.updated_at,
                unlisted_grace,
            },
        );

        info!(id = %wire.id, created = prior == RecordState::Draft, "record saved");
        Ok(saved)
    }

    /// Delete on the server and drop the local copy.
    ///
    /// `NotFound` when the id is absent or owned by someone else; the local
    /// cache is cleaned up either way.
    pub async fn delete(&mut self, id: &RecordId) -> VaultResult<()> {
        if self.tombstones.contains(id) {
            return Err(VaultError::NotFound);
        }

        let idem = IdempotencyKey::generate();
        let result = with_retry("delete", self.max_retries, || {
            self.store.delete(id, &idem)
        })
        .await;

        match result {
            Ok(()) => {
                self.cache.remove(id);
                self.tombstones.insert(id.clone());
                info!(%id, "record deleted");
                Ok(())
            }
            Err(VaultError::NotFound) => {
                self.cache.remove(id);
                Err(VaultError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Lazily filter the local cache by a case-insensitive substring of
    /// title, username or url. No server round-trip.
    pub fn search<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a VaultRecord> + 'a {
        let needle = query.to_lowercase();
        self.cache
            .values()
            .filter(|e| e.state != RecordState::Deleted)
            .map(|e| &e.record)
            .filter(move |r| r.matches_lowercase(&needle))
    }

    /// Cached plaintext for `id`, if any.
    pub fn get(&self, id: &RecordId) -> Option<&VaultRecord> {
        self.cache.get(id).map(|e| &e.record)
    }

    pub fn state(&self, id: &RecordId) -> Option<RecordState> {
        if self.tombstones.contains(id) {
            return Some(RecordState::Deleted);
        }
        self.cache.get(id).map(|e| e.state)
    }
}
