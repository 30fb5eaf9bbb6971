//! Integration test: sync client ↔ envelope store, in-process.
//!
//! Exercises the full client pipeline (encrypt → store → list → decrypt →
//! search) against sv-store's owner-scoped views, with no HTTP in between.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sv_core::{
    CipherEnvelope, IdempotencyKey, RecordId, VaultError, VaultRecord, VaultResult, VaultStore,
    WireRecord,
};
use sv_crypto::{generate_key, EncryptionKey, KeyManager, MemoryKeyStore};
use sv_store::{EnvelopeStore, ScopedStore};
use sv_sync::VaultSyncClient;

fn client_for(
    store: &Arc<EnvelopeStore>,
    owner: &str,
    key: &Arc<EncryptionKey>,
) -> VaultSyncClient<ScopedStore> {
    VaultSyncClient::new(store.scoped(owner), Arc::clone(key))
}

fn bank() -> VaultRecord {
    VaultRecord::new("Bank", "alice", "p@ss", "https://bank.example", "")
}

#[tokio::test]
async fn save_then_list_roundtrip() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let key = Arc::new(generate_key());
    let mut client = client_for(&store, "alice", &key);

    let saved = client.save(bank()).await.unwrap();
    let id = saved.id.clone().expect("server assigns an id");

    // a fresh client with the same key sees the same plaintext
    let mut fresh = client_for(&store, "alice", &key);
    let listed = fresh.list_all().await.unwrap();
    assert!(listed.failures.is_empty());
    assert_eq!(listed.records.len(), 1);

    let rec = &listed.records[0];
    assert_eq!(rec.id.as_ref(), Some(&id));
    assert_eq!(rec.title, "Bank");
    assert_eq!(rec.password, "p@ss");
}

#[tokio::test]
async fn server_holds_only_ciphertext() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let key = Arc::new(generate_key());
    let mut client = client_for(&store, "alice", &key);
    client.save(bank()).await.unwrap();

    for wire in store.list_by_owner("alice").await {
        let body = serde_json::to_string(&wire).unwrap();
        for plaintext in ["Bank", "alice", "p@ss", "bank.example"] {
            assert!(!body.contains(plaintext), "stored record leaks {plaintext:?}");
        }
    }
}

#[tokio::test]
async fn search_matches_github_not_gmail() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let key = Arc::new(generate_key());
    let mut client = client_for(&store, "alice", &key);

    client
        .save(VaultRecord::new("GitHub", "octo", "pw1", "https://github.com", ""))
        .await
        .unwrap();
    client
        .save(VaultRecord::new("Gmail", "me@gmail.com", "pw2", "https://mail.google.com", ""))
        .await
        .unwrap();
    client.list_all().await.unwrap();

    let hits: Vec<&str> = client.search("git").map(|r| r.title.as_str()).collect();
    assert_eq!(hits, vec!["GitHub"]);
}

#[tokio::test]
async fn owners_cannot_see_or_touch_each_other() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let key = Arc::new(generate_key());
    let mut alice = client_for(&store, "alice", &key);
    let mut bob = client_for(&store, "bob", &key);

    let alice_rec = alice.save(bank()).await.unwrap();
    let alice_id = alice_rec.id.clone().unwrap();

    assert!(bob.list_all().await.unwrap().records.is_empty());

    let err = bob.delete(&alice_id).await.unwrap_err();
    assert!(matches!(err, VaultError::NotFound));

    let mut hijack = alice_rec.clone();
    hijack.password = "owned".into();
    let err = bob.save(hijack).await.unwrap_err();
    assert!(matches!(err, VaultError::NotFound));

    let listed = alice.list_all().await.unwrap();
    assert_eq!(listed.records[0].password, "p@ss");
}

#[tokio::test]
async fn other_key_records_reported_individually() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let k1 = Arc::new(generate_key());
    let k2 = Arc::new(generate_key());

    let mut laptop = client_for(&store, "alice", &k1);
    laptop.save(bank()).await.unwrap();

    let mut phone = client_for(&store, "alice", &k2);
    phone
        .save(VaultRecord::new("Phone only", "", "x", "", ""))
        .await
        .unwrap();

    let listed = laptop.list_all().await.unwrap();
    assert_eq!(listed.records.len(), 1);
    assert_eq!(listed.records[0].title, "Bank");
    assert_eq!(listed.failures.len(), 1);
    assert!(matches!(
        listed.failures[0].error,
        VaultError::AuthenticationFailure
    ));
}

#[tokio::test]
async fn two_devices_converge() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let key = Arc::new(generate_key());
    let mut laptop = client_for(&store, "alice", &key);
    let mut phone = client_for(&store, "alice", &key);

    let saved = laptop.save(bank()).await.unwrap();
    let id = saved.id.clone().unwrap();

    phone.list_all().await.unwrap();
    let mut edited = phone.get(&id).cloned().unwrap();
    edited.notes = "PIN is in the safe".into();
    phone.save(edited).await.unwrap();

    let listed = laptop.list_all().await.unwrap();
    assert_eq!(listed.records[0].notes, "PIN is in the safe");

    phone.delete(&id).await.unwrap();
    assert!(laptop.list_all().await.unwrap().records.is_empty());
    assert!(laptop.get(&id).is_none());
}

#[tokio::test]
async fn record_created_here_and_deleted_elsewhere_disappears() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let key = Arc::new(generate_key());
    let mut laptop = client_for(&store, "alice", &key);
    let mut phone = client_for(&store, "alice", &key);

    let id = laptop.save(bank()).await.unwrap().id.clone().unwrap();

    phone.list_all().await.unwrap();
    phone.delete(&id).await.unwrap();
    assert!(store.is_empty().await);

    // the first refresh may still be treated as a lagging listing
    laptop.list_all().await.unwrap();
    for _ in 0..3 {
        assert!(laptop.list_all().await.unwrap().records.is_empty());
    }
    assert!(laptop.get(&id).is_none());
}

#[tokio::test]
async fn malformed_envelopes_reported_individually() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let key = Arc::new(generate_key());
    let mut client = client_for(&store, "alice", &key);
    client.save(bank()).await.unwrap();

    let bad_base64 = store
        .create(
            "alice",
            CipherEnvelope {
                ciphertext: "not*base64!".into(),
                iv: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".into(),
            },
            None,
        )
        .await
        .unwrap();
    let short_iv = store
        .create(
            "alice",
            CipherEnvelope {
                ciphertext: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".into(),
                iv: "AAAA".into(),
            },
            None,
        )
        .await
        .unwrap();

    let listed = client.list_all().await.unwrap();
    assert_eq!(listed.records.len(), 1);
    assert_eq!(listed.records[0].title, "Bank");

    assert_eq!(listed.failures.len(), 2);
    for failure in &listed.failures {
        assert!(
            [&bad_base64.id, &short_iv.id].contains(&&failure.id),
            "unexpected failure for {}",
            failure.id
        );
        assert!(
            matches!(failure.error, VaultError::MalformedEnvelope(_)),
            "got {:?}",
            failure.error
        );
    }
}

#[tokio::test]
async fn unavailable_key_storage_stops_before_any_request() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let manager = KeyManager::new(MemoryKeyStore::unavailable());

    let result = manager
        .get_or_create_key()
        .map(|key| VaultSyncClient::new(store.scoped("alice"), key));

    assert!(matches!(result, Err(VaultError::KeyUnavailable(_))));
    assert!(store.is_empty().await);
}

/// Store that applies the first mutation and then "loses" the response,
/// the way a dropped connection after the server committed would.
struct LostResponse {
    inner: ScopedStore,
    dropped: AtomicBool,
}

impl LostResponse {
    fn lose_once<T>(&self, result: VaultResult<T>) -> VaultResult<T> {
        if result.is_ok() && !self.dropped.swap(true, Ordering::SeqCst) {
            return Err(VaultError::Network("connection reset by peer".into()));
        }
        result
    }
}

#[async_trait]
impl VaultStore for LostResponse {
    async fn list(&self) -> VaultResult<Vec<WireRecord>> {
        self.inner.list().await
    }

    async fn create(
        &self,
        envelope: &CipherEnvelope,
        key: &IdempotencyKey,
    ) -> VaultResult<WireRecord> {
        let result = self.inner.create(envelope, key).await;
        self.lose_once(result)
    }

    async fn replace(
        &self,
        id: &RecordId,
        envelope: &CipherEnvelope,
        key: &IdempotencyKey,
    ) -> VaultResult<WireRecord> {
        let result = self.inner.replace(id, envelope, key).await;
        self.lose_once(result)
    }

    async fn delete(&self, id: &RecordId, key: &IdempotencyKey) -> VaultResult<()> {
        let result = self.inner.delete(id, key).await;
        self.lose_once(result)
    }
}

#[tokio::test(start_paused = true)]
async fn retried_create_is_applied_once() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let key = Arc::new(generate_key());
    let flaky = LostResponse {
        inner: store.scoped("alice"),
        dropped: AtomicBool::new(false),
    };
    let mut client = VaultSyncClient::new(flaky, key);

    let saved = client.save(bank()).await.unwrap();

    assert_eq!(store.len().await, 1, "retry must replay, not create twice");
    let stored = store.list_by_owner("alice").await;
    assert_eq!(Some(&stored[0].id), saved.id.as_ref());
}

#[tokio::test(start_paused = true)]
async fn retried_delete_is_not_reported_missing() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let key = Arc::new(generate_key());
    let id = client_for(&store, "alice", &key)
        .save(bank())
        .await
        .unwrap()
        .id
        .clone()
        .unwrap();

    let flaky = LostResponse {
        inner: store.scoped("alice"),
        dropped: AtomicBool::new(false),
    };
    let mut client = VaultSyncClient::new(flaky, key);
    client.delete(&id).await.unwrap();
    assert!(store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn no_retries_surfaces_network_error() {
    let store = Arc::new(EnvelopeStore::in_memory());
    let flaky = LostResponse {
        inner: store.scoped("alice"),
        dropped: AtomicBool::new(false),
    };
    let mut client = VaultSyncClient::new(flaky, Arc::new(generate_key())).with_max_retries(0);

    let err = client.save(bank()).await.unwrap_err();
    assert!(matches!(err, VaultError::Network(_)));
}
