//! End-to-end: sync client → HTTP → svd → envelope store, over a real socket.
//!
//! A recording middleware captures every request the server receives so the
//! tests can assert on what actually crossed the wire.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use secrecy::SecretString;

use sv_core::{VaultError, VaultRecord};
use sv_crypto::generate_key;
use sv_store::EnvelopeStore;
use sv_sync::{HttpVaultStore, VaultSyncClient};
use svd::{router, AppState, StaticTokenGate};

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    path: String,
    idempotency_key: Option<String>,
    body: String,
}

type Recorder = Arc<Mutex<Vec<Seen>>>;

async fn record(State(seen): State<Recorder>, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, 1 << 20).await.unwrap_or_default();
    seen.lock().unwrap().push(Seen {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        idempotency_key: parts
            .headers
            .get("idempotency-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(&bytes).into_owned(),
    });
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn spawn_server(store: Arc<EnvelopeStore>) -> (SocketAddr, Recorder) {
    let gate = StaticTokenGate::new(BTreeMap::from([
        ("tok-alice".to_string(), "alice".to_string()),
        ("tok-bob".to_string(), "bob".to_string()),
    ]));
    let seen: Recorder = Arc::new(Mutex::new(Vec::new()));
    let app = router(AppState::new(store, Arc::new(gate)))
        .layer(middleware::from_fn_with_state(seen.clone(), record));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

fn http_store(addr: SocketAddr, token: &str) -> HttpVaultStore {
    HttpVaultStore::new(
        format!("http://{addr}/api"),
        SecretString::from(token.to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn bank() -> VaultRecord {
    VaultRecord::new("Bank", "alice", "p@ss", "https://bank.example", "")
}

#[tokio::test]
async fn save_sends_one_post_without_plaintext() {
    let (addr, seen) = spawn_server(Arc::new(EnvelopeStore::in_memory())).await;
    let key = Arc::new(generate_key());
    let mut client = VaultSyncClient::new(http_store(addr, "tok-alice"), key);

    let saved = client.save(bank()).await.unwrap();
    assert!(saved.id.is_some());

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "expected exactly one request, got {seen:?}");
        let post = &seen[0];
        assert_eq!(post.method, "POST");
        assert_eq!(post.path, "/api/vault");
        assert!(post.idempotency_key.is_some());
        assert!(!post.body.contains("p@ss"));
        assert!(!post.body.contains("Bank"));

        let body: serde_json::Value = serde_json::from_str(&post.body).unwrap();
        let fields: Vec<&str> = body
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(fields, vec!["encryptedData", "iv"]);
    }

    let listed = client.list_all().await.unwrap();
    assert_eq!(listed.records.len(), 1);
    assert_eq!(listed.records[0].id, saved.id);
    assert_eq!(listed.records[0].password, "p@ss");
}

#[tokio::test]
async fn edit_and_delete_over_http() {
    let (addr, seen) = spawn_server(Arc::new(EnvelopeStore::in_memory())).await;
    let key = Arc::new(generate_key());
    let mut client = VaultSyncClient::new(http_store(addr, "tok-alice"), key.clone());

    let mut rec = client.save(bank()).await.unwrap();
    rec.password = "n3w-p@ss".into();
    let updated = client.save(rec).await.unwrap();
    let id = updated.id.clone().unwrap();

    let mut other_device = VaultSyncClient::new(http_store(addr, "tok-alice"), key);
    let listed = other_device.list_all().await.unwrap();
    assert_eq!(listed.records[0].password, "n3w-p@ss");

    client.delete(&id).await.unwrap();
    assert!(other_device.list_all().await.unwrap().records.is_empty());

    let methods: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.method.clone())
        .collect();
    assert_eq!(methods, vec!["POST", "PUT", "GET", "DELETE", "GET"]);
}

#[tokio::test]
async fn other_owner_gets_not_found() {
    let (addr, _) = spawn_server(Arc::new(EnvelopeStore::in_memory())).await;
    let key = Arc::new(generate_key());
    let mut alice = VaultSyncClient::new(http_store(addr, "tok-alice"), key.clone());
    let mut bob = VaultSyncClient::new(http_store(addr, "tok-bob"), key);

    let id = alice.save(bank()).await.unwrap().id.clone().unwrap();

    assert!(bob.list_all().await.unwrap().records.is_empty());
    assert!(matches!(bob.delete(&id).await, Err(VaultError::NotFound)));
    assert_eq!(alice.list_all().await.unwrap().records.len(), 1);
}

#[tokio::test]
async fn bad_token_is_unauthorized() {
    let (addr, _) = spawn_server(Arc::new(EnvelopeStore::in_memory())).await;
    let mut client = VaultSyncClient::new(http_store(addr, "forged"), Arc::new(generate_key()));

    let err = client.list_all().await.unwrap_err();
    assert!(matches!(err, VaultError::Unauthorized(_)), "got {err:?}");
}

#[tokio::test]
async fn data_file_holds_ciphertext_only() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("vault.json");
    let store = Arc::new(EnvelopeStore::open(&path).unwrap());
    let (addr, _) = spawn_server(store).await;

    let mut client = VaultSyncClient::new(http_store(addr, "tok-alice"), Arc::new(generate_key()));
    client.save(bank()).await.unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("encryptedData"));
    assert!(!raw.contains("p@ss"));
    assert!(!raw.contains("bank.example"));
}
