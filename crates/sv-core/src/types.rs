use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Opaque server-assigned record identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        RecordId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

/// A plaintext credential. Lives only in client memory; wiped on drop.
///
/// Not `Serialize`; the sealed payload inside `sv-crypto` is its only
/// serialized form.
///
/// ```compile_fail
/// fn plaintext_json<T: serde::Serialize>(_: &T) {}
/// plaintext_json(&sv_core::VaultRecord::default());
/// ```
#[derive(Clone, PartialEq, Eq, Default, Zeroize, ZeroizeOnDrop)]
pub struct VaultRecord {
    #[zeroize(skip)]
    pub id: Option<RecordId>,
    pub title: String,
    pub username: String,
    pub password: String,
    pub url: String,
    pub notes: String,
}

impl VaultRecord {
    pub fn new(
        title: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        url: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            username: username.into(),
            password: password.into(),
            url: url.into(),
            notes: notes.into(),
        }
    }

    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Case-insensitive substring match over title, username and url.
    /// `needle` must already be lowercased.
    pub fn matches_lowercase(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.username.to_lowercase().contains(needle)
            || self.url.to_lowercase().contains(needle)
    }
}

impl std::fmt::Debug for VaultRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultRecord")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("url", &self.url)
            .field("notes", &"[REDACTED]")
            .finish()
    }
}

/// Ciphertext plus nonce, both base64. Doubles as the POST/PUT request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherEnvelope {
    #[serde(rename = "encryptedData")]
    pub ciphertext: String,
    pub iv: String,
}

/// What the server stores for one record. It never sees anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEnvelopeRecord {
    pub id: RecordId,
    pub owner_id: String,
    pub envelope: CipherEnvelope,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// HTTP representation of a stored record (`GET /vault` element).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord {
    #[serde(rename = "_id")]
    pub id: RecordId,
    #[serde(flatten)]
    pub envelope: CipherEnvelope,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&VaultEnvelopeRecord> for WireRecord {
    fn from(rec: &VaultEnvelopeRecord) -> Self {
        WireRecord {
            id: rec.id.clone(),
            envelope: rec.envelope.clone(),
            created_at: rec.created_at,
            updated_at: rec.updated_at,
        }
    }
}

/// Generic `{ message }` body used for confirmations and every error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Lifecycle of a record in the client cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    /// Never persisted; plaintext only
    Draft,
    /// Local plaintext matches a confirmed server envelope
    Synced,
    /// Edited locally, not yet re-encrypted and sent
    Dirty,
    /// Removed; terminal
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEvent {
    Edited,
    Saved,
    Deleted,
}

impl RecordState {
    /// Next state for `event`, or `None` if the transition is not allowed.
    pub fn apply(self, event: RecordEvent) -> Option<RecordState> {
        use RecordEvent as E;
        use RecordState as S;
        match (self, event) {
            (S::Deleted, _) => None,
            (S::Draft, E::Edited) => Some(S::Draft),
            (S::Synced | S::Dirty, E::Edited) => Some(S::Dirty),
            (S::Draft | S::Dirty | S::Synced, E::Saved) => Some(S::Synced),
            (_, E::Deleted) => Some(S::Deleted),
        }
    }
}
