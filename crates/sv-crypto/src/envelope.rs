//! Per-record XChaCha20-Poly1305 encryption/decryption
//!
//! Envelope format:
//! ```text
//! encryptedData = base64( [1 byte: version][8 bytes: key_id][N bytes: ciphertext][16 bytes: Poly1305 tag] )
//! iv            = base64( [24 bytes: random nonce] )
//! AAD           = version || key_id
//! ```
//!
//! The header is authenticated, so a flipped version or key id fails exactly
//! like a flipped ciphertext byte. The key id lets a future key rotation pick
//! the right key; today there is only one.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use sv_core::{CipherEnvelope, VaultError, VaultRecord, VaultResult};

use crate::keys::{EncryptionKey, KeyId};
use crate::{KEY_ID_SIZE, NONCE_SIZE, TAG_SIZE};

/// Current envelope layout version
pub const ENVELOPE_VERSION: u8 = 1;

const HEADER_SIZE: usize = 1 + KEY_ID_SIZE;

/// Canonical plaintext: the five user fields, never the server id.
#[derive(Serialize)]
struct RecordPayload<'a> {
    title: &'a str,
    username: &'a str,
    password: &'a str,
    url: &'a str,
    notes: &'a str,
}

#[derive(Deserialize, Zeroize)]
#[serde(deny_unknown_fields)]
struct OwnedPayload {
    title: String,
    username: String,
    password: String,
    url: String,
    notes: String,
}

/// Seal `record` under `key` with a fresh random nonce.
pub fn encrypt_record(record: &VaultRecord, key: &EncryptionKey) -> VaultResult<CipherEnvelope> {
    let payload = RecordPayload {
        title: &record.title,
        username: &record.username,
        password: &record.password,
        url: &record.url,
        notes: &record.notes,
    };
    let plaintext = Zeroizing::new(
        serde_json::to_vec(&payload)
            .map_err(|e| anyhow::anyhow!("record serialization failed: {e}"))?,
    );

    let header = build_header(ENVELOPE_VERSION, &key.key_id());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext.as_slice(),
                aad: &header,
            },
        )
        .map_err(|e| anyhow::anyhow!("record encryption failed: {e}"))?;

    let mut sealed = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    sealed.extend_from_slice(&header);
    sealed.extend_from_slice(&ciphertext);

    Ok(CipherEnvelope {
        ciphertext: STANDARD.encode(&sealed),
        iv: STANDARD.encode(nonce_bytes),
    })
}

/// Open an envelope sealed by [`encrypt_record`].
///
/// Either the whole record comes back or an error does; nothing partially
/// decrypted ever escapes. The returned record has no `id`.
pub fn decrypt_record(envelope: &CipherEnvelope, key: &EncryptionKey) -> VaultResult<VaultRecord> {
    let sealed = STANDARD
        .decode(&envelope.ciphertext)
        .map_err(|e| VaultError::MalformedEnvelope(format!("encryptedData is not base64: {e}")))?;
    let nonce_bytes = STANDARD
        .decode(&envelope.iv)
        .map_err(|e| VaultError::MalformedEnvelope(format!("iv is not base64: {e}")))?;

    if nonce_bytes.len() != NONCE_SIZE {
        return Err(VaultError::MalformedEnvelope(format!(
            "iv has wrong size: {} bytes (expected {NONCE_SIZE})",
            nonce_bytes.len()
        )));
    }
    if sealed.len() < HEADER_SIZE + TAG_SIZE {
        return Err(VaultError::MalformedEnvelope(format!(
            "encryptedData too short: {} bytes (minimum {})",
            sealed.len(),
            HEADER_SIZE + TAG_SIZE
        )));
    }

    let (header, ciphertext) = sealed.split_at(HEADER_SIZE);
    let nonce = XNonce::from_slice(&nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| {
                if header[1..] != key.key_id().0 {
                    tracing::debug!(
                        expected = %key.key_id(),
                        "envelope was sealed under a different key"
                    );
                }
                VaultError::AuthenticationFailure
            })?,
    );

    // Authenticated from here on: an odd version is a writer bug, not tamper.
    if header[0] != ENVELOPE_VERSION {
        return Err(VaultError::MalformedEnvelope(format!(
            "unsupported envelope version {}",
            header[0]
        )));
    }

    let mut payload: OwnedPayload = serde_json::from_slice(&plaintext).map_err(|e| {
        VaultError::MalformedEnvelope(format!("authenticated payload is not a record: {e}"))
    })?;

    let record = VaultRecord::new(
        std::mem::take(&mut payload.title),
        std::mem::take(&mut payload.username),
        std::mem::take(&mut payload.password),
        std::mem::take(&mut payload.url),
        std::mem::take(&mut payload.notes),
    );
    payload.zeroize();
    Ok(record)
}

fn build_header(version: u8, key_id: &KeyId) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0] = version;
    header[1..].copy_from_slice(&key_id.0);
    header
}
