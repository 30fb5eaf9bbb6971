//! The vault encryption key and its public fingerprint

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use secrecy::SecretString;
use zeroize::{Zeroize, Zeroizing};

use sv_core::{VaultError, VaultResult};

use crate::{KEY_ID_SIZE, KEY_SIZE};

const KEY_ID_CONTEXT: &str = "sealvault 2026-01 vault key identifier";

/// The 256-bit vault key. Zeroized on drop.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Non-secret fingerprint stamped into every envelope header.
    pub fn key_id(&self) -> KeyId {
        let derived = Zeroizing::new(blake3::derive_key(KEY_ID_CONTEXT, &self.bytes));
        let mut id = [0u8; KEY_ID_SIZE];
        id.copy_from_slice(&derived[..KEY_ID_SIZE]);
        KeyId(id)
    }

    /// Encode for persistence. The returned string is a secret.
    pub fn to_base64(&self) -> SecretString {
        SecretString::from(STANDARD.encode(self.bytes))
    }

    /// Decode a persisted key. Anything but exactly 32 bytes is corrupt.
    pub fn from_base64(encoded: &str) -> VaultResult<Self> {
        let mut decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| VaultError::KeyUnavailable(format!("stored key is not base64: {e}")))?;

        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(VaultError::KeyUnavailable(format!(
                "stored key has wrong size: {len} bytes (expected {KEY_SIZE})"
            )));
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::from_bytes(bytes))
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("id", &self.key_id())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Truncated key fingerprint. Identifies which key sealed an envelope.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId(pub [u8; KEY_ID_SIZE]);

impl std::fmt::Debug for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyId({self})")
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Generate a random 256-bit vault key.
pub fn generate_key() -> EncryptionKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    EncryptionKey::from_bytes(bytes)
}
