//! sv-crypto: client-side E2E encryption for SealVault
//!
//! Every vault record is sealed independently before it leaves the client:
//!
//! ```text
//! VaultRecord ──JSON──► plaintext ──XChaCha20-Poly1305(key, random 192-bit nonce, AAD=header)──► envelope
//!
//! encryptedData = base64( version:1 || key_id:8 || ciphertext || tag:16 )
//! iv            = base64( nonce:24 )
//! ```
//!
//! The key is a single 256-bit secret per installation, created on first use
//! by [`KeyManager`] and kept in the platform keychain or a 0600 key file.

pub mod envelope;
pub mod generator;
pub mod keys;
pub mod keystore;

pub use envelope::{decrypt_record, encrypt_record, ENVELOPE_VERSION};
pub use generator::{generate_password, GeneratorOptions};
pub use keys::{generate_key, EncryptionKey, KeyId};
pub use keystore::{
    FileKeyStore, KeyManager, KeyStore, KeychainKeyStore, MemoryKeyStore, Stored,
};

/// Size of the vault key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the truncated key fingerprint carried in every envelope
pub const KEY_ID_SIZE: usize = 8;
