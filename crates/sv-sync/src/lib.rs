//! sv-sync: the client half of SealVault.
//!
//! [`VaultSyncClient`] keeps a plaintext cache of the caller's records and
//! talks to any [`sv_core::VaultStore`] in ciphertext only. [`HttpVaultStore`]
//! is the production store; [`ClipboardGuard`] handles copied secrets.

pub mod client;
pub mod clipboard;
pub mod http;
pub mod retry;

pub use client::{ListOutcome, RecordFailure, VaultSyncClient, DEFAULT_MAX_RETRIES};
pub use clipboard::{
    ClipboardBackend, ClipboardGuard, CommandClipboard, MemoryClipboard, DEFAULT_CLEAR_AFTER,
};
pub use http::{load_token, HttpVaultStore};
