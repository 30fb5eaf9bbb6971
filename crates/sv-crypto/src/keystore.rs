//! Local persistence of the vault key.
//!
//! Backends:
//! - [`FileKeyStore`]: base64 key in a file created 0600 (unique temp file, no-clobber publish)
//! - [`KeychainKeyStore`]: platform keychain via the `keyring` crate
//!   (macOS Keychain, Secret Service, Windows Credential Manager)
//! - [`MemoryKeyStore`]: process-local, for tests and ephemeral sessions
//!
//! [`KeyManager`] sits in front of a backend and hands the same key to every
//! cipher call for the life of the process.

use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use sv_core::{VaultError, VaultResult};

use crate::keys::{generate_key, EncryptionKey, KeyId};

const SERVICE_NAME: &str = "sealvault";
const KEYCHAIN_ENTRY: &str = "vault-key";

/// Somewhere to keep the one vault key. All failures are `KeyUnavailable`.
pub trait KeyStore: Send + Sync {
    /// `Ok(None)` means "no key yet", which is different from "cannot tell".
    fn load(&self) -> VaultResult<Option<EncryptionKey>>;

    /// Persist a freshly generated key. Never replaces an existing one: if
    /// another process got there first the result is [`Stored::AlreadyPresent`]
    /// and the caller must load the winner.
    fn store(&self, key: &EncryptionKey) -> VaultResult<Stored>;

    /// Human-readable location, for status output and logs.
    fn describe(&self) -> String;
}

/// Outcome of [`KeyStore::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stored {
    Written,
    AlreadyPresent,
}

// ── KeyManager ────────────────────────────────────────────────────────────────

pub struct KeyManager {
    store: Box<dyn KeyStore>,
    cached: Mutex<Option<Arc<EncryptionKey>>>,
}

impl KeyManager {
    pub fn new(store: impl KeyStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            cached: Mutex::new(None),
        }
    }

    /// Return the installation key, generating and persisting it on first use.
    ///
    /// Once a key exists it is returned unchanged forever; there is no path
    /// through here that regenerates or rotates it.
    pub fn get_or_create_key(&self) -> VaultResult<Arc<EncryptionKey>> {
        let mut slot = self
            .cached
            .lock()
            .map_err(|_| VaultError::KeyUnavailable("key cache lock poisoned".into()))?;

        if let Some(key) = slot.as_ref() {
            return Ok(Arc::clone(key));
        }

        let key = match self.store.load()? {
            Some(key) => {
                debug!(store = %self.store.describe(), key_id = %key.key_id(), "vault key loaded");
                key
            }
            None => {
                let key = generate_key();
                match self.store.store(&key)? {
                    Stored::Written => {
                        info!(
                            store = %self.store.describe(),
                            key_id = %key.key_id(),
                            "generated new vault key (losing it makes the vault unrecoverable)"
                        );
                        key
                    }
                    Stored::AlreadyPresent => {
                        let winner = self.store.load()?.ok_or_else(|| {
                            VaultError::KeyUnavailable(
                                "key created concurrently but could not be read back".into(),
                            )
                        })?;
                        debug!(
                            store = %self.store.describe(),
                            key_id = %winner.key_id(),
                            "another process created the vault key first"
                        );
                        winner
                    }
                }
            }
        };

        let key = Arc::new(key);
        *slot = Some(Arc::clone(&key));
        Ok(key)
    }

    /// Fingerprint of the persisted key without creating one.
    pub fn current_key_id(&self) -> VaultResult<Option<KeyId>> {
        Ok(self.store.load()?.map(|k| k.key_id()))
    }

    pub fn describe(&self) -> String {
        self.store.describe()
    }
}

// ── File backend ──────────────────────────────────────────────────────────────

pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> VaultResult<Option<EncryptionKey>> {
        if !self.path.exists() {
            return Ok(None);
        }

        warn_if_world_readable(&self.path);

        let mut content = std::fs::read_to_string(&self.path).map_err(|e| {
            VaultError::KeyUnavailable(format!("reading key file {}: {e}", self.path.display()))
        })?;
        let key = EncryptionKey::from_base64(&content);
        content.zeroize();
        key.map(Some)
    }

    fn store(&self, key: &EncryptionKey) -> VaultResult<Stored> {
        use std::io::Write;

        let unavailable = |what: &str, e: std::io::Error| {
            VaultError::KeyUnavailable(format!("{what} {}: {e}", self.path.display()))
        };

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| unavailable("creating key dir for", e))?;

        // Unique per writer and 0600 from creation
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| unavailable("creating key temp for", e))?;
        let encoded: SecretString = key.to_base64();
        tmp.write_all(encoded.expose_secret().as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| unavailable("writing key temp for", e))?;

        match tmp.persist_noclobber(&self.path) {
            Ok(_) => {
                debug!(path = %self.path.display(), "vault key written");
                Ok(Stored::Written)
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                Ok(Stored::AlreadyPresent)
            }
            Err(e) => Err(unavailable("publishing key file", e.error)),
        }
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

#[cfg(unix)]
fn warn_if_world_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                path = %path.display(),
                mode = %format!("{:o}", mode & 0o777),
                "key file is readable by other users; chmod 600 recommended"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_world_readable(_path: &Path) {}

// ── Keychain backend ──────────────────────────────────────────────────────────

pub struct KeychainKeyStore {
    entry_name: String,
}

impl KeychainKeyStore {
    pub fn new() -> Self {
        Self {
            entry_name: KEYCHAIN_ENTRY.to_string(),
        }
    }

    pub fn with_entry(entry_name: impl Into<String>) -> Self {
        Self {
            entry_name: entry_name.into(),
        }
    }

    fn entry(&self) -> VaultResult<keyring::Entry> {
        keyring::Entry::new(SERVICE_NAME, &self.entry_name)
            .map_err(|e| VaultError::KeyUnavailable(format!("keychain entry creation: {e}")))
    }
}

impl Default for KeychainKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for KeychainKeyStore {
    fn load(&self) -> VaultResult<Option<EncryptionKey>> {
        match self.entry()?.get_password() {
            Ok(mut encoded) => {
                let key = EncryptionKey::from_base64(&encoded);
                encoded.zeroize();
                key.map(Some)
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::KeyUnavailable(format!(
                "keychain get for '{}': {e}",
                self.entry_name
            ))),
        }
    }

    fn store(&self, key: &EncryptionKey) -> VaultResult<Stored> {
        if self.load()?.is_some() {
            return Ok(Stored::AlreadyPresent);
        }
        let encoded = key.to_base64();
        self.entry()?
            .set_password(encoded.expose_secret())
            .map_err(|e| {
                VaultError::KeyUnavailable(format!("keychain store for '{}': {e}", self.entry_name))
            })?;
        debug!(entry = %self.entry_name, "stored vault key in platform keychain");
        Ok(Stored::Written)
    }

    fn describe(&self) -> String {
        format!("keychain:{SERVICE_NAME}/{}", self.entry_name)
    }
}

// ── Memory backend ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryKeyStore {
    slot: Mutex<Option<EncryptionKey>>,
    disabled: bool,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: EncryptionKey) -> Self {
        Self {
            slot: Mutex::new(Some(key)),
            disabled: false,
        }
    }

    /// A store that behaves like disabled or wiped storage.
    pub fn unavailable() -> Self {
        Self {
            slot: Mutex::new(None),
            disabled: true,
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self) -> VaultResult<Option<EncryptionKey>> {
        if self.disabled {
            return Err(VaultError::KeyUnavailable("key storage disabled".into()));
        }
        let slot = self
            .slot
            .lock()
            .map_err(|_| VaultError::KeyUnavailable("memory key store poisoned".into()))?;
        Ok(slot.clone())
    }

    fn store(&self, key: &EncryptionKey) -> VaultResult<Stored> {
        if self.disabled {
            return Err(VaultError::KeyUnavailable("key storage disabled".into()));
        }
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| VaultError::KeyUnavailable("memory key store poisoned".into()))?;
        if slot.is_some() {
            return Ok(Stored::AlreadyPresent);
        }
        *slot = Some(key.clone());
        Ok(Stored::Written)
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
