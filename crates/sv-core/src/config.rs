use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{VaultError, VaultResult};

/// Top-level configuration (loaded from sealvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub client: ClientConfig,
    pub keys: KeyConfig,
    pub clipboard: ClipboardConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl VaultConfig {
    /// Load from `path`, falling back to defaults if the file does not exist.
    pub fn load(path: &Path) -> VaultResult<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found (using defaults)");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| VaultError::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the vault API (default: http://localhost:5000/api)
    pub server_url: String,
    /// Identity token issued by the auth service
    pub token: Option<String>,
    /// File holding the identity token (used when `token` is unset)
    pub token_file: Option<PathBuf>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Extra attempts after a network failure (same idempotency key)
    pub max_retries: u32,
}

/// Where the local encryption key lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyBackend {
    /// base64 key in a 0600 file
    File,
    /// Platform keychain via the `keyring` crate
    Keychain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub backend: KeyBackend,
    /// Key file path for the `file` backend
    pub key_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    /// Seconds before a copied secret is wiped (default: 15)
    pub clear_after_secs: u64,
    /// Command that reads clipboard contents on stdin (e.g. ["wl-copy"])
    pub copy_command: Vec<String>,
    /// Command that prints clipboard contents (e.g. ["wl-paste", "-n"])
    pub paste_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (default: 127.0.0.1:5000)
    pub listen: String,
    /// JSON file holding stored envelopes; in-memory only when unset
    pub data_file: Option<PathBuf>,
    /// Static bearer token → owner id table
    pub tokens: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5000/api".into(),
            token: None,
            token_file: None,
            request_timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            backend: KeyBackend::File,
            key_file: PathBuf::from("~/.config/sealvault/vault.key"),
        }
    }
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            clear_after_secs: 15,
            copy_command: Vec::new(),
            paste_command: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:5000".into(),
            data_file: None,
            tokens: BTreeMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Expand a leading `~/` against `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[client]
server_url = "https://vault.example.com/api"
token = "tok-123"
request_timeout_secs = 10
max_retries = 4

[keys]
backend = "keychain"
key_file = "/var/lib/sealvault/key"

[clipboard]
clear_after_secs = 30
copy_command = ["wl-copy"]
paste_command = ["wl-paste", "-n"]

[server]
listen = "0.0.0.0:8080"
data_file = "/var/lib/svd/vault.json"

[server.tokens]
"tok-123" = "alice"
"tok-456" = "bob"

[logging]
level = "debug"
format = "json"
"#;
        let config: VaultConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.client.server_url, "https://vault.example.com/api");
        assert_eq!(config.client.token.as_deref(), Some("tok-123"));
        assert_eq!(config.client.max_retries, 4);
        assert_eq!(config.keys.backend, KeyBackend::Keychain);
        assert_eq!(config.clipboard.clear_after_secs, 30);
        assert_eq!(config.clipboard.copy_command, vec!["wl-copy"]);
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.server.tokens.get("tok-456").map(String::as_str), Some("bob"));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: VaultConfig = toml::from_str("").unwrap();

        assert_eq!(config.client.server_url, "http://localhost:5000/api");
        assert_eq!(config.client.request_timeout_secs, 30);
        assert_eq!(config.keys.backend, KeyBackend::File);
        assert_eq!(config.clipboard.clear_after_secs, 15);
        assert_eq!(config.server.listen, "127.0.0.1:5000");
        assert!(config.server.tokens.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[clipboard]
clear_after_secs = 5
"#;
        let config: VaultConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.clipboard.clear_after_secs, 5);
        assert!(config.clipboard.copy_command.is_empty());
        assert_eq!(config.client.max_retries, 2);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = VaultConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.clipboard.clear_after_secs, 15);
    }

    #[test]
    fn test_load_invalid_file_is_config_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[keys]\nbackend = \"floppy\"\n").unwrap();

        let err = VaultConfig::load(&path).unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_home(Path::new("/etc/sealvault.toml"));
        assert_eq!(expanded, PathBuf::from("/etc/sealvault.toml"));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = VaultConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: VaultConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.client.server_url, parsed.client.server_url);
        assert_eq!(config.keys.key_file, parsed.keys.key_file);
    }
}
