//! Clipboard guard: copy a secret, wipe it after a delay.
//!
//! Each copy cancels the pending wipe and starts a new timer, so after copies
//! at `t` and `t + 5s` with a 15 s delay the clipboard is cleared at `t + 20s`.
//! Before clearing, the guard checks (when the backend can read) that the
//! clipboard still holds the copied secret and leaves it alone otherwise.
//! Wipe failures are logged, never returned.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use sv_core::config::ClipboardConfig;
use sv_core::{VaultError, VaultResult};

/// Default delay before a copied secret is wiped.
pub const DEFAULT_CLEAR_AFTER: Duration = Duration::from_secs(15);

/// Platform clipboard access.
#[async_trait]
pub trait ClipboardBackend: Send + Sync {
    async fn write(&self, text: &str) -> Result<()>;

    /// Current contents, or `None` if this backend cannot read.
    async fn read(&self) -> Result<Option<Zeroizing<String>>>;

    async fn clear(&self) -> Result<()> {
        self.write("").await
    }
}

/// In-process clipboard, for tests and headless use.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<Zeroizing<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .ok()
            .and_then(|c| c.as_ref().map(|s| s.to_string()))
    }
}

#[async_trait]
impl ClipboardBackend for MemoryClipboard {
    async fn write(&self, text: &str) -> Result<()> {
        let mut contents = self
            .contents
            .lock()
            .map_err(|_| anyhow::anyhow!("clipboard lock poisoned"))?;
        *contents = if text.is_empty() {
            None
        } else {
            Some(Zeroizing::new(text.to_string()))
        };
        Ok(())
    }

    async fn read(&self) -> Result<Option<Zeroizing<String>>> {
        let contents = self
            .contents
            .lock()
            .map_err(|_| anyhow::anyhow!("clipboard lock poisoned"))?;
        Ok(Some(contents.clone().unwrap_or_default()))
    }
}

/// Clipboard driven by external commands, e.g. `wl-copy` / `wl-paste -n`,
/// `xclip -selection clipboard`, `pbcopy` / `pbpaste`.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    copy: Vec<String>,
    paste: Vec<String>,
}

impl CommandClipboard {
    pub fn new(copy: Vec<String>, paste: Vec<String>) -> VaultResult<Self> {
        if copy.is_empty() {
            return Err(VaultError::Config(
                "clipboard.copy_command is empty; set e.g. [\"wl-copy\"] or [\"pbcopy\"]".into(),
            ));
        }
        Ok(Self { copy, paste })
    }

    fn command(argv: &[String]) -> Result<tokio::process::Command> {
        let (program, args) = argv.split_first().context("empty clipboard command")?;
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args).kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait]
impl ClipboardBackend for CommandClipboard {
    async fn write(&self, text: &str) -> Result<()> {
        let mut child = Self::command(&self.copy)?
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawning {}", self.copy[0]))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .context("writing to clipboard command")?;
        }

        let status = child.wait().await.context("waiting for clipboard command")?;
        if !status.success() {
            anyhow::bail!("{} exited with {status}", self.copy[0]);
        }
        Ok(())
    }

    async fn read(&self) -> Result<Option<Zeroizing<String>>> {
        if self.paste.is_empty() {
            return Ok(None);
        }
        let output = Self::command(&self.paste)?
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .with_context(|| format!("running {}", self.paste[0]))?;
        if !output.status.success() {
            anyhow::bail!("{} exited with {}", self.paste[0], output.status);
        }
        let text = Zeroizing::new(String::from_utf8_lossy(&output.stdout).into_owned());
        Ok(Some(text))
    }
}

pub struct ClipboardGuard {
    backend: Arc<dyn ClipboardBackend>,
    clear_after: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ClipboardGuard {
    pub fn new(backend: Arc<dyn ClipboardBackend>, clear_after: Duration) -> Self {
        Self {
            backend,
            clear_after,
            pending: Mutex::new(None),
        }
    }

    /// Command-backed guard from the `[clipboard]` config section.
    pub fn from_config(cfg: &ClipboardConfig) -> VaultResult<Self> {
        let backend = CommandClipboard::new(cfg.copy_command.clone(), cfg.paste_command.clone())?;
        Ok(Self::new(
            Arc::new(backend),
            Duration::from_secs(cfg.clear_after_secs),
        ))
    }

    pub fn clear_after(&self) -> Duration {
        self.clear_after
    }

    /// Put `secret` on the clipboard and (re)start the wipe timer.
    ///
    /// Must be called within a tokio runtime.
    pub async fn copy(&self, secret: &str) -> VaultResult<()> {
        // An old timer must not fire while the new secret is being written
        if let Some(previous) = self.replace_pending(None) {
            previous.abort();
            debug!("clipboard timer restarted");
        }
        self.backend.write(secret).await?;

        let backend = Arc::clone(&self.backend);
        let expected = Zeroizing::new(secret.to_string());
        let delay = self.clear_after;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            wipe(backend.as_ref(), &expected).await;
        });

        if let Some(raced) = self.replace_pending(Some(task)) {
            raced.abort();
        }
        debug!(clear_after_secs = delay.as_secs(), "secret copied to clipboard");
        Ok(())
    }

    /// Wipe now and cancel any pending timer.
    pub async fn clear_now(&self) {
        if let Some(previous) = self.replace_pending(None) {
            previous.abort();
        }
        if let Err(e) = self.backend.clear().await {
            warn!("clearing clipboard failed: {e:#}");
        }
    }

    /// Wait for the pending wipe, if any, to run.
    pub async fn wait(&self) {
        let pending = self.replace_pending(None);
        if let Some(task) = pending {
            let _ = task.await;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|p| p.as_ref().is_some_and(|t| !t.is_finished()))
            .unwrap_or(false)
    }

    fn replace_pending(&self, next: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        match self.pending.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        }
    }
}

async fn wipe(backend: &dyn ClipboardBackend, expected: &str) {
    match backend.read().await {
        Ok(Some(current)) if current.as_str() != expected => {
            debug!("clipboard contents changed since copy; not clearing");
            return;
        }
        Ok(_) => {}
        Err(e) => warn!("reading clipboard before clear failed: {e:#}"),
    }
    match backend.clear().await {
        Ok(()) => debug!("clipboard cleared"),
        Err(e) => warn!("clearing clipboard failed: {e:#}"),
    }
}
