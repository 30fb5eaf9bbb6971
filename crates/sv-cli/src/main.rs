//! sv: SealVault command-line client
//!
//! Commands:
//!   key init | key status        - create or inspect the local encryption key
//!   list                         - decrypt and list every record
//!   add / edit <id> / delete <id> - manage records
//!   search <query>               - filter by title, username or url
//!   copy <id>                    - copy a password (or username), wiped after a delay
//!   generate                     - generate a random password
//!   config show                  - print the active configuration
//!
//! Records are encrypted on this machine before they are sent; the server and
//! the network only ever see ciphertext.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use sv_core::config::{expand_home, KeyBackend, VaultConfig};
use sv_core::{RecordId, VaultError, VaultRecord};
use sv_crypto::{generate_password, FileKeyStore, GeneratorOptions, KeyManager, KeychainKeyStore};
use sv_sync::{ClipboardGuard, HttpVaultStore, ListOutcome, VaultSyncClient};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sv",
    version,
    about = "SealVault password vault client",
    long_about = "sv: end-to-end encrypted password vault. Records are sealed locally with \
                  XChaCha20-Poly1305 before they leave this machine."
)]
struct Cli {
    /// Path to the SealVault TOML configuration file
    #[arg(
        long,
        short = 'c',
        env = "SV_CONFIG",
        default_value = "~/.config/sealvault/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SV_LOG", default_value = "warn")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "SV_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Local encryption key management
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Decrypt and list every record
    List {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Add a new record
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        username: String,
        #[arg(long, default_value = "")]
        url: String,
        #[arg(long, default_value = "")]
        notes: String,
        /// Generate the password instead of prompting for it
        #[arg(long)]
        generate: bool,
        #[command(flatten)]
        generator: GeneratorArgs,
    },

    /// Edit an existing record; unspecified fields are kept
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Prompt for a new password
        #[arg(long, conflicts_with = "generate")]
        password: bool,
        /// Replace the password with a generated one
        #[arg(long)]
        generate: bool,
        #[command(flatten)]
        generator: GeneratorArgs,
    },

    /// Delete a record
    Delete { id: String },

    /// Case-insensitive search over title, username and url
    Search {
        query: String,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Copy a field to the clipboard; it is wiped after `clipboard.clear_after_secs`
    Copy {
        id: String,
        #[arg(long, value_enum, default_value = "password")]
        field: CopyField,
    },

    /// Generate a random password
    Generate {
        #[command(flatten)]
        generator: GeneratorArgs,
        /// Copy to the clipboard instead of printing
        #[arg(long)]
        copy: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Create the vault key if it does not exist yet
    Init,
    /// Show where the key lives and its fingerprint
    Status,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CopyField {
    Password,
    Username,
}

#[derive(Args, Debug, Clone, Copy)]
struct OutputArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug, Clone, Copy)]
struct GeneratorArgs {
    /// Password length (8-32)
    #[arg(long, default_value_t = 16)]
    length: usize,
    #[arg(long)]
    no_numbers: bool,
    #[arg(long)]
    no_symbols: bool,
    /// Keep look-alike characters (i l 1 L o 0 O)
    #[arg(long)]
    allow_lookalikes: bool,
}

impl From<GeneratorArgs> for GeneratorOptions {
    fn from(args: GeneratorArgs) -> Self {
        GeneratorOptions {
            length: args.length,
            include_numbers: !args.no_numbers,
            include_symbols: !args.no_symbols,
            exclude_lookalikes: !args.allow_lookalikes,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, cli.log_format);

    let config_path = expand_home(&cli.config);
    let config = VaultConfig::load(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    match cli.command {
        Commands::Key { action: KeyAction::Init } => cmd_key_init(&config),
        Commands::Key { action: KeyAction::Status } => cmd_key_status(&config),
        Commands::List { output } => cmd_list(&config, output).await,
        Commands::Add {
            title,
            username,
            url,
            notes,
            generate,
            generator,
        } => {
            let password = if generate {
                generate_password(&generator.into())?
            } else {
                prompt_password("Password: ")?
            };
            let record = VaultRecord::new(title, username, password.as_str(), url, notes);
            cmd_add(&config, record).await
        }
        Commands::Edit {
            id,
            title,
            username,
            url,
            notes,
            password,
            generate,
            generator,
        } => {
            let new_password = if generate {
                Some(generate_password(&generator.into())?)
            } else if password {
                Some(prompt_password("New password: ")?)
            } else {
                None
            };
            let edit = RecordEdit {
                title,
                username,
                url,
                notes,
                password: new_password,
            };
            cmd_edit(&config, RecordId(id), edit).await
        }
        Commands::Delete { id } => cmd_delete(&config, RecordId(id)).await,
        Commands::Search { query, output } => cmd_search(&config, &query, output).await,
        Commands::Copy { id, field } => cmd_copy(&config, RecordId(id), field).await,
        Commands::Generate { generator, copy } => cmd_generate(&config, generator, copy).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout is for command output
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Shared helpers ─────────────────────────────────────────────────────────────

fn key_manager(config: &VaultConfig) -> KeyManager {
    match config.keys.backend {
        KeyBackend::File => KeyManager::new(FileKeyStore::new(expand_home(&config.keys.key_file))),
        KeyBackend::Keychain => KeyManager::new(KeychainKeyStore::new()),
    }
}

fn connect(config: &VaultConfig) -> Result<VaultSyncClient<HttpVaultStore>> {
    let key = key_manager(config)
        .get_or_create_key()
        .context("loading the vault key")?;
    let store = HttpVaultStore::from_config(&config.client).context("configuring vault API")?;
    tracing::debug!(server = %store.base_url(), key_id = %key.key_id(), "vault client ready");
    Ok(VaultSyncClient::new(store, key).with_max_retries(config.client.max_retries))
}

fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = Zeroizing::new(rpassword::prompt_password(prompt).context("reading password")?);
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(password)
}

/// List once so the cache holds every record, reporting undecryptable ones.
async fn refresh(client: &mut VaultSyncClient<HttpVaultStore>) -> Result<ListOutcome> {
    let outcome = client.list_all().await.context("listing vault")?;
    for failure in &outcome.failures {
        eprintln!(
            "warning: record {} could not be decrypted ({})",
            failure.id, failure.error
        );
    }
    Ok(outcome)
}

#[derive(Serialize)]
struct RecordRow<'a> {
    id: &'a str,
    title: &'a str,
    username: &'a str,
    url: &'a str,
}

impl<'a> From<&'a VaultRecord> for RecordRow<'a> {
    fn from(r: &'a VaultRecord) -> Self {
        RecordRow {
            id: r.id.as_ref().map(RecordId::as_str).unwrap_or(""),
            title: &r.title,
            username: &r.username,
            url: &r.url,
        }
    }
}

/// Print records without secrets: no password, no notes.
fn print_records<'a>(
    records: impl Iterator<Item = &'a VaultRecord>,
    output: OutputArgs,
) -> Result<()> {
    let rows: Vec<RecordRow<'_>> = records.map(RecordRow::from).collect();
    if output.json {
        println!("{}", serde_json::to_string_pretty(&rows).context("serializing records")?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("(no records)");
        return Ok(());
    }
    for row in &rows {
        println!("{:<36}  {:<24}  {:<24}  {}", row.id, row.title, row.username, row.url);
    }
    Ok(())
}

// ── `sv key` ───────────────────────────────────────────────────────────────────

fn cmd_key_init(config: &VaultConfig) -> Result<()> {
    let manager = key_manager(config);
    let existed = manager
        .current_key_id()
        .context("reading the vault key")?
        .is_some();
    let key = manager
        .get_or_create_key()
        .context("creating the vault key")?;

    if existed {
        println!("key already exists (unchanged)");
    } else {
        println!("key created");
    }
    println!("  backend: {}", manager.describe());
    println!("  key id:  {}", key.key_id());
    Ok(())
}

fn cmd_key_status(config: &VaultConfig) -> Result<()> {
    let manager = key_manager(config);
    println!("  backend: {}", manager.describe());
    match manager.current_key_id() {
        Ok(Some(id)) => println!("  key id:  {id}"),
        Ok(None) => println!("  key id:  (none yet; run `sv key init`)"),
        Err(e) => println!("  key id:  unavailable ({e})"),
    }
    Ok(())
}

// ── `sv list` / `sv search` ────────────────────────────────────────────────────

async fn cmd_list(config: &VaultConfig, output: OutputArgs) -> Result<()> {
    let mut client = connect(config)?;
    let outcome = refresh(&mut client).await?;
    print_records(outcome.records.iter(), output)
}

async fn cmd_search(config: &VaultConfig, query: &str, output: OutputArgs) -> Result<()> {
    let mut client = connect(config)?;
    refresh(&mut client).await?;
    print_records(client.search(query), output)
}

// ── `sv add` / `sv edit` / `sv delete` ─────────────────────────────────────────

async fn cmd_add(config: &VaultConfig, record: VaultRecord) -> Result<()> {
    let mut client = connect(config)?;
    let saved = client.save(record).await.context("saving record")?;
    println!(
        "added {}",
        saved.id.as_ref().map(RecordId::as_str).unwrap_or("?")
    );
    Ok(())
}

/// Put `value` into `field`; the previous contents come back wrapped so they
/// are wiped when dropped.
fn overwrite(field: &mut String, value: String) -> Zeroizing<String> {
    Zeroizing::new(std::mem::replace(field, value))
}

struct RecordEdit {
    title: Option<String>,
    username: Option<String>,
    url: Option<String>,
    notes: Option<String>,
    password: Option<Zeroizing<String>>,
}

impl RecordEdit {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.username.is_none()
            && self.url.is_none()
            && self.notes.is_none()
            && self.password.is_none()
    }

    fn apply(self, record: &mut VaultRecord) {
        if let Some(v) = self.title {
            drop(overwrite(&mut record.title, v));
        }
        if let Some(v) = self.username {
            drop(overwrite(&mut record.username, v));
        }
        if let Some(v) = self.url {
            drop(overwrite(&mut record.url, v));
        }
        if let Some(v) = self.notes {
            drop(overwrite(&mut record.notes, v));
        }
        if let Some(v) = self.password {
            drop(overwrite(&mut record.password, v.as_str().to_owned()));
        }
    }
}

async fn cmd_edit(config: &VaultConfig, id: RecordId, edit: RecordEdit) -> Result<()> {
    if edit.is_empty() {
        anyhow::bail!(
            "nothing to change; pass at least one of \
             --title, --username, --url, --notes, --password, --generate"
        );
    }

    let mut client = connect(config)?;
    refresh(&mut client).await?;
    let mut record = client
        .get(&id)
        .cloned()
        .with_context(|| format!("no record with id {id}"))?;
    edit.apply(&mut record);

    client.stage_edit(record.clone())?;
    client.save(record).await.context("saving record")?;
    println!("updated {id}");
    Ok(())
}

async fn cmd_delete(config: &VaultConfig, id: RecordId) -> Result<()> {
    let mut client = connect(config)?;
    match client.delete(&id).await {
        Ok(()) => {
            println!("deleted {id}");
            Ok(())
        }
        Err(VaultError::NotFound) => anyhow::bail!("no record with id {id}"),
        Err(e) => Err(e).context("deleting record"),
    }
}

// ── `sv copy` / `sv generate` ──────────────────────────────────────────────────

/// Copy, then stay alive until the wipe runs (or ctrl-c wipes immediately).
async fn copy_and_wait(config: &VaultConfig, secret: &str, what: &str) -> Result<()> {
    let guard = ClipboardGuard::from_config(&config.clipboard)?;
    guard.copy(secret).await.context("copying to clipboard")?;
    eprintln!(
        "{what} copied; clipboard clears in {}s (ctrl-c clears now)",
        guard.clear_after().as_secs()
    );

    tokio::select! {
        _ = guard.wait() => {}
        _ = tokio::signal::ctrl_c() => guard.clear_now().await,
    }
    Ok(())
}

async fn cmd_copy(config: &VaultConfig, id: RecordId, field: CopyField) -> Result<()> {
    let mut client = connect(config)?;
    refresh(&mut client).await?;
    let record = client
        .get(&id)
        .with_context(|| format!("no record with id {id}"))?;

    let (secret, what) = match field {
        CopyField::Password => (Zeroizing::new(record.password.clone()), "password"),
        CopyField::Username => (Zeroizing::new(record.username.clone()), "username"),
    };
    copy_and_wait(config, &secret, what).await
}

async fn cmd_generate(config: &VaultConfig, generator: GeneratorArgs, copy: bool) -> Result<()> {
    let password = generate_password(&generator.into())?;
    if copy {
        copy_and_wait(config, &password, "password").await
    } else {
        println!("{}", password.as_str());
        Ok(())
    }
}

// ── `sv config show` ───────────────────────────────────────────────────────────

fn cmd_config_show(config: &VaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();

    let mut shown = config.clone();
    if shown.client.token.is_some() {
        shown.client.token = Some("[REDACTED]".into());
    }
    shown.server.tokens = std::mem::take(&mut shown.server.tokens)
        .into_values()
        .enumerate()
        .map(|(i, owner)| (format!("[REDACTED-{}]", i + 1), owner))
        .collect();

    let rendered = toml::to_string_pretty(&shown).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
