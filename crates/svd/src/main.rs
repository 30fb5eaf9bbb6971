//! svd: SealVault server
//!
//! Usage:
//!   svd [--config /etc/sealvault/config.toml] [--listen 0.0.0.0:5000]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use sv_core::config::VaultConfig;
use svd::logging::{init_logging, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "svd", version, about = "SealVault server")]
struct Cli {
    /// Path to the SealVault TOML configuration file
    #[arg(
        long,
        short = 'c',
        env = "SV_CONFIG",
        default_value = "/etc/sealvault/config.toml"
    )]
    config: PathBuf,

    /// Override server.listen from the config file
    #[arg(long, env = "SV_LISTEN")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SV_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "SV_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, cli.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "svd starting"
    );

    let mut config = VaultConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    svd::daemon::run(config).await
}
