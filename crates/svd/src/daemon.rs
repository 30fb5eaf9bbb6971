//! Server lifecycle: open the store, bind, serve until ctrl-c / SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use sv_core::config::{expand_home, VaultConfig};
use sv_store::EnvelopeStore;

use crate::api::{router, AppState};
use crate::auth::StaticTokenGate;

pub async fn run(config: VaultConfig) -> Result<()> {
    info!("server starting");

    let store = match &config.server.data_file {
        Some(path) => {
            let path = expand_home(path);
            EnvelopeStore::open(&path)
                .with_context(|| format!("opening data file {}", path.display()))?
        }
        None => {
            warn!("server.data_file not set: envelopes are kept in memory only");
            EnvelopeStore::in_memory()
        }
    };

    let gate = StaticTokenGate::from_config(&config.server);
    if gate.is_empty() {
        warn!("server.tokens is empty: every vault request will be rejected with 401");
    } else {
        info!(tokens = gate.len(), "token table loaded");
    }

    let state = AppState::new(Arc::new(store), Arc::new(gate));

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    let addr = listener.local_addr().context("reading bound address")?;
    info!(addr = %addr, "listening on /api/vault, /healthz");

    serve(listener, state).await
}

/// Serve `state` on an already-bound listener until a shutdown signal.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler failed: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
