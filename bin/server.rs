// Account Ledger - Web Server

use std::sync::Arc;

use account_ledger::api::{router, serve_with_grace, AppState, SHUTDOWN_GRACE};
use account_ledger::config::Config;
use account_ledger::{logging, AccountService, SqliteStore, TracingLog};
use anyhow::{Context, Result};
use clap::Parser;

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Guard lives until the end of main so buffered file logs get flushed
    let _log_guard = logging::init(&config.log_config()?)?;

    // A store we cannot open is the one fatal startup error
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    let accounts = store.count().context("Failed to query database")?;
    tracing::info!(path = %config.db_path.display(), accounts, "database opened");

    let service = AccountService::new(Arc::new(store), TracingLog::shared());
    let app = router(AppState::new(service, config.request_timeout()));

    let addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!(%addr, "server listening");

    serve_with_grace(listener, app, shutdown_signal(), SHUTDOWN_GRACE)
        .await
        .context("Server failed")?;

    tracing::info!("server shutdown completed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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

    tracing::info!("shutdown signal received");
}
