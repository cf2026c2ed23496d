mod config;
mod error;
mod middleware;
mod routes;
mod state;

use std::sync::Arc;

use doclake_core::history::{Watcher, CREATED_AT_FIELD, OBJECT_ID_FIELD};
use doclake_core::store::{Database, Index, OrderBy, PostgresBackend};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::state::{AppState, WatcherStatus};

/// Name of the index that makes duplicate deliveries of one event collide.
const HISTORY_INDEX: &str = "object_id_created_at";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience)
    let _ = dotenvy::dotenv();

    let config = config::AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    tracing::info!("Starting doclake history service");

    let backend = PostgresBackend::connect(&config.connection_settings())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {e}"))?;
    backend
        .migrate()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;
    tracing::info!("Database migrations applied");

    let database = Database::new(Arc::new(backend));
    let (watcher, history) = Watcher::new(&database, &config.history_collection)?;
    history
        .create_unique_index(
            &Index::new(HISTORY_INDEX)
                .key(OBJECT_ID_FIELD, OrderBy::Asc)
                .key(CREATED_AT_FIELD, OrderBy::Asc),
        )
        .await?;

    let state = AppState::new(database, history);
    let cancel = CancellationToken::new();

    let watcher_task = {
        let state = state.clone();
        let cancel = cancel.clone();
        let collections = config.watch_collections.clone();
        tokio::spawn(async move {
            let names: Vec<&str> = collections.iter().map(String::as_str).collect();
            let outcome = watcher.watch(cancel, &names).await;
            match &outcome {
                Ok(()) => state.set_watcher_status(WatcherStatus::Stopped),
                Err(err) => {
                    tracing::error!(%err, "History watcher failed");
                    state.set_watcher_status(WatcherStatus::Failed(err.to_string()));
                }
            }
            outcome
        })
    };

    let app = routes::build_router(state.clone());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {addr}");

    let shutdown = {
        let cancel = cancel.clone();
        let state = state.clone();
        async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = state.watcher_failed() => {
                    tracing::error!("Shutting down after watcher failure");
                }
            }
            cancel.cancel();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    cancel.cancel();
    watcher_task.await??;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { tracing::info!("Received Ctrl+C, shutting down..."); }
        _ = terminate => { tracing::info!("Received SIGTERM, shutting down..."); }
    }
}
