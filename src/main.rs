//! dash_cache server
//!
//! Serves the dashboard cache over HTTP with TTL cleanup and optional persistence.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dash_cache::api::create_router;
use dash_cache::persistence::PersistenceHandle;
use dash_cache::{spawn_cleanup_task, AppState, Config};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the cache, rehydrating from persistence when configured
/// 4. Start background TTL cleanup task
/// 5. Serve HTTP until SIGINT/SIGTERM, then flush persistence
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dash_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting dash_cache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, max_size_bytes={}, default_ttl_ms={}, policy={}, persistence={:?}, port={}",
        config.max_entries,
        config.max_size_bytes,
        config.default_ttl_ms,
        config.eviction_policy.name(),
        config.persistence,
        config.server_port
    );

    let state = AppState::from_config(&config)
        .await
        .context("failed to open persistence backend")?;
    let persistence = state.cache.read().await.persistence();
    info!("Cache initialized");

    let cleanup_handle = spawn_cleanup_task(
        state.cache.clone(),
        state.sweeper.clone(),
        config.cleanup_interval,
    );
    info!("Background cleanup task started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle, persistence))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// Aborts the cleanup task, then waits for queued persistence writes.
async fn shutdown_signal(
    cleanup_handle: tokio::task::JoinHandle<()>,
    persistence: Option<PersistenceHandle>,
) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cleanup_handle.abort();
    warn!("Cleanup task aborted");

    if let Some(handle) = persistence {
        handle.flush().await;
        let status = handle.status();
        info!(
            "Persistence flushed: applied={}, dropped={}, failed={}",
            status.applied, status.dropped, status.failed
        );
    }
}
