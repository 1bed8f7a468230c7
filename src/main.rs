//! Blitz Cache service binary
//!
//! Serves the HTTP admin API over a `CacheManager` configured from the
//! environment.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blitz_cache::api::create_router;
use blitz_cache::{spawn_sweep_task, AppState, Config};

/// # Startup Sequence
/// 1. Initialize tracing
/// 2. Load configuration from environment variables
/// 3. Resolve the cache driver (misconfiguration aborts startup)
/// 4. Start the sweep job when `SWEEP_INTERVAL` > 0
/// 5. Serve until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blitz_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Blitz Cache");

    let config = Config::from_env();
    info!(
        handler = %config.cache.handler,
        prefix = %config.cache.prefix,
        default_ttl = config.cache.duration,
        port = config.server_port,
        sweep_interval = config.sweep_interval,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config);
    let handler = state
        .cache
        .handler()
        .await
        .context("failed to initialize cache handler")?;
    info!(driver = handler.name(), "Cache handler ready");

    let sweep_handle = (config.sweep_interval > 0)
        .then(|| spawn_sweep_task(state.cache.clone(), config.sweep_interval));

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sweep_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then stops the sweep job.
async fn shutdown_signal(sweep_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    if let Some(handle) = sweep_handle {
        handle.abort();
        warn!("Sweep task aborted");
    }
}
