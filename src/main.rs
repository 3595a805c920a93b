//! Tiered Cache - admin server and background tasks
//!
//! Runs one cache instance: the invalidation listener, the domain event
//! consumer, the local TTL sweep, and the admin HTTP API.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_cache::api::{create_router, AppState};
use tiered_cache::tasks::EVENT_CHANNEL_CAPACITY;
use tiered_cache::{
    spawn_cleanup_task, spawn_event_consumer, spawn_invalidation_listener, CacheRuntime, Config,
};

/// Main entry point for the tiered cache service.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Wire the tiers, bus and coordinator
/// 4. Start the invalidation listener, event consumer and TTL cleanup
/// 5. Start the admin HTTP server on the configured port
/// 6. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tiered Cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: instance_id={}, local_max_entries={}, distributed_timeout={}ms, port={}, cleanup_interval={}s, namespaces={}",
        config.instance_id,
        config.local_max_entries,
        config.distributed_timeout_ms,
        config.server_port,
        config.cleanup_interval,
        config.namespaces.len()
    );

    let runtime = CacheRuntime::from_config(&config)
        .await
        .context("invalid cache configuration")?;
    info!(
        distributed = runtime.coordinator.distributed().backend_name(),
        bus = runtime.coordinator.bus().backend_name(),
        "Cache tiers initialized"
    );

    let listener_handle = spawn_invalidation_listener(runtime.coordinator.clone())
        .await
        .context("failed to subscribe to the invalidation bus")?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let consumer_handle = spawn_event_consumer(runtime.events.clone(), event_rx);

    let cleanup_handle =
        spawn_cleanup_task(runtime.coordinator.local().clone(), config.cleanup_interval);
    info!("Background tasks started");

    let app = create_router(AppState::new(&runtime, event_tx));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(vec![
            listener_handle,
            consumer_handle,
            cleanup_handle,
        ]))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the background tasks and allows graceful shutdown.
async fn shutdown_signal(handles: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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

    for handle in &handles {
        handle.abort();
    }
    warn!("Background tasks aborted");
}
