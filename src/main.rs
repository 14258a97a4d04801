//! Query Cache - admin server
//!
//! Connects to the configured Redis instances and serves the admin API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use query_cache::api::create_router;
use query_cache::backend::{Backend, RedisBackend};
use query_cache::cache::Keyspace;
use query_cache::lock::Redlock;
use query_cache::{spawn_repair_task, AppState, Config, QueryCache};

/// Main entry point for the query cache admin server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect to the cache store and the lock instances
/// 4. Start the background index repair task
/// 5. Serve the admin API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "query_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting query cache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: namespace={}, statistics={}, lock_instances={}, port={}, repair_interval={}s",
        config.namespace,
        config.collect_statistics,
        config.lock_redis_urls.len(),
        config.server_port,
        config.repair_interval
    );

    let store: Arc<dyn Backend> = Arc::new(
        RedisBackend::connect(&config.redis_url, config.operation_timeout())
            .await
            .with_context(|| format!("connecting to cache store at {}", config.redis_url))?,
    );

    let mut lock_instances: Vec<Arc<dyn Backend>> = Vec::with_capacity(config.lock_redis_urls.len());
    for url in &config.lock_redis_urls {
        if *url == config.redis_url {
            lock_instances.push(store.clone());
            continue;
        }
        let instance = RedisBackend::connect(url, config.operation_timeout())
            .await
            .with_context(|| format!("connecting to lock instance at {url}"))?;
        lock_instances.push(Arc::new(instance));
    }

    let locks = Redlock::new(
        lock_instances,
        Keyspace::new(config.namespace.clone()),
        config.lock_config(),
    )?;
    let cache = QueryCache::new(store, Arc::new(locks), config.cache_config());
    info!("Query cache initialized");

    let repair_handle = (config.repair_interval > 0)
        .then(|| spawn_repair_task(cache.clone(), config.repair_interval));

    let app = create_router(AppState::new(cache));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(repair_handle))
        .await
        .context("serving admin API")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the repair task.
async fn shutdown_signal(repair_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
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

    if let Some(handle) = repair_handle {
        handle.abort();
        warn!("Index repair task aborted");
    }
}
