//! sync-server binary entry point.
//!
//! Usage:
//! ```bash
//! sync-server --config sync.toml
//! ```

use anyhow::Context;
use filesync_sync_server::config::{Config, LogFormat};
use filesync_sync_server::http::{build_router, health};
use filesync_sync_server::maintenance::spawn_maintenance_task;
use filesync_sync_server::server::SyncServer;
use filesync_sync_server::storage::SqliteStorage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = get_config_path();
    let config = load_config(&config_path)?;
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "starting sync-server"
    );

    let storage = SqliteStorage::new(&config.storage.database)
        .await
        .with_context(|| format!("opening {}", config.storage.database.display()))?;
    let bind_address = config.server.bind_address.clone();
    let shrink_every = Duration::from_secs(config.limits.shrink_interval_secs);

    let (server, tasks) = SyncServer::new(config, Arc::new(storage.clone()));
    health::init_start_time();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = tasks.spawn(shutdown_rx.clone());
    handles.push(spawn_maintenance_task(
        server.rate_limits().clone(),
        shrink_every,
        shutdown_rx,
    ));

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    tracing::info!(address = %bind_address, "listening");

    axum::serve(listener, build_router(server))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    tracing::info!("shutting down background tasks");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "background task ended abnormally");
        }
    }
    storage.close().await;
    Ok(())
}

fn get_config_path() -> PathBuf {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sync.toml"))
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        return Config::load(path).with_context(|| format!("loading {}", path.display()));
    }
    let config = Config::default();
    config.validate().context("default configuration is invalid")?;
    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
