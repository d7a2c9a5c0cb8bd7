//! Run command: track usage until SIGINT or SIGTERM.

use std::fs::{self, File, OpenOptions};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fs2::FileExt;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use ut_core::AccountingEngine;
use ut_db::RecoveryStats;

use crate::Config;
use crate::api::{AppState, create_router};
use crate::platform;
use crate::store::{SqliteStore, UsageStore};
use crate::tracker::{Tracker, TrackerSettings};

/// Takes the single-instance lock; held for as long as the file stays open.
pub fn acquire_instance_lock(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open lock file {}", path.display()))?;
    file.try_lock_exclusive().with_context(|| {
        format!(
            "another ut instance is already tracking ({} is locked)",
            path.display()
        )
    })?;
    Ok(file)
}

/// Runs the run command.
pub fn run(config: &Config, no_server: bool) -> Result<()> {
    config.validate().context("invalid configuration")?;
    if let Some(parent) = config.database_path.parent() {
        fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    let _lock = acquire_instance_lock(&config.lock_path())?;

    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("failed to open {}", config.database_path.display()))?,
    );
    let recovered = store
        .recover()
        .context("failed to recover interrupted sessions")?;
    if recovered != RecoveryStats::default() {
        info!(
            sessions = recovered.sessions_closed,
            segments = recovered.segments_closed,
            "closed sessions left open by an earlier run"
        );
    }

    let categories = config.category_table()?;
    let engine = AccountingEngine::new(
        config.engine_config(),
        categories.clone(),
        config.privacy_filter(),
    );
    let tracker = Arc::new(Tracker::new(
        engine,
        platform::default_observer(),
        Arc::clone(&store) as Arc<dyn UsageStore>,
        TrackerSettings {
            poll_interval: config.poll_interval(),
            flush_interval: config.flush_interval(),
        },
    ));
    let api = (!no_server)
        .then(|| AppState::new(Arc::clone(&tracker), store, Arc::new(categories)));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(track(tracker, api, config.server_addr()))
}

async fn track(tracker: Arc<Tracker>, api: Option<AppState>, addr: SocketAddr) -> Result<()> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let server = match api {
        Some(state) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind API to {addr}"))?;
            info!(address = %addr, "API listening");
            Some(tokio::spawn(async move {
                axum::serve(listener, create_router(state))
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.wait_for(|stop| *stop).await;
                    })
                    .await
            }))
        }
        None => None,
    };

    tracker.start().await;
    shutdown_signal().await;

    shutdown_tx.send_replace(true);
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => info!("API stopped"),
            Ok(Err(err)) => warn!(error = %err, "API server failed"),
            Err(err) => warn!(error = %err, "API task failed"),
        }
    }

    tracker.stop().await;
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
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
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, stopping"),
        () = terminate => info!("received SIGTERM, stopping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_instance_lock_fails() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("ut.lock");

        let first = acquire_instance_lock(&path).unwrap();
        let err = acquire_instance_lock(&path).unwrap_err();
        assert!(err.to_string().contains("already tracking"), "{err}");

        drop(first);
        assert!(acquire_instance_lock(&path).is_ok());
    }
}
