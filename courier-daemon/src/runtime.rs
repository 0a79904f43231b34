//! Daemon runtime: startup validation, task supervision, shutdown.
//!
//! `run` wires one watcher task per configured mapping and one engine task
//! to a shared shutdown broadcast. Any task finishing sends the shutdown
//! signal, so a dead watcher brings the whole daemon down instead of
//! leaving it half-alive.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinError;

use courier_core::{Config, DirectoryMapping};
use courier_webdav::RemoteStore;

use crate::engine;
use crate::error::{io_err, DaemonError};
use crate::watcher;

/// Events from every watcher plus the engine's own timers share one queue.
const EVENT_CHANNEL_DEPTH: usize = 1024;

/// Set up tracing and a multi-threaded runtime, then run until shutdown.
pub fn start_blocking(config: Config, store: Arc<dyn RemoteStore>) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_err("tokio-runtime", err))?;
    runtime.block_on(run(config, store))
}

pub async fn run(config: Config, store: Arc<dyn RemoteStore>) -> Result<(), DaemonError> {
    let (shutdown_tx, _) = broadcast::channel(16);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let result = signal_task(shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let result = supervise(config, store, shutdown_tx.clone()).await;
    let _ = shutdown_tx.send(());
    handle_join("signal_handler", signal_handle.await)?;
    result
}

/// Validate the configuration against the remote store, then spawn and
/// supervise the watcher and engine tasks until the first one exits.
pub async fn supervise(
    config: Config,
    store: Arc<dyn RemoteStore>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let mut startup_rx = shutdown_tx.subscribe();
    let mappings = validate_startup(&config, store.clone()).await?;
    if startup_rx.try_recv().is_ok() {
        // A signal can land while the connection test is still running.
        return Ok(());
    }

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);

    let mut watcher_handles = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let handle = {
            let shutdown = shutdown_tx.clone();
            let shutdown_rx = shutdown_tx.subscribe();
            let events_tx = events_tx.clone();
            tokio::spawn(async move {
                let result = watcher::watch_mapping(mapping, events_tx, shutdown_rx).await;
                let _ = shutdown.send(());
                result
            })
        };
        watcher_handles.push(handle);
    }

    let engine_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let store = store.clone();
        let stability_window = config.upload_stability_window();
        let retention_window = config.delete_retention_window();
        let engine_events_tx = events_tx.clone();
        tokio::spawn(async move {
            let result = engine::engine_task(
                store,
                stability_window,
                retention_window,
                engine_events_tx,
                events_rx,
                shutdown_rx,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };
    drop(events_tx);

    for handle in watcher_handles {
        handle_join("watcher", handle.await)?;
    }
    handle_join("engine", engine_handle.await)?;
    Ok(())
}

/// Check the remote store is reachable and every remote directory exists,
/// and keep only the mappings whose local directory is present.
///
/// An unreachable store or a remote directory that cannot be created is
/// fatal; a missing local directory only costs that one mapping.
async fn validate_startup(
    config: &Config,
    store: Arc<dyn RemoteStore>,
) -> Result<Vec<DirectoryMapping>, DaemonError> {
    {
        let store = store.clone();
        tokio::task::spawn_blocking(move || store.test_connection())
            .await
            .map_err(|err| DaemonError::Task(format!("connection test join error: {err}")))??;
    }
    tracing::info!(server = %config.server_url, "remote store reachable");

    let mut usable = Vec::new();
    for mapping in &config.directories {
        if !mapping.local.is_dir() {
            tracing::warn!(
                path = %mapping.local.display(),
                "local directory missing, mapping skipped"
            );
            continue;
        }
        {
            let store = store.clone();
            let remote = mapping.remote.clone();
            tokio::task::spawn_blocking(move || store.ensure_directory(&remote))
                .await
                .map_err(|err| DaemonError::Task(format!("directory setup join error: {err}")))??;
        }
        tracing::info!(
            path = %mapping.local.display(),
            remote = %mapping.remote,
            "mapping ready"
        );
        usable.push(mapping.clone());
    }

    if usable.is_empty() {
        return Err(DaemonError::NoUsableDirectories);
    }
    Ok(usable)
}

#[cfg(unix)]
async fn signal_task(mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|err| io_err("sigterm handler", err))?;
    tokio::select! {
        _ = shutdown_rx.recv() => {}
        result = tokio::signal::ctrl_c() => {
            result.map_err(|err| io_err("ctrl-c handler", err))?;
            tracing::info!("received ctrl-c, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_task(mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), DaemonError> {
    tokio::select! {
        _ = shutdown_rx.recv() => {}
        result = tokio::signal::ctrl_c() => {
            result.map_err(|err| io_err("ctrl-c handler", err))?;
            tracing::info!("received ctrl-c, shutting down");
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(result) => result,
        Err(err) => Err(DaemonError::Task(format!("{task} task join failure: {err}"))),
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
