//! Filesystem watching for one configured directory mapping.
//!
//! Each mapping gets its own watcher task. Raw `notify` events are bridged
//! through an unbounded channel into async, filtered down to create/modify
//! events on regular files, and forwarded to the engine. On startup the task
//! also scans the directory once so files that existed before the daemon
//! came up are tracked too.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use courier_core::DirectoryMapping;

use crate::error::{io_err, DaemonError};
use crate::event::{EngineEvent, FileEventKind};

pub(crate) async fn watch_mapping(
    mapping: DirectoryMapping,
    events_tx: mpsc::Sender<EngineEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();

    // The watcher stops when dropped, so it must live for the whole task.
    let mut _watcher: RecommendedWatcher = notify::recommended_watcher(
        move |event: Result<Event, notify::Error>| {
            let _ = raw_tx.send(event);
        },
    )?;
    _watcher.watch(&mapping.local, RecursiveMode::Recursive)?;
    tracing::info!(
        path = %mapping.local.display(),
        remote = %mapping.remote,
        "watching directory"
    );

    scan_existing(&mapping, &events_tx).await?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = raw_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watch error");
                        continue;
                    }
                };
                let Some(kind) = normalize_kind(&event.kind) else {
                    continue;
                };
                for path in event.paths {
                    if path.is_dir() {
                        continue;
                    }
                    let forwarded = events_tx
                        .send(EngineEvent::File {
                            kind,
                            path,
                            remote_directory: mapping.remote.clone(),
                        })
                        .await;
                    if forwarded.is_err() {
                        // Engine is gone; we are shutting down.
                        return Ok(());
                    }
                }
            }
        }
    }
    Ok(())
}

/// Collapse the notify event taxonomy to the two kinds the engine cares
/// about. Removals need no event: the engine drops a record the moment a
/// stability probe finds the file missing.
fn normalize_kind(kind: &EventKind) -> Option<FileEventKind> {
    match kind {
        EventKind::Create(_) => Some(FileEventKind::Created),
        EventKind::Modify(_) => Some(FileEventKind::Modified),
        _ => None,
    }
}

/// Report files already present under the mapping as synthetic create
/// events, so a daemon restart picks up whatever it missed while down.
async fn scan_existing(
    mapping: &DirectoryMapping,
    events_tx: &mpsc::Sender<EngineEvent>,
) -> Result<(), DaemonError> {
    for path in collect_files(&mapping.local)? {
        tracing::debug!(path = %path.display(), "found pre-existing file");
        let forwarded = events_tx
            .send(EngineEvent::File {
                kind: FileEventKind::Created,
                path,
                remote_directory: mapping.remote.clone(),
            })
            .await;
        if forwarded.is_err() {
            break;
        }
    }
    Ok(())
}

/// Walk `root` and return every regular file beneath it, sorted.
fn collect_files(root: &Path) -> Result<Vec<PathBuf>, DaemonError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            // Deleted between listing and reading; nothing to report.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&dir, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|err| io_err(&dir, err))?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
