use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime and systemd management.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("remote store error: {0}")]
    Remote(#[from] courier_webdav::RemoteError),

    #[error("no watched directory is usable")]
    NoUsableDirectories,

    #[error("daemon task error: {0}")]
    Task(String),

    #[error("systemd error: {0}")]
    Systemd(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
