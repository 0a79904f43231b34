//! Error types for courier-webdav.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// All errors that can arise from remote store operations.
///
/// `Conflict` is the only variant callers are expected to branch on: it means
/// a create was refused because the name is already taken, and the caller
/// picks another name. Everything else is reported upward as an upload
/// failure.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection-level failure: DNS, TLS, refused, timed out.
    #[error("network error talking to {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: ureq::Transport,
    },

    /// The server rejected our credentials (401) or forbade access (403).
    #[error("authentication rejected by {url} (HTTP {status})")]
    Auth { url: String, status: u16 },

    /// A create was refused because the remote name is already taken.
    #[error("remote name already taken: {name}")]
    Conflict { name: String },

    /// The server reported exhausted storage (HTTP 507).
    #[error("server out of storage at {url} (HTTP 507)")]
    ServerFull { url: String },

    /// Local I/O failure reading the file to upload.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other unexpected HTTP status.
    #[error("unexpected response from {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// The configured server URL cannot be used.
    #[error("invalid server URL {url}: {reason}")]
    BadUrl { url: String, reason: String },
}

/// Convenience constructor for [`RemoteError::Io`].
pub(crate) fn io_err(path: &Path, source: std::io::Error) -> RemoteError {
    RemoteError::Io {
        path: path.to_path_buf(),
        source,
    }
}
