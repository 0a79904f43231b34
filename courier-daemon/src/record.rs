//! Per-file lifecycle state tracked by the engine.

use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Identifies the most recently scheduled timer for a path.
///
/// Timers are never cancelled; a fired timer whose token no longer matches
/// the record's current one is stale and its check is discarded. Tokens come
/// from a per-engine counter and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken(pub(crate) u64);

/// Size + mtime snapshot used to judge quiescence. Content is never read;
/// a file counts as stable when its signature survives one full window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignature {
    pub mtime: SystemTime,
    pub len: u64,
}

impl FileSignature {
    /// Snapshot `path`. `Ok(None)` when the path no longer exists or is not
    /// a regular file.
    pub fn probe(path: &Path) -> io::Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(meta) => {
                if meta.is_dir() {
                    return Ok(None);
                }
                let mtime = meta.modified()?;
                Ok(Some(Self {
                    mtime,
                    len: meta.len(),
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Lifecycle states of a tracked file.
///
/// ```text
/// Tracking -> UploadScheduled -> Uploaded -> DeleteScheduled -> (removed)
///     ^              |              |
///     +--- failure --+--- change ---+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Seen a change; waiting out the stability window.
    Tracking,
    /// Stable; an upload has been handed to a worker.
    UploadScheduled,
    /// Remote copy is current; waiting out the retention window.
    Uploaded,
    /// Retention elapsed unchanged; local deletion in progress.
    DeleteScheduled,
}

/// One entry per distinct local path, alive from first observed event until
/// local deletion or shutdown.
#[derive(Debug)]
pub(crate) struct FileRecord {
    /// Target remote folder, fixed at first observation.
    pub(crate) remote_directory: String,
    /// Name assigned by the first successful upload; never renumbered.
    pub(crate) remote_name: Option<String>,
    pub(crate) last_seen: FileSignature,
    pub(crate) status: FileStatus,
    pub(crate) pending_token: TimerToken,
    /// An upload worker holds this path and has not reported back yet.
    pub(crate) upload_in_flight: bool,
}

impl FileRecord {
    pub(crate) fn new(
        remote_directory: String,
        last_seen: FileSignature,
        pending_token: TimerToken,
    ) -> Self {
        Self {
            remote_directory,
            remote_name: None,
            last_seen,
            status: FileStatus::Tracking,
            pending_token,
            upload_in_flight: false,
        }
    }
}
