//! Events consumed by the lifecycle engine's single processing loop.

use std::path::PathBuf;

use courier_webdav::RemoteError;

use crate::record::TimerToken;

/// Normalized filesystem notification kinds. The engine treats both the
/// same way; the distinction only survives into the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
}

/// Result of one background upload attempt.
#[derive(Debug)]
pub enum UploadOutcome {
    /// A new remote object was created under `name` (conflict renames
    /// already applied).
    Created { name: String },
    /// The existing remote object `name` was overwritten.
    Updated { name: String },
    Failed { error: RemoteError },
}

/// Everything that can enter the engine loop.
///
/// Watchers send `File`; timers and upload workers re-enter through the same
/// ordered channel, so the record map has exactly one writer and no timer
/// ever mutates state from its own task.
#[derive(Debug)]
pub enum EngineEvent {
    /// A filesystem change under a watched mapping.
    File {
        kind: FileEventKind,
        path: PathBuf,
        remote_directory: String,
    },
    /// Stability window elapsed for `path`; decide whether to upload.
    UploadCheck { path: PathBuf, token: TimerToken },
    /// A background upload finished.
    UploadDone {
        path: PathBuf,
        token: TimerToken,
        outcome: UploadOutcome,
    },
    /// Retention window elapsed for `path`; decide whether to delete locally.
    DeleteCheck { path: PathBuf, token: TimerToken },
}
