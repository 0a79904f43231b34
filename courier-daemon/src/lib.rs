//! Courier daemon runtime: directory watchers + upload lifecycle engine.

mod engine;
mod error;
mod event;
mod record;
mod runtime;
pub mod systemd;
#[cfg(test)]
mod test_support;
mod uploader;
mod watcher;

pub use error::DaemonError;
pub use event::{EngineEvent, FileEventKind, UploadOutcome};
pub use record::{FileSignature, FileStatus, TimerToken};
pub use runtime::{run, start_blocking, supervise};
