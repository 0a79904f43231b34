//! The file lifecycle engine.
//!
//! One engine task owns the record map and consumes a single ordered event
//! channel. Watchers feed filesystem events into it; stability and retention
//! timers, plus upload completions, re-enter through the same channel as
//! synthetic events. Nothing else ever touches a record, so no per-record
//! locking exists.
//!
//! Debounce works by token supersession: every observed change stamps the
//! record with a fresh [`TimerToken`] and schedules a check; a check that
//! fires with an older token is discarded. A pending delete timer is
//! cancelled the same way, since a new change also refreshes the token.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use courier_webdav::{RemoteError, RemoteStore};

use crate::error::DaemonError;
use crate::event::{EngineEvent, FileEventKind, UploadOutcome};
use crate::record::{FileRecord, FileSignature, FileStatus, TimerToken};
use crate::uploader;

/// Consume engine events until shutdown.
pub(crate) async fn engine_task(
    store: Arc<dyn RemoteStore>,
    stability_window: Duration,
    retention_window: Duration,
    events_tx: mpsc::Sender<EngineEvent>,
    mut events_rx: mpsc::Receiver<EngineEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut engine = Engine::new(store, stability_window, retention_window, events_tx);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                engine.handle(event);
            }
        }
    }
    Ok(())
}

pub(crate) struct Engine {
    records: HashMap<PathBuf, FileRecord>,
    store: Arc<dyn RemoteStore>,
    /// Timers and upload workers post back through this sender.
    events_tx: mpsc::Sender<EngineEvent>,
    stability_window: Duration,
    retention_window: Duration,
    token_counter: u64,
}

impl Engine {
    pub(crate) fn new(
        store: Arc<dyn RemoteStore>,
        stability_window: Duration,
        retention_window: Duration,
        events_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        Self {
            records: HashMap::new(),
            store,
            events_tx,
            stability_window,
            retention_window,
            token_counter: 0,
        }
    }

    pub(crate) fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::File {
                kind,
                path,
                remote_directory,
            } => self.handle_file_event(kind, path, remote_directory),
            EngineEvent::UploadCheck { path, token } => self.handle_upload_check(path, token),
            EngineEvent::UploadDone {
                path,
                token,
                outcome,
            } => self.handle_upload_done(path, token, outcome),
            EngineEvent::DeleteCheck { path, token } => self.handle_delete_check(path, token),
        }
    }

    fn fresh_token(&mut self) -> TimerToken {
        self.token_counter += 1;
        TimerToken(self.token_counter)
    }

    /// Post `event` back into the engine channel after `delay`.
    fn schedule(&self, delay: Duration, event: EngineEvent) {
        let events_tx = self.events_tx.clone();
        // The deadline is `delay` from now, not from the spawned task's
        // first poll; under a paused test clock the two differ.
        let sleep = tokio::time::sleep(delay);
        tokio::spawn(async move {
            sleep.await;
            let _ = events_tx.send(event).await;
        });
    }

    fn handle_file_event(&mut self, kind: FileEventKind, path: PathBuf, remote_directory: String) {
        let signature = match FileSignature::probe(&path) {
            Ok(Some(signature)) => signature,
            Ok(None) => {
                // Raced a deletion, or the event was for a directory.
                self.records.remove(&path);
                return;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot stat file, dropping record");
                self.records.remove(&path);
                return;
            }
        };

        let token = self.fresh_token();
        let record = self
            .records
            .entry(path.clone())
            .or_insert_with(|| FileRecord::new(remote_directory, signature, token));
        record.last_seen = signature;
        record.status = FileStatus::Tracking;
        // Supersedes any pending upload or delete timer for this path.
        record.pending_token = token;

        tracing::debug!(path = %path.display(), kind = ?kind, "tracking change");
        self.schedule(
            self.stability_window,
            EngineEvent::UploadCheck { path, token },
        );
    }

    fn handle_upload_check(&mut self, path: PathBuf, token: TimerToken) {
        let Some(record) = self.records.get(&path) else {
            return;
        };
        if record.pending_token != token {
            return;
        }
        let last_seen = record.last_seen;
        let in_flight = record.upload_in_flight;
        let remote_directory = record.remote_directory.clone();
        let remote_name = record.remote_name.clone();

        let signature = match FileSignature::probe(&path) {
            Ok(Some(signature)) => signature,
            Ok(None) => {
                tracing::info!(path = %path.display(), "file removed before upload, dropping record");
                self.records.remove(&path);
                return;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot stat file, dropping record");
                self.records.remove(&path);
                return;
            }
        };

        if signature != last_seen {
            // Still being written; restart the stability window.
            let fresh = self.fresh_token();
            if let Some(record) = self.records.get_mut(&path) {
                record.last_seen = signature;
                record.pending_token = fresh;
            }
            tracing::debug!(path = %path.display(), "file still changing, stability window restarted");
            self.schedule(
                self.stability_window,
                EngineEvent::UploadCheck { path, token: fresh },
            );
            return;
        }

        if in_flight {
            // An upload of an older signature has not reported back yet.
            // Check again after another window instead of racing it.
            let fresh = self.fresh_token();
            if let Some(record) = self.records.get_mut(&path) {
                record.pending_token = fresh;
            }
            self.schedule(
                self.stability_window,
                EngineEvent::UploadCheck { path, token: fresh },
            );
            return;
        }

        if let Some(record) = self.records.get_mut(&path) {
            record.status = FileStatus::UploadScheduled;
            record.upload_in_flight = true;
        }
        tracing::info!(path = %path.display(), "file stable, uploading");
        self.spawn_upload(path, remote_directory, remote_name, token);
    }

    /// Run the upload on the blocking pool and post the outcome back.
    fn spawn_upload(
        &self,
        path: PathBuf,
        remote_directory: String,
        remote_name: Option<String>,
        token: TimerToken,
    ) {
        let store = self.store.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let blocking_path = path.clone();
            let outcome = match tokio::task::spawn_blocking(move || {
                uploader::perform_upload(
                    store.as_ref(),
                    &blocking_path,
                    &remote_directory,
                    remote_name.as_deref(),
                )
            })
            .await
            {
                Ok(outcome) => outcome,
                Err(err) => UploadOutcome::Failed {
                    error: RemoteError::Io {
                        path: path.clone(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::Other,
                            format!("upload task join error: {err}"),
                        ),
                    },
                },
            };
            let _ = events_tx
                .send(EngineEvent::UploadDone {
                    path,
                    token,
                    outcome,
                })
                .await;
        });
    }

    fn handle_upload_done(&mut self, path: PathBuf, token: TimerToken, outcome: UploadOutcome) {
        let Some(record) = self.records.get_mut(&path) else {
            tracing::debug!(path = %path.display(), "upload finished for a dropped record");
            return;
        };
        record.upload_in_flight = false;
        let superseded = record.pending_token != token;

        let name = match outcome {
            UploadOutcome::Created { name } => {
                if record.remote_name.is_none() {
                    // The remote object exists now even if a newer change
                    // superseded this upload; later uploads must update it.
                    record.remote_name = Some(name.clone());
                }
                if superseded {
                    tracing::debug!(path = %path.display(), "upload overtaken by a newer change");
                    return;
                }
                record.status = FileStatus::Uploaded;
                tracing::info!(path = %path.display(), name = %name, "uploaded");
                name
            }
            UploadOutcome::Updated { name } => {
                if superseded {
                    tracing::debug!(path = %path.display(), "upload overtaken by a newer change");
                    return;
                }
                record.status = FileStatus::Uploaded;
                tracing::info!(path = %path.display(), name = %name, "remote copy updated");
                name
            }
            UploadOutcome::Failed { error } => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "upload failed, will retry on the next change"
                );
                if !superseded {
                    record.status = FileStatus::Tracking;
                }
                return;
            }
        };

        let fresh = self.fresh_token();
        if let Some(record) = self.records.get_mut(&path) {
            record.pending_token = fresh;
        }
        tracing::debug!(path = %path.display(), name = %name, "retention window started");
        self.schedule(
            self.retention_window,
            EngineEvent::DeleteCheck { path, token: fresh },
        );
    }

    fn handle_delete_check(&mut self, path: PathBuf, token: TimerToken) {
        let Some(record) = self.records.get(&path) else {
            return;
        };
        if record.pending_token != token {
            // Modified since the upload; the delete is cancelled.
            return;
        }
        if record.status != FileStatus::Uploaded {
            return;
        }
        let last_seen = record.last_seen;

        match FileSignature::probe(&path) {
            Ok(Some(signature)) if signature == last_seen => {
                if let Some(record) = self.records.get_mut(&path) {
                    record.status = FileStatus::DeleteScheduled;
                }
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), "retention elapsed, local copy deleted");
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "failed to delete local copy");
                    }
                }
                // Terminal either way; a reappearing path starts a new record.
                self.records.remove(&path);
            }
            Ok(Some(_)) => {
                // Changed without a filesystem event reaching us. Leave the
                // record for the next event to pick up.
                tracing::debug!(path = %path.display(), "file changed since upload, keeping local copy");
            }
            Ok(None) => {
                self.records.remove(&path);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot stat file, dropping record");
                self.records.remove(&path);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;
    use tokio::time::advance;

    use crate::test_support::{Call, MockStore};

    const STABILITY: Duration = Duration::from_secs(10);
    const RETENTION: Duration = Duration::from_secs(600);

    struct Harness {
        engine: Engine,
        events_rx: mpsc::Receiver<EngineEvent>,
        store: Arc<MockStore>,
        dir: TempDir,
    }

    /// The test plays the engine loop itself: it feeds events into the
    /// handlers and pumps timer/worker output back in via `step`.
    fn harness() -> Harness {
        let (events_tx, events_rx) = mpsc::channel(64);
        let store = Arc::new(MockStore::default());
        let engine = Engine::new(store.clone(), STABILITY, RETENTION, events_tx);
        Harness {
            engine,
            events_rx,
            store,
            dir: TempDir::new().expect("tempdir"),
        }
    }

    fn harness_with_store(store: MockStore) -> Harness {
        let (events_tx, events_rx) = mpsc::channel(64);
        let store = Arc::new(store);
        let engine = Engine::new(store.clone(), STABILITY, RETENTION, events_tx);
        Harness {
            engine,
            events_rx,
            store,
            dir: TempDir::new().expect("tempdir"),
        }
    }

    impl Harness {
        fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, contents).expect("write");
            path
        }

        fn file_event(&mut self, path: &Path) {
            self.engine.handle(EngineEvent::File {
                kind: FileEventKind::Modified,
                path: path.to_path_buf(),
                remote_directory: "/out".to_string(),
            });
        }

        async fn step(&mut self) -> &'static str {
            let event = self.events_rx.recv().await.expect("engine event");
            let label = match &event {
                EngineEvent::File { .. } => "file",
                EngineEvent::UploadCheck { .. } => "upload_check",
                EngineEvent::UploadDone { .. } => "upload_done",
                EngineEvent::DeleteCheck { .. } => "delete_check",
            };
            self.engine.handle(event);
            label
        }

        fn status_of(&self, path: &Path) -> Option<FileStatus> {
            self.engine.records.get(path).map(|r| r.status)
        }

        fn remote_name_of(&self, path: &Path) -> Option<String> {
            self.engine
                .records
                .get(path)
                .and_then(|r| r.remote_name.clone())
        }
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn stable_file_is_uploaded_once() {
        let mut h = harness();
        let path = h.write("a.txt", b"hello");
        h.file_event(&path);

        advance(STABILITY).await;
        assert_eq!(h.step().await, "upload_check");
        assert_eq!(h.step().await, "upload_done");

        assert_eq!(
            h.store.calls(),
            vec![Call::Exists("a.txt".into()), Call::Create("a.txt".into())]
        );
        assert_eq!(h.status_of(&path), Some(FileStatus::Uploaded));
        assert_eq!(h.remote_name_of(&path), Some("a.txt".to_string()));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn burst_of_events_collapses_to_one_upload() {
        let mut h = harness();
        let path = h.write("a.txt", b"hello");

        // Five events two seconds apart, all inside one stability window.
        for _ in 0..5 {
            h.file_event(&path);
            advance(Duration::from_secs(2)).await;
        }

        // The first four checks fire with stale tokens and are discarded;
        // only the fifth reaches the store.
        for _ in 0..4 {
            assert_eq!(h.step().await, "upload_check");
            assert_eq!(h.store.created_count(), 0, "stale check must not upload");
        }
        advance(STABILITY).await;
        assert_eq!(h.step().await, "upload_check");
        assert_eq!(h.step().await, "upload_done");

        assert_eq!(h.store.created_count(), 1);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn change_during_window_restarts_the_clock() {
        let mut h = harness();
        let path = h.write("a.txt", b"hello");
        h.file_event(&path);

        // Grow the file without delivering an event, as if the notification
        // was coalesced away.
        h.write("a.txt", b"hello world");

        advance(STABILITY).await;
        assert_eq!(h.step().await, "upload_check");
        assert_eq!(h.store.created_count(), 0, "changed file must not upload yet");
        assert_eq!(h.status_of(&path), Some(FileStatus::Tracking));

        advance(STABILITY).await;
        assert_eq!(h.step().await, "upload_check");
        assert_eq!(h.step().await, "upload_done");
        assert_eq!(h.store.created_count(), 1);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn modification_after_upload_updates_and_cancels_delete() {
        let mut h = harness();
        let path = h.write("a.txt", b"v1");
        h.file_event(&path);
        advance(STABILITY).await;
        h.step().await;
        h.step().await;
        assert_eq!(h.status_of(&path), Some(FileStatus::Uploaded));

        // Modified inside the retention window.
        h.write("a.txt", b"v2 with more bytes");
        h.file_event(&path);
        advance(STABILITY).await;
        assert_eq!(h.step().await, "upload_check");

        // The stale delete timer from the first upload may auto-fire while
        // the update is on the blocking pool; its token no longer matches,
        // so it must not touch the file.
        loop {
            if h.step().await == "upload_done" {
                break;
            }
        }
        assert!(path.exists(), "cancelled delete must leave the file alone");
        assert_eq!(
            h.store.calls(),
            vec![
                Call::Exists("a.txt".into()),
                Call::Create("a.txt".into()),
                Call::Update("a.txt".into()),
            ],
            "the second upload must be an update, not a second create"
        );

        // Only the delete rescheduled by the update may remove the file.
        for _ in 0..3 {
            if !path.exists() {
                break;
            }
            assert_eq!(h.step().await, "delete_check");
        }
        assert!(!path.exists());
        assert!(h.engine.records.is_empty());
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn retention_elapsed_deletes_local_copy_exactly_once() {
        let mut h = harness();
        let path = h.write("a.txt", b"hello");
        h.file_event(&path);
        advance(STABILITY).await;
        h.step().await;
        h.step().await;

        let token = h.engine.records.get(&path).map(|r| r.pending_token);
        advance(RETENTION).await;
        assert_eq!(h.step().await, "delete_check");
        assert!(!path.exists());
        assert!(h.engine.records.is_empty(), "record removal is terminal");

        // A duplicate delete check for the removed record is a no-op.
        let token = token.expect("token");
        h.engine.handle(EngineEvent::DeleteCheck {
            path: path.clone(),
            token,
        });
        assert!(h.engine.records.is_empty());
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn failed_upload_returns_to_tracking_and_retries_on_next_event() {
        let mut h = harness();
        h.store.fail_next_creates(1);
        let path = h.write("a.txt", b"hello");
        h.file_event(&path);

        advance(STABILITY).await;
        h.step().await;
        assert_eq!(h.step().await, "upload_done");
        assert!(path.exists(), "failed upload must leave the local file");
        assert_eq!(h.status_of(&path), Some(FileStatus::Tracking));
        assert_eq!(h.remote_name_of(&path), None);

        // No background retry: nothing happens until another event arrives.
        h.file_event(&path);
        advance(STABILITY).await;
        h.step().await;
        h.step().await;
        assert_eq!(h.status_of(&path), Some(FileStatus::Uploaded));
        assert_eq!(h.store.created_count(), 2, "one failed and one successful create");
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn file_removed_before_check_drops_the_record() {
        let mut h = harness();
        let path = h.write("a.txt", b"hello");
        h.file_event(&path);
        fs::remove_file(&path).expect("remove");

        advance(STABILITY).await;
        assert_eq!(h.step().await, "upload_check");
        assert!(h.engine.records.is_empty());
        assert!(h.store.calls().is_empty(), "vanished file must not upload");
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn directory_events_are_ignored() {
        let mut h = harness();
        let subdir = h.dir.path().join("nested");
        fs::create_dir(&subdir).expect("mkdir");
        h.file_event(&subdir);
        assert!(h.engine.records.is_empty());
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn in_flight_upload_is_never_raced_by_a_second_one() {
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let store = MockStore::default();
        store.gate_next_create(release_rx);
        let mut h = harness_with_store(store);

        let path = h.write("a.txt", b"hello");
        h.file_event(&path);
        advance(STABILITY).await;
        assert_eq!(h.step().await, "upload_check");

        // A second stability check fires while the first upload is still
        // blocked inside the store; it must re-arm, not upload again.
        h.file_event(&path);
        advance(STABILITY).await;
        assert_eq!(h.step().await, "upload_check");

        release_tx.send(()).expect("release gated create");
        // Pump until the gated upload reports back; auto-advanced rechecks
        // in between keep re-arming and never start a second upload.
        loop {
            if h.step().await == "upload_done" {
                break;
            }
        }

        assert_eq!(h.store.created_count(), 1);
        assert_eq!(
            h.remote_name_of(&path),
            Some("a.txt".to_string()),
            "a superseded create must still record the remote name"
        );

        // The next stable check turns into an update of the recorded name.
        loop {
            h.step().await;
            let calls = h.store.calls();
            if calls.iter().any(|c| matches!(c, Call::Update(_))) {
                break;
            }
        }
        assert_eq!(h.store.created_count(), 1, "still exactly one create");
    }
}
