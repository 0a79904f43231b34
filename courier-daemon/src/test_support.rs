//! In-memory remote store double shared by the unit tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Mutex;

use courier_webdav::{RemoteError, RemoteRef, RemoteStore};

/// Remote calls observed by [`MockStore`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Exists(String),
    Create(String),
    Update(String),
    Ensure(String),
}

/// Scriptable [`RemoteStore`] double. All knobs are interior so a single
/// `Arc<MockStore>` can be shared with the engine and inspected afterwards.
#[derive(Default)]
pub(crate) struct MockStore {
    calls: Mutex<Vec<Call>>,
    /// Objects the store admits to, keyed `directory/name`.
    existing: Mutex<HashSet<String>>,
    /// Objects that exist but are invisible to `name_exists`, to simulate a
    /// writer racing between probe and reservation.
    hidden: Mutex<HashSet<String>>,
    fail_creates: Mutex<u32>,
    fail_exists: Mutex<u32>,
    fail_connection: Mutex<bool>,
    /// When set, the next create blocks until the sender side releases it.
    gate: Mutex<Option<Receiver<()>>>,
}

impl MockStore {
    pub(crate) fn with_existing(directory: &str, names: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut existing = store.existing.lock().unwrap();
            for name in names {
                existing.insert(Self::key(directory, name));
            }
        }
        store
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn created_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count()
    }

    pub(crate) fn fail_next_creates(&self, n: u32) {
        *self.fail_creates.lock().unwrap() = n;
    }

    pub(crate) fn fail_next_exists(&self, n: u32) {
        *self.fail_exists.lock().unwrap() = n;
    }

    pub(crate) fn refuse_connection(&self) {
        *self.fail_connection.lock().unwrap() = true;
    }

    pub(crate) fn claim_unlisted(&self, directory: &str, name: &str) {
        self.hidden.lock().unwrap().insert(Self::key(directory, name));
    }

    pub(crate) fn gate_next_create(&self, release: Receiver<()>) {
        *self.gate.lock().unwrap() = Some(release);
    }

    fn key(directory: &str, name: &str) -> String {
        format!("{}/{}", directory.trim_matches('/'), name)
    }
}

impl RemoteStore for MockStore {
    fn create(&self, _local: &Path, directory: &str, name: &str) -> Result<RemoteRef, RemoteError> {
        if let Some(release) = self.gate.lock().unwrap().take() {
            let _ = release.recv();
        }
        self.calls.lock().unwrap().push(Call::Create(name.to_string()));
        {
            let mut fails = self.fail_creates.lock().unwrap();
            if *fails > 0 {
                *fails -= 1;
                return Err(RemoteError::Status {
                    url: format!("mock://{directory}/{name}"),
                    status: 503,
                });
            }
        }
        let key = Self::key(directory, name);
        if self.hidden.lock().unwrap().remove(&key) {
            self.existing.lock().unwrap().insert(key);
            return Err(RemoteError::Conflict {
                name: name.to_string(),
            });
        }
        if !self.existing.lock().unwrap().insert(key) {
            return Err(RemoteError::Conflict {
                name: name.to_string(),
            });
        }
        Ok(RemoteRef {
            directory: directory.to_string(),
            name: name.to_string(),
        })
    }

    fn update(&self, _local: &Path, directory: &str, name: &str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(Call::Update(name.to_string()));
        self.existing.lock().unwrap().insert(Self::key(directory, name));
        Ok(())
    }

    fn name_exists(&self, directory: &str, name: &str) -> Result<bool, RemoteError> {
        self.calls.lock().unwrap().push(Call::Exists(name.to_string()));
        {
            let mut fails = self.fail_exists.lock().unwrap();
            if *fails > 0 {
                *fails -= 1;
                return Err(RemoteError::Status {
                    url: format!("mock://{directory}/{name}"),
                    status: 502,
                });
            }
        }
        Ok(self
            .existing
            .lock()
            .unwrap()
            .contains(&Self::key(directory, name)))
    }

    fn test_connection(&self) -> Result<(), RemoteError> {
        if *self.fail_connection.lock().unwrap() {
            return Err(RemoteError::Status {
                url: "mock://".to_string(),
                status: 503,
            });
        }
        Ok(())
    }

    fn ensure_directory(&self, directory: &str) -> Result<(), RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Ensure(directory.to_string()));
        Ok(())
    }
}
