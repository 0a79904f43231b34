//! Remote store abstraction consumed by the lifecycle engine.

use std::path::Path;

use crate::error::RemoteError;

/// Handle to a remote object, returned by a successful [`RemoteStore::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Remote directory the object lives in.
    pub directory: String,
    /// Final object name on the server.
    pub name: String,
}

/// One remote WebDAV-style store.
///
/// Every method is a single blocking round trip; there are no retries at this
/// layer. Retry policy belongs to the caller. Implementations hold no mutable
/// state and may be called concurrently for different paths.
pub trait RemoteStore: Send + Sync {
    /// Upload `local` as a brand-new object `name` under `directory`.
    ///
    /// Must fail with [`RemoteError::Conflict`] if the name is already taken.
    /// Never overwrites an existing object.
    fn create(&self, local: &Path, directory: &str, name: &str) -> Result<RemoteRef, RemoteError>;

    /// Overwrite the existing object `name` under `directory` with the
    /// current contents of `local`.
    fn update(&self, local: &Path, directory: &str, name: &str) -> Result<(), RemoteError>;

    /// Whether an object called `name` currently exists under `directory`.
    fn name_exists(&self, directory: &str, name: &str) -> Result<bool, RemoteError>;

    /// One authenticated round trip against the base URL, to validate
    /// connectivity and credentials at startup.
    fn test_connection(&self) -> Result<(), RemoteError>;

    /// Create `directory` (and any missing parents) on the remote.
    fn ensure_directory(&self, directory: &str) -> Result<(), RemoteError>;
}
