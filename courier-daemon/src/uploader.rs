//! Blocking upload execution: create-vs-update choice and conflict-safe
//! naming. Runs on the blocking pool, one call per upload attempt.

use std::io;
use std::path::Path;

use courier_webdav::{RemoteError, RemoteStore};

use crate::event::UploadOutcome;

/// Upload `path` into `remote_directory`.
///
/// With a `remote_name` the file has been uploaded before and the existing
/// object is overwritten; names are never renumbered once assigned. Without
/// one this is a first upload and a free name is negotiated.
pub(crate) fn perform_upload(
    store: &dyn RemoteStore,
    path: &Path,
    remote_directory: &str,
    remote_name: Option<&str>,
) -> UploadOutcome {
    match remote_name {
        Some(name) => match store.update(path, remote_directory, name) {
            Ok(()) => UploadOutcome::Updated {
                name: name.to_string(),
            },
            Err(error) => UploadOutcome::Failed { error },
        },
        None => match create_with_unique_name(store, path, remote_directory) {
            Ok(name) => UploadOutcome::Created { name },
            Err(error) => UploadOutcome::Failed { error },
        },
    }
}

/// Find a free name and create the remote object under it.
///
/// Candidates are the file's own name, then `Copy_1-<name>`, `Copy_2-<name>`
/// and so on; the smallest unused number wins. The create itself can still
/// collide with a racing writer, in which case the next number is tried.
fn create_with_unique_name(
    store: &dyn RemoteStore,
    path: &Path,
    remote_directory: &str,
) -> Result<String, RemoteError> {
    let base = file_name_of(path)?;
    let mut attempt: u32 = 0;
    loop {
        let candidate = if attempt == 0 {
            base.clone()
        } else {
            format!("Copy_{attempt}-{base}")
        };
        if store.name_exists(remote_directory, &candidate)? {
            attempt += 1;
            continue;
        }
        match store.create(path, remote_directory, &candidate) {
            Ok(remote) => {
                if attempt > 0 {
                    tracing::info!(
                        path = %path.display(),
                        name = %remote.name,
                        "name conflict resolved by renaming"
                    );
                }
                return Ok(remote.name);
            }
            Err(RemoteError::Conflict { .. }) => {
                // Taken between the existence check and the reservation.
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn file_name_of(path: &Path) -> Result<String, RemoteError> {
    match path.file_name() {
        Some(name) => Ok(name.to_string_lossy().into_owned()),
        None => Err(RemoteError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        }),
    }
}
