//! Blocking WebDAV client over HTTP basic auth.
//!
//! Nextcloud-compatible: point `server_url` at
//! `https://<host>/remote.php/dav/files/<user>` and every operation works on
//! paths below it. Calls block for the duration of one request; run them off
//! the async runtime (the daemon uses `spawn_blocking`).

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use url::Url;

use crate::error::{io_err, RemoteError};
use crate::store::{RemoteRef, RemoteStore};

/// Connect timeout applied to every request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Overall timeout for directory probes and the startup connection test.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
/// Overall timeout for per-name existence checks. These run inside the
/// conflict-naming loop, so they must fail fast.
const EXISTS_TIMEOUT: Duration = Duration::from_secs(10);
/// Overall timeout for uploads. Scanned documents can be large.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// WebDAV implementation of [`RemoteStore`].
///
/// Holds no mutable state; one instance is shared by every upload worker.
#[derive(Debug)]
pub struct WebdavClient {
    agent: ureq::Agent,
    base: Url,
    auth_header: String,
}

impl WebdavClient {
    /// Build a client for `server_url`, which must be the WebDAV base URL
    /// itself (not the web UI root).
    pub fn new(server_url: &str, username: &str, password: &str) -> Result<Self, RemoteError> {
        let base = Url::parse(server_url.trim_end_matches('/')).map_err(|e| {
            RemoteError::BadUrl {
                url: server_url.to_string(),
                reason: e.to_string(),
            }
        })?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::BadUrl {
                url: server_url.to_string(),
                reason: "not a hierarchical URL".to_string(),
            });
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .build();
        let credentials = STANDARD.encode(format!("{username}:{password}"));
        Ok(Self {
            agent,
            base,
            auth_header: format!("Basic {credentials}"),
        })
    }

    /// URL for `directory` below the base, optionally with an object `name`
    /// appended. Each segment is percent-encoded by the `url` crate.
    fn object_url(&self, directory: &str, name: Option<&str>) -> Result<Url, RemoteError> {
        let mut target = self.base.clone();
        {
            let mut segments =
                target
                    .path_segments_mut()
                    .map_err(|_| RemoteError::BadUrl {
                        url: self.base.to_string(),
                        reason: "not a hierarchical URL".to_string(),
                    })?;
            segments.pop_if_empty();
            segments.extend(directory.split('/').filter(|s| !s.is_empty()));
            if let Some(name) = name {
                segments.push(name);
            }
        }
        Ok(target)
    }

    fn request(&self, method: &str, target: &Url, timeout: Duration) -> ureq::Request {
        self.agent
            .request(method, target.as_str())
            .set("Authorization", &self.auth_header)
            .timeout(timeout)
    }

    /// PROPFIND with `Depth: 0`. `Ok(true)` on 207, `Ok(false)` on 404.
    fn probe(&self, target: &Url, timeout: Duration) -> Result<bool, RemoteError> {
        match self.request("PROPFIND", target, timeout).set("Depth", "0").call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(e) => Err(classify(target.as_str(), e)),
        }
    }
}

impl RemoteStore for WebdavClient {
    fn create(&self, local: &Path, directory: &str, name: &str) -> Result<RemoteRef, RemoteError> {
        let target = self.object_url(directory, Some(name))?;
        let file = File::open(local).map_err(|e| io_err(local, e))?;
        // If-None-Match makes the reservation atomic: the server refuses with
        // 412 instead of overwriting a racing writer's object.
        let result = self
            .request("PUT", &target, UPLOAD_TIMEOUT)
            .set("Content-Type", "application/octet-stream")
            .set("If-None-Match", "*")
            .send(file);
        match result {
            Ok(_) => {
                tracing::debug!(url = %target, "created remote object");
                Ok(RemoteRef {
                    directory: directory.to_string(),
                    name: name.to_string(),
                })
            }
            Err(ureq::Error::Status(412, _)) => Err(RemoteError::Conflict {
                name: name.to_string(),
            }),
            Err(e) => Err(classify(target.as_str(), e)),
        }
    }

    fn update(&self, local: &Path, directory: &str, name: &str) -> Result<(), RemoteError> {
        let target = self.object_url(directory, Some(name))?;
        let file = File::open(local).map_err(|e| io_err(local, e))?;
        let result = self
            .request("PUT", &target, UPLOAD_TIMEOUT)
            .set("Content-Type", "application/octet-stream")
            .send(file);
        match result {
            Ok(_) => {
                tracing::debug!(url = %target, "updated remote object");
                Ok(())
            }
            Err(e) => Err(classify(target.as_str(), e)),
        }
    }

    fn name_exists(&self, directory: &str, name: &str) -> Result<bool, RemoteError> {
        let target = self.object_url(directory, Some(name))?;
        self.probe(&target, EXISTS_TIMEOUT)
    }

    fn test_connection(&self) -> Result<(), RemoteError> {
        let target = self.base.clone();
        match self.probe(&target, PROBE_TIMEOUT)? {
            true => Ok(()),
            // A 404 on the base URL means the URL is wrong, not that the
            // store is absent.
            false => Err(RemoteError::Status {
                url: target.to_string(),
                status: 404,
            }),
        }
    }

    fn ensure_directory(&self, directory: &str) -> Result<(), RemoteError> {
        let segments: Vec<&str> = directory.split('/').filter(|s| !s.is_empty()).collect();
        let mut prefix = String::new();
        for segment in segments {
            prefix.push('/');
            prefix.push_str(segment);
            let target = self.object_url(&prefix, None)?;
            if self.probe(&target, PROBE_TIMEOUT)? {
                continue;
            }
            match self.request("MKCOL", &target, PROBE_TIMEOUT).call() {
                Ok(_) => {
                    tracing::info!(url = %target, "created remote directory");
                }
                // 405: another client created it between probe and MKCOL.
                Err(ureq::Error::Status(405, _)) => {}
                Err(e) => return Err(classify(target.as_str(), e)),
            }
        }
        Ok(())
    }
}

fn classify(url: &str, err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(status, _) => classify_status(url, status),
        ureq::Error::Transport(source) => RemoteError::Network {
            url: url.to_string(),
            source,
        },
    }
}

fn classify_status(url: &str, status: u16) -> RemoteError {
    match status {
        401 | 403 => RemoteError::Auth {
            url: url.to_string(),
            status,
        },
        507 => RemoteError::ServerFull {
            url: url.to_string(),
        },
        status => RemoteError::Status {
            url: url.to_string(),
            status,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
