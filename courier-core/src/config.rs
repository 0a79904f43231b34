//! Daemon configuration — JSON file describing the remote store and the
//! watched directory mappings.
//!
//! # Format
//!
//! ```json
//! {
//!   "server_url": "https://cloud.example.net/remote.php/dav/files/scanner",
//!   "username": "scanner",
//!   "password": "app-password",
//!   "directories": [ { "local": "/var/spool/scans", "remote": "/Scans" } ],
//!   "upload_delay_seconds": 10,
//!   "delete_delay_seconds": 600
//! }
//! ```
//!
//! `server_url` is the WebDAV base URL itself; for Nextcloud that is
//! `https://<host>/remote.php/dav/files/<user>`. The two delay fields are
//! optional and default to 10 s (upload stability window) and 600 s (local
//! delete retention window).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One watched directory and the remote directory its files are uploaded to.
///
/// `local` is watched recursively; every file is uploaded flat into `remote`
/// under its basename. The pair is fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMapping {
    /// Local directory to watch.
    pub local: PathBuf,
    /// Remote directory path, relative to the WebDAV base URL.
    pub remote: String,
}

/// Root of the courier JSON configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// WebDAV base URL of the remote store.
    pub server_url: String,
    pub username: String,
    /// Password or app password used for HTTP basic auth.
    pub password: String,
    /// Ordered list of local → remote directory mappings.
    pub directories: Vec<DirectoryMapping>,
    /// Seconds a file must stay unchanged before it is uploaded.
    #[serde(default = "default_upload_delay")]
    pub upload_delay_seconds: u64,
    /// Seconds after a successful upload before the local copy is deleted.
    #[serde(default = "default_delete_delay")]
    pub delete_delay_seconds: u64,
}

fn default_upload_delay() -> u64 {
    10
}

fn default_delete_delay() -> u64 {
    600
}

impl Config {
    /// Stability window as a [`Duration`].
    pub fn upload_stability_window(&self) -> Duration {
        Duration::from_secs(self.upload_delay_seconds)
    }

    /// Retention window as a [`Duration`].
    pub fn delete_retention_window(&self) -> Duration {
        Duration::from_secs(self.delete_delay_seconds)
    }

    /// Check the parsed config for values that cannot work at runtime.
    ///
    /// Shape problems (missing required fields, wrong types) are caught by
    /// serde during [`load`]; this catches the semantic ones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::Invalid("server_url must not be empty".into()));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::Invalid("username must not be empty".into()));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Invalid("password must not be empty".into()));
        }
        if self.directories.is_empty() {
            return Err(ConfigError::Invalid(
                "directories must contain at least one mapping".into(),
            ));
        }
        for (i, mapping) in self.directories.iter().enumerate() {
            if mapping.local.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "directories[{i}].local must not be empty"
                )));
            }
            if mapping.remote.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "directories[{i}].remote must not be empty"
                )));
            }
        }
        if self.upload_delay_seconds == 0 {
            return Err(ConfigError::Invalid(
                "upload_delay_seconds must be greater than zero".into(),
            ));
        }
        if self.delete_delay_seconds == 0 {
            return Err(ConfigError::Invalid(
                "delete_delay_seconds must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Load and validate the configuration at `path`.
///
/// Returns `ConfigError::NotFound` if the file is absent,
/// `ConfigError::Parse` (with path + position context) if malformed JSON,
/// and `ConfigError::Invalid` for semantic problems.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
