//! Error types for courier-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON parse error on load — includes file path and line context from serde_json.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The config file did not exist at the expected path.
    #[error("config file not found at {path}")]
    NotFound { path: PathBuf },

    /// The config parsed but its contents are unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}
