//! Courier core library — configuration model and errors.
//!
//! Public API surface:
//! - [`config`] — [`Config`], [`DirectoryMapping`], [`config::load`]
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;

pub use config::{Config, DirectoryMapping};
pub use error::ConfigError;
