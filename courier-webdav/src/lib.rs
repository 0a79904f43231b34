//! Courier WebDAV library — remote store contract and its HTTP client.
//!
//! Public API surface:
//! - [`store`] — [`RemoteStore`] trait and [`RemoteRef`]
//! - [`client`] — [`WebdavClient`], the blocking implementation
//! - [`error`] — [`RemoteError`]

pub mod client;
pub mod error;
pub mod store;

pub use client::WebdavClient;
pub use error::RemoteError;
pub use store::{RemoteRef, RemoteStore};
