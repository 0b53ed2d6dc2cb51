//! SQLite backend for the Trellis relationship and activity stores.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_DEDUP_WINDOW_SECS, SqliteStore};
