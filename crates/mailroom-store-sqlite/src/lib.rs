//! SQLite backend for Mailroom.
//!
//! Implements both [`mailroom_core::store::RecordStore`] and
//! [`mailroom_core::store::IdentityStore`] on one connection. Wraps
//! [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod cursor;
mod encode;
mod identities;
mod schema;
mod store;

pub mod error;

pub use cursor::SqliteRemoteCursor;
pub use error::{Error, Result};
pub use store::{DEFAULT_SCAN_PAGE_SIZE, SqliteStore};

#[cfg(test)]
mod tests;
