//! Error types for `mailroom-core`.
//!
//! Store adapters keep their own error enums and convert into [`Error`] at the
//! trait boundary, so callers only ever classify these five kinds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("already exists: {0}")]
  AlreadyExists(String),

  /// The stored record diverged from the state the caller asserted.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("malformed: {0}")]
  Malformed(String),

  #[error("store unavailable: {0}")]
  StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap any collaborator failure the core does not classify further.
  pub fn unavailable(
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
  ) -> Self {
    Error::StoreUnavailable(e.into())
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self { Error::Malformed(e.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
