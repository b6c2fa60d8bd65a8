//! Error type for `mailroom-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] mailroom_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("corrupt row: {0}")]
  Decode(String),

  #[error("remote identity not found: {user_id}/{identifier}")]
  RemoteNotFound { user_id: uuid::Uuid, identifier: String },

  #[error("identity already bound: {user_id}/{identifier}")]
  AlreadyBound { user_id: uuid::Uuid, identifier: String },

  #[error("store is closed")]
  Closed,
}

impl From<Error> for mailroom_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(core) => core,
      Error::RemoteNotFound { .. } => mailroom_core::Error::NotFound(e.to_string()),
      Error::AlreadyBound { .. } => mailroom_core::Error::AlreadyExists(e.to_string()),
      other => mailroom_core::Error::unavailable(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
