//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("unprocessable: {0}")]
  Unprocessable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Mapping for the conditional patch endpoint: a stale `current_state` and
  /// a malformed patch document are both 422.
  pub fn from_patch(e: mailroom_core::Error) -> Self {
    match e {
      mailroom_core::Error::Conflict(m) | mailroom_core::Error::Malformed(m) => {
        ApiError::Unprocessable(m)
      }
      other => other.into(),
    }
  }
}

impl From<mailroom_core::Error> for ApiError {
  fn from(e: mailroom_core::Error) -> Self {
    match e {
      mailroom_core::Error::NotFound(m) => ApiError::NotFound(m),
      mailroom_core::Error::AlreadyExists(m) | mailroom_core::Error::Conflict(m) => {
        ApiError::Conflict(m)
      }
      mailroom_core::Error::Malformed(m) => ApiError::BadRequest(m),
      mailroom_core::Error::StoreUnavailable(e) => ApiError::Store(e),
    }
  }
}

/// Convert any store error into an [`ApiError`] via the core classification.
pub(crate) fn store_err<E: Into<mailroom_core::Error>>(e: E) -> ApiError {
  ApiError::from(e.into())
}

/// Deserialize a raw request body, reporting both invalid JSON and a
/// wrongly shaped document as 400.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
  serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
      ApiError::Store(e) => {
        tracing::warn!(error = %e, "store unavailable");
        (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
