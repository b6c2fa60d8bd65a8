//! Handlers for `/entities/{kind}` endpoints.
//!
//! `{kind}` is a collection name such as `contacts`, `users`, `tags`,
//! `messages` or `discussions` (the singular form is accepted too).
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/entities/{kind}` | All records of a kind |
//! | `POST`   | `/entities/{kind}` | Body: field object; returns 201 + document |
//! | `GET`    | `/entities/{kind}/{id}` | 404 if not found |
//! | `PATCH`  | `/entities/{kind}/{id}` | `{"current_state": {...}, ...patch}`; 204 |
//! | `DELETE` | `/entities/{kind}/{id}` | 204 |

use std::sync::Arc;

use axum::{
  Json,
  body::Bytes,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use mailroom_core::{
  entity::{EntityKind, Fields},
  patch::{PatchRequest, apply_patch},
  store::RecordStore,
};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ApiError, parse_body, store_err};

fn parse_kind(kind: &str) -> Result<EntityKind, ApiError> {
  kind.parse::<EntityKind>().map_err(ApiError::from)
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /entities/{kind}`
pub async fn list<S: RecordStore>(
  State(store): State<Arc<S>>,
  Path(kind): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
  let kind = parse_kind(&kind)?;
  let entities = store.list_entities(kind).await.map_err(store_err)?;
  Ok(Json(
    entities
      .iter()
      .map(|e| Value::Object(e.document()))
      .collect(),
  ))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /entities/{kind}` — returns 201 + the stored document.
pub async fn create<S: RecordStore>(
  State(store): State<Arc<S>>,
  Path(kind): Path<String>,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
  let kind = parse_kind(&kind)?;
  let fields: Fields = parse_body(&body)?;
  let entity = store.create_entity(kind, fields).await.map_err(store_err)?;
  tracing::debug!(%kind, id = %entity.id, "entity created");
  Ok((StatusCode::CREATED, Json(Value::Object(entity.document()))))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /entities/{kind}/{id}`
pub async fn get_one<S: RecordStore>(
  State(store): State<Arc<S>>,
  Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<Value>, ApiError> {
  let kind = parse_kind(&kind)?;
  let entity = store
    .get_entity(kind, id)
    .await
    .map_err(store_err)?
    .ok_or_else(|| ApiError::NotFound(format!("{kind} {id} not found")))?;
  Ok(Json(Value::Object(entity.document())))
}

// ─── Patch ────────────────────────────────────────────────────────────────────

/// `PATCH /entities/{kind}/{id}` — conditional merge patch.
///
/// The body is read raw so that invalid JSON (400) is distinguished from a
/// well-formed but unusable patch document (422).
pub async fn patch_one<S: RecordStore>(
  State(store): State<Arc<S>>,
  Path((kind, id)): Path<(String, Uuid)>,
  body: Bytes,
) -> Result<StatusCode, ApiError> {
  let kind = parse_kind(&kind)?;
  let body: Value = parse_body(&body)?;
  let request = PatchRequest::from_body(body).map_err(ApiError::from_patch)?;

  apply_patch(store.as_ref(), kind, id, request)
    .await
    .map_err(ApiError::from_patch)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /entities/{kind}/{id}`
pub async fn delete_one<S: RecordStore>(
  State(store): State<Arc<S>>,
  Path((kind, id)): Path<(String, Uuid)>,
) -> Result<StatusCode, ApiError> {
  let kind = parse_kind(&kind)?;
  if !store.delete_entity(kind, id).await.map_err(store_err)? {
    return Err(ApiError::NotFound(format!("{kind} {id} not found")));
  }
  Ok(StatusCode::NO_CONTENT)
}
