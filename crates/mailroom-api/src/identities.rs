//! Handlers for `/identities/{user_id}` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/identities/{user_id}/remotes` | Body: [`NewRemoteBody`]; 201, 409 if bound |
//! | `GET`    | `/identities/{user_id}/remotes/{identifier}` | 404 if absent |
//! | `PATCH`  | `/identities/{user_id}/remotes/{identifier}` | Partial object; keys name the fields to write |
//! | `DELETE` | `/identities/{user_id}/remotes/{identifier}` | 204 |
//! | `GET`    | `/identities/{user_id}/locals` | Empty list if none |
//! | `POST`   | `/identities/{user_id}/locals` | Body: [`NewLocalBody`]; 201 |

use std::{collections::BTreeMap, sync::Arc};

use axum::{
  Json,
  body::Bytes,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use mailroom_core::{
  identity::{IdentityStatus, LocalIdentity, RemoteIdentity},
  store::IdentityStore,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ApiError, parse_body, store_err};

// ─── Remote: create ──────────────────────────────────────────────────────────

/// JSON body accepted by `POST /identities/{user_id}/remotes`.
#[derive(Debug, Deserialize)]
pub struct NewRemoteBody {
  pub identifier:   String,
  pub protocol:     String,
  pub display_name: Option<String>,
  pub credentials:  Option<Value>,
  #[serde(default)]
  pub infos:        BTreeMap<String, String>,
  pub status:       Option<IdentityStatus>,
}

impl NewRemoteBody {
  fn into_remote(self, user_id: Uuid) -> RemoteIdentity {
    let mut remote = RemoteIdentity::new(user_id, self.identifier, self.protocol);
    remote.display_name = self.display_name;
    if let Some(credentials) = self.credentials {
      remote.credentials = credentials;
    }
    remote.infos = self.infos;
    remote.status = self.status.unwrap_or_default();
    remote
  }
}

/// `POST /identities/{user_id}/remotes` — returns 201 + the stored binding.
pub async fn create_remote<S: IdentityStore>(
  State(store): State<Arc<S>>,
  Path(user_id): Path<Uuid>,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
  let remote = parse_body::<NewRemoteBody>(&body)?.into_remote(user_id);
  store.create_remote_identity(&remote).await.map_err(store_err)?;
  Ok((StatusCode::CREATED, Json(remote)))
}

// ─── Remote: get one ─────────────────────────────────────────────────────────

/// `GET /identities/{user_id}/remotes/{identifier}`
pub async fn get_remote<S: IdentityStore>(
  State(store): State<Arc<S>>,
  Path((user_id, identifier)): Path<(Uuid, String)>,
) -> Result<Json<RemoteIdentity>, ApiError> {
  let remote = store
    .retrieve_remote_identity(user_id, &identifier)
    .await
    .map_err(store_err)?;
  Ok(Json(remote))
}

// ─── Remote: update ──────────────────────────────────────────────────────────

/// `PATCH /identities/{user_id}/remotes/{identifier}`
///
/// An unconditional partial write: only the keys present in the body are
/// persisted. `user_id` and `identifier` cannot be changed.
pub async fn update_remote<S: IdentityStore>(
  State(store): State<Arc<S>>,
  Path((user_id, identifier)): Path<(Uuid, String)>,
  body: Bytes,
) -> Result<StatusCode, ApiError> {
  let body: Map<String, Value> = parse_body(&body)?;
  let mut remote = store
    .retrieve_remote_identity(user_id, &identifier)
    .await
    .map_err(store_err)?;
  let fields = remote.overlay(&body)?;

  store
    .update_remote_identity(&remote, &fields)
    .await
    .map_err(store_err)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Remote: delete ──────────────────────────────────────────────────────────

/// `DELETE /identities/{user_id}/remotes/{identifier}`
pub async fn delete_remote<S: IdentityStore>(
  State(store): State<Arc<S>>,
  Path((user_id, identifier)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
  store
    .delete_remote_identity(user_id, &identifier)
    .await
    .map_err(store_err)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Locals ──────────────────────────────────────────────────────────────────

/// `GET /identities/{user_id}/locals`
pub async fn list_locals<S: IdentityStore>(
  State(store): State<Arc<S>>,
  Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<LocalIdentity>>, ApiError> {
  let locals = store.get_local_identities(user_id).await.map_err(store_err)?;
  Ok(Json(locals))
}

/// JSON body accepted by `POST /identities/{user_id}/locals`.
#[derive(Debug, Deserialize)]
pub struct NewLocalBody {
  pub identifier:   String,
  pub protocol:     Option<String>,
  pub display_name: Option<String>,
}

/// `POST /identities/{user_id}/locals` — returns 201 + the stored identity.
pub async fn create_local<S: IdentityStore>(
  State(store): State<Arc<S>>,
  Path(user_id): Path<Uuid>,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
  let body: NewLocalBody = parse_body(&body)?;
  let mut local = LocalIdentity::new(user_id, body.identifier);
  if let Some(protocol) = body.protocol {
    local.protocol = protocol;
  }
  local.display_name = body.display_name;

  store.create_local_identity(&local).await.map_err(store_err)?;
  Ok((StatusCode::CREATED, Json(local)))
}
