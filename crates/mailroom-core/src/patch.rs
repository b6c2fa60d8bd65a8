//! Conditional patch application.
//!
//! A client sends the fields it believes an entity currently holds together
//! with a merge patch (RFC 7396). The patch lands only if every asserted field
//! still matches the stored record. Fields the client did not assert are not
//! compared.
//!
//! ```json
//! {
//!   "current_state": { "given_name": "Ana" },
//!   "family_name": "Diaz",
//!   "nickname": null
//! }
//! ```

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  entity::{EntityKind, Fields},
  store::{RecordStore, WriteOutcome},
};

/// Body key carrying the client's expected state.
pub const CURRENT_STATE: &str = "current_state";

// ─── Request ─────────────────────────────────────────────────────────────────

/// A pair of (expected current state, merge patch).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchRequest {
  pub expected: Fields,
  pub patch:    Fields,
}

impl PatchRequest {
  pub fn new(expected: Fields, patch: Fields) -> Self { Self { expected, patch } }

  /// Split a wire body into expected state and patch.
  ///
  /// The body must be an object with an object-valued `current_state`; every
  /// other key is part of the patch.
  pub fn from_body(body: Value) -> Result<Self> {
    let Value::Object(mut patch) = body else {
      return Err(Error::Malformed("patch body must be a JSON object".into()));
    };
    let expected = match patch.remove(CURRENT_STATE) {
      Some(Value::Object(expected)) => expected,
      Some(_) => {
        return Err(Error::Malformed(format!("{CURRENT_STATE} must be an object")));
      }
      None => return Err(Error::Malformed(format!("missing {CURRENT_STATE}"))),
    };
    Ok(Self { expected, patch })
  }

  /// Reject patches that would write store-owned keys.
  pub fn validate(&self, kind: EntityKind) -> Result<()> {
    match self.patch.keys().find(|k| kind.is_reserved(k)) {
      Some(key) => Err(Error::Malformed(format!("field {key:?} cannot be patched"))),
      None => Ok(()),
    }
  }
}

// ─── Comparison and merge ────────────────────────────────────────────────────

/// Keys of `expected` whose value differs from `stored`.
///
/// An expected `null` matches a field that is absent or null.
pub fn diverged_fields<'a>(expected: &'a Fields, stored: &Fields) -> Vec<&'a str> {
  expected
    .iter()
    .filter(|(key, want)| {
      let have = stored.get(key.as_str()).unwrap_or(&Value::Null);
      have != *want
    })
    .map(|(key, _)| key.as_str())
    .collect()
}

/// Apply an RFC 7396 merge patch to `target` in place.
pub fn merge_patch(target: &mut Value, patch: &Value) {
  let Value::Object(patch) = patch else {
    *target = patch.clone();
    return;
  };
  if !target.is_object() {
    *target = Value::Object(Map::new());
  }
  if let Value::Object(map) = target {
    merge_fields(map, patch);
  }
}

/// Merge `patch` into a field map: `null` removes, objects merge recursively,
/// anything else replaces.
pub fn merge_fields(target: &mut Fields, patch: &Fields) {
  for (key, value) in patch {
    if value.is_null() {
      target.remove(key);
    } else {
      merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
    }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Apply `request` to the stored entity `(kind, id)` if the entity still
/// matches the request's expected state.
///
/// Fails with `NotFound` if the entity is absent, `Malformed` if the patch
/// writes reserved keys, and `Conflict` if an asserted field diverged. No
/// write happens on any failure path.
///
/// The write is guarded by the revision that was read. When another write
/// lands first, the comparison runs again against the newer record and the
/// patch is merged onto it, so a concurrent change to fields this request
/// did not assert never surfaces as a conflict.
pub async fn apply_patch<S: RecordStore>(
  store: &S,
  kind: EntityKind,
  id: Uuid,
  request: PatchRequest,
) -> Result<()> {
  request.validate(kind)?;

  loop {
    let mut entity = store
      .get_entity(kind, id)
      .await
      .map_err(Into::<Error>::into)?
      .ok_or_else(|| Error::NotFound(format!("{kind} {id}")))?;

    let diverged = diverged_fields(&request.expected, &entity.document());
    if !diverged.is_empty() {
      tracing::debug!(%kind, %id, ?diverged, "patch rejected: stale current_state");
      return Err(Error::Conflict(format!(
        "{kind} {id} changed on fields: {}",
        diverged.join(", ")
      )));
    }

    let read_revision = entity.revision;
    merge_fields(&mut entity.fields, &request.patch);
    entity.date_update = Utc::now();

    match store
      .replace_entity(&entity, read_revision)
      .await
      .map_err(Into::<Error>::into)?
    {
      WriteOutcome::Written(revision) => {
        tracing::debug!(%kind, %id, revision, "patch applied");
        return Ok(());
      }
      WriteOutcome::Stale => {
        tracing::trace!(%kind, %id, read_revision, "revision moved, comparing again");
      }
      WriteOutcome::Missing => return Err(Error::NotFound(format!("{kind} {id}"))),
    }
  }
}
