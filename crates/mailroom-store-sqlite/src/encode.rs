//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Entity fields, credentials
//! and infos are stored as compact JSON. UUIDs are stored as hyphenated
//! lowercase strings.

use chrono::{DateTime, Utc};
use mailroom_core::{
  entity::{Entity, EntityKind},
  identity::{IdentityStatus, LocalIdentity, RemoteIdentity},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_kind(s: &str) -> Result<EntityKind> {
  EntityKind::ALL
    .into_iter()
    .find(|k| k.as_str() == s)
    .ok_or_else(|| Error::Decode(format!("unknown entity kind: {s:?}")))
}

pub fn decode_status(s: &str) -> Result<IdentityStatus> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown identity status: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `entities` row.
pub struct RawEntity {
  pub kind:        String,
  pub entity_id:   String,
  pub revision:    i64,
  pub date_insert: String,
  pub date_update: String,
  pub fields_json: String,
}

impl RawEntity {
  pub const COLUMNS: &'static str =
    "kind, entity_id, revision, date_insert, date_update, fields_json";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      kind:        row.get(0)?,
      entity_id:   row.get(1)?,
      revision:    row.get(2)?,
      date_insert: row.get(3)?,
      date_update: row.get(4)?,
      fields_json: row.get(5)?,
    })
  }

  pub fn into_entity(self) -> Result<Entity> {
    let revision = u64::try_from(self.revision)
      .map_err(|_| Error::Decode(format!("negative revision {}", self.revision)))?;
    Ok(Entity {
      kind: decode_kind(&self.kind)?,
      id: decode_uuid(&self.entity_id)?,
      revision,
      date_insert: decode_dt(&self.date_insert)?,
      date_update: decode_dt(&self.date_update)?,
      fields: serde_json::from_str(&self.fields_json)?,
    })
  }
}

/// Raw strings read directly from a `remote_identities` row.
pub struct RawRemote {
  pub user_id:          String,
  pub identifier:       String,
  pub protocol:         String,
  pub display_name:     Option<String>,
  pub credentials_json: String,
  pub infos_json:       String,
  pub status:           String,
  pub last_check:       Option<String>,
  pub date_insert:      String,
  pub date_update:      String,
}

impl RawRemote {
  pub const COLUMNS: &'static str = "user_id, identifier, protocol, display_name, \
     credentials_json, infos_json, status, last_check, date_insert, date_update";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:          row.get(0)?,
      identifier:       row.get(1)?,
      protocol:         row.get(2)?,
      display_name:     row.get(3)?,
      credentials_json: row.get(4)?,
      infos_json:       row.get(5)?,
      status:           row.get(6)?,
      last_check:       row.get(7)?,
      date_insert:      row.get(8)?,
      date_update:      row.get(9)?,
    })
  }

  pub fn into_remote(self) -> Result<RemoteIdentity> {
    Ok(RemoteIdentity {
      user_id:      decode_uuid(&self.user_id)?,
      identifier:   self.identifier,
      protocol:     self.protocol,
      display_name: self.display_name,
      credentials:  serde_json::from_str(&self.credentials_json)?,
      infos:        serde_json::from_str(&self.infos_json)?,
      status:       decode_status(&self.status)?,
      last_check:   self.last_check.as_deref().map(decode_dt).transpose()?,
      date_insert:  decode_dt(&self.date_insert)?,
      date_update:  decode_dt(&self.date_update)?,
    })
  }
}

/// Raw strings read directly from a `local_identities` row.
pub struct RawLocal {
  pub user_id:      String,
  pub identifier:   String,
  pub protocol:     String,
  pub display_name: Option<String>,
  pub status:       String,
  pub date_insert:  String,
}

impl RawLocal {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:      row.get(0)?,
      identifier:   row.get(1)?,
      protocol:     row.get(2)?,
      display_name: row.get(3)?,
      status:       row.get(4)?,
      date_insert:  row.get(5)?,
    })
  }

  pub fn into_local(self) -> Result<LocalIdentity> {
    Ok(LocalIdentity {
      user_id:      decode_uuid(&self.user_id)?,
      identifier:   self.identifier,
      protocol:     self.protocol,
      display_name: self.display_name,
      status:       decode_status(&self.status)?,
      date_insert:  decode_dt(&self.date_insert)?,
    })
  }
}
