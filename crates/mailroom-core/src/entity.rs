//! Entity — a schema-less domain record addressed by kind and UUID.
//!
//! The store owns the envelope (`id`, timestamps, `revision`); everything else
//! lives in `fields` as plain JSON. Field-level schema checks belong to the
//! transport layer.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

/// Field map of an entity, without its envelope.
pub type Fields = Map<String, Value>;

// ─── Kind ────────────────────────────────────────────────────────────────────

/// The kind of record an entity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Contact,
  User,
  Tag,
  Message,
  Discussion,
}

impl EntityKind {
  pub const ALL: [EntityKind; 5] = [
    EntityKind::Contact,
    EntityKind::User,
    EntityKind::Tag,
    EntityKind::Message,
    EntityKind::Discussion,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      EntityKind::Contact => "contact",
      EntityKind::User => "user",
      EntityKind::Tag => "tag",
      EntityKind::Message => "message",
      EntityKind::Discussion => "discussion",
    }
  }

  /// Document key carrying the entity id, e.g. `contact_id`.
  pub fn id_field(self) -> &'static str {
    match self {
      EntityKind::Contact => "contact_id",
      EntityKind::User => "user_id",
      EntityKind::Tag => "tag_id",
      EntityKind::Message => "message_id",
      EntityKind::Discussion => "discussion_id",
    }
  }

  /// Keys owned by the store. Clients may assert them but never write them.
  pub fn is_reserved(self, key: &str) -> bool {
    key == self.id_field()
      || key == "date_insert"
      || key == "date_update"
      || key == "revision"
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EntityKind {
  type Err = Error;

  /// Accepts both the singular (`contact`) and collection (`contacts`) forms.
  fn from_str(s: &str) -> Result<Self> {
    match s {
      "contact" | "contacts" => Ok(EntityKind::Contact),
      "user" | "users" => Ok(EntityKind::User),
      "tag" | "tags" => Ok(EntityKind::Tag),
      "message" | "messages" => Ok(EntityKind::Message),
      "discussion" | "discussions" => Ok(EntityKind::Discussion),
      other => Err(Error::NotFound(format!("unknown entity kind {other:?}"))),
    }
  }
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// A stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
  pub kind:        EntityKind,
  pub id:          Uuid,
  /// Incremented by the store on every successful write.
  pub revision:    u64,
  pub date_insert: DateTime<Utc>,
  pub date_update: DateTime<Utc>,
  pub fields:      Fields,
}

impl Entity {
  /// Build a fresh, not-yet-persisted entity. Rejects reserved keys.
  pub fn new(kind: EntityKind, fields: Fields) -> Result<Self> {
    if let Some(key) = fields.keys().find(|k| kind.is_reserved(k)) {
      return Err(Error::Malformed(format!(
        "field {key:?} is assigned by the store"
      )));
    }
    let now = Utc::now();
    Ok(Self {
      kind,
      id: Uuid::new_v4(),
      revision: 0,
      date_insert: now,
      date_update: now,
      fields,
    })
  }

  /// The client-facing view: fields plus the envelope keys.
  ///
  /// Expected-state comparisons run against this view, so clients can assert
  /// `date_update` or the id alongside ordinary fields.
  pub fn document(&self) -> Fields {
    let mut doc = self.fields.clone();
    doc.insert(self.kind.id_field().to_owned(), Value::String(self.id.to_string()));
    doc.insert("date_insert".to_owned(), timestamp(self.date_insert));
    doc.insert("date_update".to_owned(), timestamp(self.date_update));
    doc.insert("revision".to_owned(), Value::from(self.revision));
    doc
  }
}

fn timestamp(dt: DateTime<Utc>) -> Value {
  serde_json::to_value(dt).unwrap_or(Value::Null)
}
