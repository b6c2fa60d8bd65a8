//! Identity bindings: accounts a user owns locally or on external services.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
  str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

/// Lifecycle status shared by local and remote identities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
  #[default]
  Active,
  Inactive,
  Deleted,
}

impl IdentityStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      IdentityStatus::Active => "active",
      IdentityStatus::Inactive => "inactive",
      IdentityStatus::Deleted => "deleted",
    }
  }
}

impl FromStr for IdentityStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "active" => Ok(IdentityStatus::Active),
      "inactive" => Ok(IdentityStatus::Inactive),
      "deleted" => Ok(IdentityStatus::Deleted),
      other => Err(Error::Malformed(format!("unknown identity status {other:?}"))),
    }
  }
}

// ─── Remote ──────────────────────────────────────────────────────────────────

/// A binding between a local user and an account on an external protocol.
///
/// Addressed by `(user_id, identifier)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteIdentity {
  pub user_id:      Uuid,
  /// Protocol-scoped account name, e.g. `ana@example.com`.
  pub identifier:   String,
  /// e.g. `imap`, `twitter`.
  pub protocol:     String,
  #[serde(default)]
  pub display_name: Option<String>,
  /// Opaque credential blob; never interpreted by the store and never
  /// serialised back out.
  #[serde(default = "empty_object", skip_serializing)]
  pub credentials:  Value,
  /// Protocol settings such as server names or polling periods.
  #[serde(default)]
  pub infos:        BTreeMap<String, String>,
  #[serde(default)]
  pub status:       IdentityStatus,
  #[serde(default)]
  pub last_check:   Option<DateTime<Utc>>,
  #[serde(default = "Utc::now")]
  pub date_insert:  DateTime<Utc>,
  #[serde(default = "Utc::now")]
  pub date_update:  DateTime<Utc>,
}

fn empty_object() -> Value { Value::Object(Map::new()) }

impl RemoteIdentity {
  pub fn new(
    user_id: Uuid,
    identifier: impl Into<String>,
    protocol: impl Into<String>,
  ) -> Self {
    let now = Utc::now();
    Self {
      user_id,
      identifier: identifier.into(),
      protocol: protocol.into(),
      display_name: None,
      credentials: empty_object(),
      infos: BTreeMap::new(),
      status: IdentityStatus::Active,
      last_check: None,
      date_insert: now,
      date_update: now,
    }
  }

  /// Reject bindings whose key or protocol is blank.
  pub fn validate(&self) -> Result<()> {
    validate_binding(&self.identifier, &self.protocol)
  }

  /// Overwrite the fields named in `obj` and return the set that changed.
  ///
  /// Used to turn a partial JSON body into the `(identity, fields)` pair that
  /// [`IdentityStore::update_remote_identity`](crate::store::IdentityStore)
  /// takes. Key fields and unknown names are rejected.
  pub fn overlay(&mut self, obj: &Map<String, Value>) -> Result<BTreeSet<RemoteField>> {
    let mut fields = BTreeSet::new();
    for (key, value) in obj {
      let field: RemoteField = key.parse()?;
      let value = value.clone();
      match field {
        RemoteField::DisplayName => self.display_name = serde_json::from_value(value)?,
        RemoteField::Credentials => self.credentials = value,
        RemoteField::Infos => self.infos = serde_json::from_value(value)?,
        RemoteField::Status => self.status = serde_json::from_value(value)?,
        RemoteField::LastCheck => self.last_check = serde_json::from_value(value)?,
        RemoteField::Protocol => {
          self.protocol = serde_json::from_value(value)?;
          validate_binding(&self.identifier, &self.protocol)?;
        }
      }
      fields.insert(field);
    }
    Ok(fields)
  }
}

/// The mutable attributes of a [`RemoteIdentity`].
///
/// `user_id` and `identifier` form the key and cannot be updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RemoteField {
  DisplayName,
  Credentials,
  Infos,
  Status,
  LastCheck,
  Protocol,
}

impl RemoteField {
  pub fn as_str(self) -> &'static str {
    match self {
      RemoteField::DisplayName => "display_name",
      RemoteField::Credentials => "credentials",
      RemoteField::Infos => "infos",
      RemoteField::Status => "status",
      RemoteField::LastCheck => "last_check",
      RemoteField::Protocol => "protocol",
    }
  }
}

impl fmt::Display for RemoteField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RemoteField {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "display_name" => Ok(RemoteField::DisplayName),
      "credentials" => Ok(RemoteField::Credentials),
      "infos" => Ok(RemoteField::Infos),
      "status" => Ok(RemoteField::Status),
      "last_check" => Ok(RemoteField::LastCheck),
      "protocol" => Ok(RemoteField::Protocol),
      "user_id" | "identifier" => {
        Err(Error::Malformed(format!("{s:?} is part of the identity key")))
      }
      other => Err(Error::Malformed(format!("unknown remote identity field {other:?}"))),
    }
  }
}

// ─── Local ───────────────────────────────────────────────────────────────────

/// An identity the user owns on this system, e.g. one of their addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalIdentity {
  pub user_id:      Uuid,
  pub identifier:   String,
  #[serde(default = "default_local_protocol")]
  pub protocol:     String,
  #[serde(default)]
  pub display_name: Option<String>,
  #[serde(default)]
  pub status:       IdentityStatus,
  #[serde(default = "Utc::now")]
  pub date_insert:  DateTime<Utc>,
}

fn default_local_protocol() -> String { "email".to_owned() }

impl LocalIdentity {
  pub fn new(user_id: Uuid, identifier: impl Into<String>) -> Self {
    Self {
      user_id,
      identifier: identifier.into(),
      protocol: default_local_protocol(),
      display_name: None,
      status: IdentityStatus::Active,
      date_insert: Utc::now(),
    }
  }

  pub fn validate(&self) -> Result<()> {
    validate_binding(&self.identifier, &self.protocol)
  }
}

fn validate_binding(identifier: &str, protocol: &str) -> Result<()> {
  if identifier.trim().is_empty() {
    return Err(Error::Malformed("identifier must not be empty".into()));
  }
  if protocol.trim().is_empty() {
    return Err(Error::Malformed("protocol must not be empty".into()));
  }
  Ok(())
}
