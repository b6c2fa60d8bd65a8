//! [`IdentityStore`] impl for [`SqliteStore`].

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value as SqlValue};
use uuid::Uuid;

use mailroom_core::{
  identity::{LocalIdentity, RemoteField, RemoteIdentity},
  store::IdentityStore,
};

use crate::{
  Error, Result, SqliteStore,
  cursor::SqliteRemoteCursor,
  encode::{RawLocal, RawRemote, encode_dt, encode_uuid},
};

/// Column assignment for one updatable remote-identity field.
fn remote_column(
  identity: &RemoteIdentity,
  field: RemoteField,
) -> Result<(&'static str, SqlValue)> {
  let text = |s: Option<String>| s.map_or(SqlValue::Null, SqlValue::Text);
  Ok(match field {
    RemoteField::DisplayName => ("display_name", text(identity.display_name.clone())),
    RemoteField::Credentials => (
      "credentials_json",
      SqlValue::Text(serde_json::to_string(&identity.credentials)?),
    ),
    RemoteField::Infos => {
      ("infos_json", SqlValue::Text(serde_json::to_string(&identity.infos)?))
    }
    RemoteField::Status => ("status", SqlValue::Text(identity.status.as_str().to_owned())),
    RemoteField::LastCheck => ("last_check", text(identity.last_check.map(encode_dt))),
    RemoteField::Protocol => ("protocol", SqlValue::Text(identity.protocol.clone())),
  })
}

impl IdentityStore for SqliteStore {
  type Error = Error;
  type Cursor = SqliteRemoteCursor;

  async fn create_remote_identity(&self, identity: &RemoteIdentity) -> Result<()> {
    identity.validate()?;

    let user_id    = identity.user_id;
    let identifier = identity.identifier.clone();
    let params: Vec<SqlValue> = vec![
      SqlValue::Text(encode_uuid(user_id)),
      SqlValue::Text(identifier.clone()),
      SqlValue::Text(identity.protocol.clone()),
      identity.display_name.clone().map_or(SqlValue::Null, SqlValue::Text),
      SqlValue::Text(serde_json::to_string(&identity.credentials)?),
      SqlValue::Text(serde_json::to_string(&identity.infos)?),
      SqlValue::Text(identity.status.as_str().to_owned()),
      identity
        .last_check
        .map(encode_dt)
        .map_or(SqlValue::Null, SqlValue::Text),
      SqlValue::Text(encode_dt(identity.date_insert)),
      SqlValue::Text(encode_dt(identity.date_update)),
    ];

    let inserted: usize = self
      .conn()?
      .call(move |conn| {
        Ok(conn.execute(
          &format!(
            "INSERT INTO remote_identities ({})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT (user_id, identifier) DO NOTHING",
            RawRemote::COLUMNS
          ),
          rusqlite::params_from_iter(params),
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::AlreadyBound { user_id, identifier });
    }
    tracing::debug!(%user_id, %identifier, "remote identity created");
    Ok(())
  }

  async fn retrieve_remote_identity(
    &self,
    user_id:    Uuid,
    identifier: &str,
  ) -> Result<RemoteIdentity> {
    let user_str = encode_uuid(user_id);
    let ident    = identifier.to_owned();

    let raw: Option<RawRemote> = self
      .conn()?
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {} FROM remote_identities WHERE user_id = ?1 AND identifier = ?2",
              RawRemote::COLUMNS
            ),
            rusqlite::params![user_str, ident],
            RawRemote::from_row,
          )
          .optional()?)
      })
      .await?;

    raw
      .ok_or_else(|| Error::RemoteNotFound {
        user_id,
        identifier: identifier.to_owned(),
      })?
      .into_remote()
  }

  async fn update_remote_identity(
    &self,
    identity: &RemoteIdentity,
    fields:   &BTreeSet<RemoteField>,
  ) -> Result<()> {
    if fields.contains(&RemoteField::Protocol) {
      identity.validate()?;
    }

    let mut assignments = Vec::with_capacity(fields.len() + 1);
    let mut params      = Vec::with_capacity(fields.len() + 3);
    for field in fields {
      let (column, value) = remote_column(identity, *field)?;
      params.push(value);
      assignments.push(format!("{column} = ?{}", params.len()));
    }
    params.push(SqlValue::Text(encode_dt(Utc::now())));
    assignments.push(format!("date_update = ?{}", params.len()));

    params.push(SqlValue::Text(encode_uuid(identity.user_id)));
    let user_pos = params.len();
    params.push(SqlValue::Text(identity.identifier.clone()));
    let ident_pos = params.len();

    let sql = format!(
      "UPDATE remote_identities SET {} WHERE user_id = ?{user_pos} AND identifier = ?{ident_pos}",
      assignments.join(", ")
    );

    let changed: usize = self
      .conn()?
      .call(move |conn| Ok(conn.execute(&sql, rusqlite::params_from_iter(params))?))
      .await?;

    if changed == 0 {
      return Err(Error::RemoteNotFound {
        user_id:    identity.user_id,
        identifier: identity.identifier.clone(),
      });
    }
    Ok(())
  }

  async fn delete_remote_identity(&self, user_id: Uuid, identifier: &str) -> Result<()> {
    let user_str = encode_uuid(user_id);
    let ident    = identifier.to_owned();

    let changed: usize = self
      .conn()?
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM remote_identities WHERE user_id = ?1 AND identifier = ?2",
          rusqlite::params![user_str, ident],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::RemoteNotFound {
        user_id,
        identifier: identifier.to_owned(),
      });
    }
    Ok(())
  }

  async fn create_local_identity(&self, identity: &LocalIdentity) -> Result<()> {
    identity.validate()?;

    let user_id    = identity.user_id;
    let identifier = identity.identifier.clone();
    let user_str   = encode_uuid(user_id);
    let ident      = identifier.clone();
    let protocol   = identity.protocol.clone();
    let display    = identity.display_name.clone();
    let status     = identity.status.as_str();
    let at_str     = encode_dt(identity.date_insert);

    let inserted: usize = self
      .conn()?
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO local_identities
             (user_id, identifier, protocol, display_name, status, date_insert)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (user_id, identifier) DO NOTHING",
          rusqlite::params![user_str, ident, protocol, display, status, at_str],
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::AlreadyBound { user_id, identifier });
    }
    Ok(())
  }

  async fn get_local_identities(&self, user_id: Uuid) -> Result<Vec<LocalIdentity>> {
    let user_str = encode_uuid(user_id);

    let raws: Vec<RawLocal> = self
      .conn()?
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT user_id, identifier, protocol, display_name, status, date_insert
           FROM local_identities WHERE user_id = ?1 ORDER BY identifier",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], RawLocal::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLocal::into_local).collect()
  }

  async fn retrieve_all_remotes(&self) -> Result<SqliteRemoteCursor> {
    self.conn()?;
    Ok(SqliteRemoteCursor::new(self.clone()))
  }

  async fn close(&self) { self.shutdown().await }
}
