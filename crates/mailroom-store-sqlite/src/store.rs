//! [`SqliteStore`] — the SQLite implementation of [`RecordStore`].

use std::{
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use mailroom_core::{
  entity::{Entity, EntityKind, Fields},
  store::{RecordStore, WriteOutcome},
};

use crate::{
  Error, Result,
  encode::{RawEntity, encode_dt, encode_uuid},
  schema::SCHEMA,
};

/// Rows fetched per round trip by a bulk remote-identity scan.
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 256;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Mailroom store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted, and every
/// clone shares the closed flag and the open-scan counter.
#[derive(Clone)]
pub struct SqliteStore {
  conn:             tokio_rusqlite::Connection,
  closed:           Arc<AtomicBool>,
  pub(crate) scans: Arc<AtomicUsize>,
  pub(crate) page:  usize,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      closed: Arc::new(AtomicBool::new(false)),
      scans: Arc::new(AtomicUsize::new(0)),
      page: DEFAULT_SCAN_PAGE_SIZE,
    })
  }

  /// Set how many rows a bulk scan fetches per page. Zero is treated as one.
  pub fn with_scan_page_size(mut self, page: usize) -> Self {
    self.page = page.max(1);
    self
  }

  /// Number of bulk scans currently holding store resources.
  pub fn open_scans(&self) -> usize { self.scans.load(Ordering::SeqCst) }

  pub fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }

  /// The shared connection, or [`Error::Closed`] after `close`.
  pub(crate) fn conn(&self) -> Result<&tokio_rusqlite::Connection> {
    if self.is_closed() {
      return Err(Error::Closed);
    }
    Ok(&self.conn)
  }

  /// Close the connection for every clone. Later calls are no-ops.
  pub(crate) async fn shutdown(&self) {
    if self.closed.swap(true, Ordering::SeqCst) {
      return;
    }
    match self.conn.clone().close().await {
      Ok(()) => tracing::info!("sqlite store closed"),
      Err(e) => tracing::warn!(error = %e, "failed to close sqlite store"),
    }
  }
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  async fn create_entity(&self, kind: EntityKind, fields: Fields) -> Result<Entity> {
    let entity = Entity::new(kind, fields)?;

    let kind_str   = kind.as_str();
    let id_str     = encode_uuid(entity.id);
    let insert_str = encode_dt(entity.date_insert);
    let update_str = encode_dt(entity.date_update);
    let fields_str = serde_json::to_string(&entity.fields)?;

    self
      .conn()?
      .call(move |conn| {
        conn.execute(
          "INSERT INTO entities (kind, entity_id, revision, date_insert, date_update, fields_json)
           VALUES (?1, ?2, 0, ?3, ?4, ?5)",
          rusqlite::params![kind_str, id_str, insert_str, update_str, fields_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(entity)
  }

  async fn get_entity(&self, kind: EntityKind, id: Uuid) -> Result<Option<Entity>> {
    let kind_str = kind.as_str();
    let id_str   = encode_uuid(id);

    let raw: Option<RawEntity> = self
      .conn()?
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {} FROM entities WHERE kind = ?1 AND entity_id = ?2",
              RawEntity::COLUMNS
            ),
            rusqlite::params![kind_str, id_str],
            RawEntity::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }

  async fn list_entities(&self, kind: EntityKind) -> Result<Vec<Entity>> {
    let kind_str = kind.as_str();

    let raws: Vec<RawEntity> = self
      .conn()?
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM entities WHERE kind = ?1 ORDER BY date_insert, entity_id",
          RawEntity::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![kind_str], RawEntity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn replace_entity(
    &self,
    entity:            &Entity,
    expected_revision: u64,
  ) -> Result<WriteOutcome> {
    let revision = i64::try_from(expected_revision)
      .map_err(|_| Error::Decode(format!("revision {expected_revision} out of range")))?;
    let kind_str   = entity.kind.as_str();
    let id_str     = encode_uuid(entity.id);
    let update_str = encode_dt(entity.date_update);
    let fields_str = serde_json::to_string(&entity.fields)?;

    // The revision predicate makes compare-and-write a single statement.
    let (written, exists): (bool, bool) = self
      .conn()?
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE entities
             SET fields_json = ?1, date_update = ?2, revision = revision + 1
           WHERE kind = ?3 AND entity_id = ?4 AND revision = ?5",
          rusqlite::params![fields_str, update_str, kind_str, id_str, revision],
        )?;
        if changed == 1 {
          return Ok((true, true));
        }
        let exists = conn
          .query_row(
            "SELECT 1 FROM entities WHERE kind = ?1 AND entity_id = ?2",
            rusqlite::params![kind_str, id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        Ok((false, exists))
      })
      .await?;

    Ok(match (written, exists) {
      (true, _) => WriteOutcome::Written(expected_revision + 1),
      (false, true) => WriteOutcome::Stale,
      (false, false) => WriteOutcome::Missing,
    })
  }

  async fn delete_entity(&self, kind: EntityKind, id: Uuid) -> Result<bool> {
    let kind_str = kind.as_str();
    let id_str   = encode_uuid(id);

    let changed: usize = self
      .conn()?
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM entities WHERE kind = ?1 AND entity_id = ?2",
          rusqlite::params![kind_str, id_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }
}
