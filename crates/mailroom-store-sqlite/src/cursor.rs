//! [`SqliteRemoteCursor`] — paged, pull-driven scan over `remote_identities`.
//!
//! Each page is a keyset query ordered by the `(user_id, identifier)` primary
//! key, so no statement stays open between pulls and concurrent writers are
//! never blocked by a slow consumer. The store counts live cursors; a cursor
//! stops counting as soon as it is exhausted, fails, is closed, or is dropped.

use std::{
  collections::VecDeque,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
};

use mailroom_core::{identity::RemoteIdentity, store::RemoteCursor};

use crate::{Error, Result, SqliteStore, encode::RawRemote};

/// Registration of one live scan in the store's counter.
struct ScanGuard(Arc<AtomicUsize>);

impl ScanGuard {
  fn acquire(counter: &Arc<AtomicUsize>) -> Self {
    counter.fetch_add(1, Ordering::SeqCst);
    Self(Arc::clone(counter))
  }
}

impl Drop for ScanGuard {
  fn drop(&mut self) { self.0.fetch_sub(1, Ordering::SeqCst); }
}

/// Forward-only cursor returned by
/// [`IdentityStore::retrieve_all_remotes`](mailroom_core::store::IdentityStore).
pub struct SqliteRemoteCursor {
  store:     SqliteStore,
  buffer:    VecDeque<RawRemote>,
  /// Key of the last row fetched; the next page starts strictly after it.
  after:     Option<(String, String)>,
  /// The last page came back short, so nothing is left to fetch.
  exhausted: bool,
  guard:     Option<ScanGuard>,
}

impl SqliteRemoteCursor {
  pub(crate) fn new(store: SqliteStore) -> Self {
    let guard = ScanGuard::acquire(&store.scans);
    Self {
      store,
      buffer: VecDeque::new(),
      after: None,
      exhausted: false,
      guard: Some(guard),
    }
  }

  async fn fill(&mut self) -> Result<()> {
    let (after_user, after_identifier) = self.after.clone().unzip();
    let limit = i64::try_from(self.store.page).unwrap_or(i64::MAX);

    let rows: Vec<RawRemote> = self
      .store
      .conn()?
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM remote_identities
           WHERE ?1 IS NULL OR (user_id, identifier) > (?1, ?2)
           ORDER BY user_id, identifier
           LIMIT ?3",
          RawRemote::COLUMNS
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![after_user, after_identifier, limit],
            RawRemote::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    self.exhausted = rows.len() < self.store.page;
    if let Some(last) = rows.last() {
      self.after = Some((last.user_id.clone(), last.identifier.clone()));
    }
    self.buffer.extend(rows);
    Ok(())
  }

  /// Give the scan back after a failure; the error is reported once.
  fn fail(&mut self, e: Error) -> Option<Result<RemoteIdentity>> {
    tracing::warn!(error = %e, "remote identity scan aborted");
    self.close();
    Some(Err(e))
  }
}

impl RemoteCursor for SqliteRemoteCursor {
  type Error = Error;

  async fn next(&mut self) -> Option<Result<RemoteIdentity>> {
    self.guard.as_ref()?;

    if self.buffer.is_empty() && !self.exhausted {
      if let Err(e) = self.fill().await {
        return self.fail(e);
      }
    }

    match self.buffer.pop_front() {
      Some(raw) => match raw.into_remote() {
        Ok(remote) => Some(Ok(remote)),
        Err(e) => self.fail(e),
      },
      None => {
        self.close();
        None
      }
    }
  }

  fn close(&mut self) {
    self.buffer.clear();
    self.exhausted = true;
    self.guard = None;
  }
}
