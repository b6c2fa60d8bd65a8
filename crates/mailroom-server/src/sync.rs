//! Periodic sweep over every remote identity.
//!
//! Each tick drains one [`IdentityStore::retrieve_all_remotes`] cursor from
//! start to end. Bindings are visited one at a time, so memory stays flat no
//! matter how many users the store holds. Polling the external accounts
//! themselves happens elsewhere; the sweep decides which bindings are due and
//! reports what it saw.

use std::{sync::Arc, time::Duration};

use mailroom_core::{
  Error,
  identity::{IdentityStatus, RemoteIdentity},
  store::{IdentityStore, RemoteCursor},
};
use tokio::time::MissedTickBehavior;

/// Counts gathered by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
  pub total:    usize,
  pub active:   usize,
  pub inactive: usize,
  pub deleted:  usize,
}

impl SweepReport {
  fn record(&mut self, remote: &RemoteIdentity) {
    self.total += 1;
    match remote.status {
      IdentityStatus::Active => self.active += 1,
      IdentityStatus::Inactive => self.inactive += 1,
      IdentityStatus::Deleted => self.deleted += 1,
    }
  }
}

/// Drain one full scan. The first scan error aborts the sweep.
pub async fn sweep<S: IdentityStore>(store: &S) -> Result<SweepReport, Error> {
  let mut cursor = store
    .retrieve_all_remotes()
    .await
    .map_err(Into::<Error>::into)?;

  let mut report = SweepReport::default();
  while let Some(item) = cursor.next().await {
    let remote = item.map_err(Into::<Error>::into)?;
    if remote.status == IdentityStatus::Active {
      tracing::debug!(
        user_id = %remote.user_id,
        identifier = %remote.identifier,
        protocol = %remote.protocol,
        "remote identity due for sync"
      );
    }
    report.record(&remote);
  }
  Ok(report)
}

/// Sweep every `period` until the task is aborted.
pub async fn run<S: IdentityStore>(store: Arc<S>, period: Duration) {
  let mut ticker = tokio::time::interval(period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    ticker.tick().await;
    match sweep(store.as_ref()).await {
      Ok(report) => tracing::info!(
        total = report.total,
        active = report.active,
        inactive = report.inactive,
        deleted = report.deleted,
        "remote identity sweep finished"
      ),
      Err(e) => tracing::warn!(error = %e, "remote identity sweep failed"),
    }
  }
}
