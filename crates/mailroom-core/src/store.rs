//! The `RecordStore` and `IdentityStore` traits.
//!
//! Both are implemented by storage backends (e.g. `mailroom-store-sqlite`).
//! The patch engine, the HTTP layer and the sync scheduler depend on these
//! abstractions, never on a concrete backend.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`). Backend errors
//! convert into [`crate::Error`] so callers can classify them uniformly.

use std::{collections::BTreeSet, future::Future};

use uuid::Uuid;

use crate::{
  entity::{Entity, EntityKind, Fields},
  identity::{LocalIdentity, RemoteField, RemoteIdentity},
};

// ─── Records ─────────────────────────────────────────────────────────────────

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
  /// The write landed; carries the new revision.
  Written(u64),
  /// The entity exists but its revision moved since it was read.
  Stale,
  /// No entity with that kind and id.
  Missing,
}

/// Generic persistence for [`Entity`] records.
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  /// Persist a new entity and return it with its assigned envelope.
  fn create_entity(
    &self,
    kind: EntityKind,
    fields: Fields,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + '_;

  /// Retrieve an entity. Returns `None` if not found.
  fn get_entity(
    &self,
    kind: EntityKind,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;

  /// All entities of a kind, oldest first.
  fn list_entities(
    &self,
    kind: EntityKind,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + '_;

  /// Replace `entity`'s fields and `date_update` only if the stored revision
  /// still equals `expected_revision`.
  ///
  /// The compare and the write must be atomic with respect to any other write
  /// to the same entity.
  fn replace_entity<'a>(
    &'a self,
    entity: &'a Entity,
    expected_revision: u64,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + 'a;

  /// Delete an entity. Returns `false` if it did not exist.
  fn delete_entity(
    &self,
    kind: EntityKind,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Identities ──────────────────────────────────────────────────────────────

/// A forward-only, single-pass cursor over remote identities.
///
/// Items are produced as the consumer pulls them. Once `next` yields an
/// error, or `None`, every later call yields `None`. Dropping the cursor has
/// the same effect as [`close`](RemoteCursor::close).
pub trait RemoteCursor: Send {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  fn next(
    &mut self,
  ) -> impl Future<Output = Option<Result<RemoteIdentity, Self::Error>>> + Send + '_;

  /// Release the scan. Later calls to `next` yield `None`.
  fn close(&mut self);
}

/// Persistence for identity bindings, independent of the storage engine.
pub trait IdentityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;
  type Cursor: RemoteCursor<Error = Self::Error> + 'static;

  /// Insert a new binding. Fails with `AlreadyExists` if
  /// `(user_id, identifier)` is taken, `Malformed` if identifier or protocol
  /// is blank.
  fn create_remote_identity<'a>(
    &'a self,
    identity: &'a RemoteIdentity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Point lookup by the composite key. Fails with `NotFound` if absent.
  fn retrieve_remote_identity<'a>(
    &'a self,
    user_id: Uuid,
    identifier: &'a str,
  ) -> impl Future<Output = Result<RemoteIdentity, Self::Error>> + Send + 'a;

  /// Unconditionally persist exactly `fields` from `identity`, leaving all
  /// other attributes untouched. `date_update` is always refreshed.
  fn update_remote_identity<'a>(
    &'a self,
    identity: &'a RemoteIdentity,
    fields: &'a BTreeSet<RemoteField>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Remove a binding. Fails with `NotFound` if absent.
  fn delete_remote_identity<'a>(
    &'a self,
    user_id: Uuid,
    identifier: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Insert a local identity. Same failure rules as remote creation.
  fn create_local_identity<'a>(
    &'a self,
    identity: &'a LocalIdentity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// All local identities owned by `user_id`; empty if none.
  fn get_local_identities(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LocalIdentity>, Self::Error>> + Send + '_;

  /// Open a cursor over every remote identity of every user.
  ///
  /// A fresh call re-scans from the beginning.
  fn retrieve_all_remotes(
    &self,
  ) -> impl Future<Output = Result<Self::Cursor, Self::Error>> + Send + '_;

  /// Release the underlying connection. Idempotent.
  fn close(&self) -> impl Future<Output = ()> + Send + '_;
}
