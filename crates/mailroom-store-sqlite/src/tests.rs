//! Integration tests for `SqliteStore` against an in-memory database.

use std::{
  collections::{BTreeSet, HashSet},
  sync::Arc,
};

use mailroom_core::{
  entity::{EntityKind, Fields},
  identity::{IdentityStatus, LocalIdentity, RemoteField, RemoteIdentity},
  patch::{PatchRequest, apply_patch},
  store::{IdentityStore, RecordStore, RemoteCursor, WriteOutcome},
};
use serde_json::{Value, json};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn fields(v: Value) -> Fields {
  match v {
    Value::Object(m) => m,
    other => panic!("not an object: {other}"),
  }
}

fn core_err(e: crate::Error) -> mailroom_core::Error { e.into() }

// ─── Entities ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_entity() {
  let s = store().await;

  let created = s
    .create_entity(EntityKind::Contact, fields(json!({ "given_name": "Ana" })))
    .await
    .unwrap();
  assert_eq!(created.revision, 0);

  let fetched = s.get_entity(EntityKind::Contact, created.id).await.unwrap();
  assert_eq!(fetched, Some(created.clone()));

  // Same id under another kind is a different record.
  let other = s.get_entity(EntityKind::Tag, created.id).await.unwrap();
  assert!(other.is_none());
}

#[tokio::test]
async fn create_entity_rejects_reserved_fields() {
  let s = store().await;
  let err = s
    .create_entity(EntityKind::Tag, fields(json!({ "date_update": "now" })))
    .await
    .unwrap_err();
  assert!(matches!(core_err(err), mailroom_core::Error::Malformed(_)));
}

#[tokio::test]
async fn list_entities_by_kind() {
  let s = store().await;
  s.create_entity(EntityKind::Tag, fields(json!({ "name": "a" }))).await.unwrap();
  s.create_entity(EntityKind::Tag, fields(json!({ "name": "b" }))).await.unwrap();
  s.create_entity(EntityKind::Contact, Fields::new()).await.unwrap();

  let tags = s.list_entities(EntityKind::Tag).await.unwrap();
  assert_eq!(tags.len(), 2);
  assert!(tags.iter().all(|t| t.kind == EntityKind::Tag));
}

#[tokio::test]
async fn replace_entity_checks_revision() {
  let s = store().await;
  let mut e = s.create_entity(EntityKind::User, Fields::new()).await.unwrap();

  e.fields.insert("name".into(), json!("ana"));
  assert_eq!(s.replace_entity(&e, 0).await.unwrap(), WriteOutcome::Written(1));
  assert_eq!(s.replace_entity(&e, 0).await.unwrap(), WriteOutcome::Stale);

  let stored = s.get_entity(EntityKind::User, e.id).await.unwrap().unwrap();
  assert_eq!(stored.revision, 1);
  assert_eq!(stored.fields["name"], json!("ana"));

  e.id = Uuid::new_v4();
  assert_eq!(s.replace_entity(&e, 1).await.unwrap(), WriteOutcome::Missing);
}

#[tokio::test]
async fn delete_entity_reports_presence() {
  let s = store().await;
  let e = s.create_entity(EntityKind::Message, Fields::new()).await.unwrap();

  assert!(s.delete_entity(EntityKind::Message, e.id).await.unwrap());
  assert!(!s.delete_entity(EntityKind::Message, e.id).await.unwrap());
  assert!(s.get_entity(EntityKind::Message, e.id).await.unwrap().is_none());
}

// ─── Conditional patches ─────────────────────────────────────────────────────

async fn ana_lee(s: &SqliteStore) -> Uuid {
  s.create_entity(
    EntityKind::Contact,
    fields(json!({ "given_name": "Ana", "family_name": "Lee" })),
  )
  .await
  .unwrap()
  .id
}

#[tokio::test]
async fn matching_patch_merges_and_stale_patch_conflicts() {
  let s = store().await;
  let id = ana_lee(&s).await;

  // Client A asserts only the field it cares about.
  apply_patch(
    &s,
    EntityKind::Contact,
    id,
    PatchRequest::new(
      fields(json!({ "given_name": "Ana" })),
      fields(json!({ "family_name": "Diaz" })),
    ),
  )
  .await
  .unwrap();

  let after_a = s.get_entity(EntityKind::Contact, id).await.unwrap().unwrap();
  assert_eq!(
    after_a.fields,
    fields(json!({ "given_name": "Ana", "family_name": "Diaz" }))
  );

  // Client B still believes the family name is Lee.
  let stale = PatchRequest::new(
    fields(json!({ "family_name": "Lee" })),
    fields(json!({ "given_name": "Anna" })),
  );
  for _ in 0..2 {
    let err = apply_patch(&s, EntityKind::Contact, id, stale.clone())
      .await
      .unwrap_err();
    assert!(matches!(err, mailroom_core::Error::Conflict(_)), "{err}");
  }

  let after_b = s.get_entity(EntityKind::Contact, id).await.unwrap().unwrap();
  assert_eq!(after_b, after_a);
}

#[tokio::test]
async fn full_expected_state_applies_merge() {
  let s = store().await;
  let id = ana_lee(&s).await;
  let before = s.get_entity(EntityKind::Contact, id).await.unwrap().unwrap();

  apply_patch(
    &s,
    EntityKind::Contact,
    id,
    PatchRequest::new(
      before.document(),
      fields(json!({ "family_name": null, "emails": [{ "address": "ana@example.com" }] })),
    ),
  )
  .await
  .unwrap();

  let after = s.get_entity(EntityKind::Contact, id).await.unwrap().unwrap();
  assert_eq!(
    after.fields,
    fields(json!({ "given_name": "Ana", "emails": [{ "address": "ana@example.com" }] }))
  );
  assert_eq!(after.date_insert, before.date_insert);
}

#[tokio::test]
async fn empty_patch_only_touches_date_update() {
  let s = store().await;
  let id = ana_lee(&s).await;
  let before = s.get_entity(EntityKind::Contact, id).await.unwrap().unwrap();

  apply_patch(
    &s,
    EntityKind::Contact,
    id,
    PatchRequest::new(fields(json!({ "given_name": "Ana" })), Fields::new()),
  )
  .await
  .unwrap();

  let after = s.get_entity(EntityKind::Contact, id).await.unwrap().unwrap();
  assert_eq!(after.fields, before.fields);
  assert_eq!(after.date_insert, before.date_insert);
  assert!(after.date_update >= before.date_update);
  assert_eq!(after.revision, before.revision + 1);
}

#[tokio::test]
async fn stale_date_update_assertion_conflicts() {
  let s = store().await;
  let id = ana_lee(&s).await;
  let snapshot = s.get_entity(EntityKind::Contact, id).await.unwrap().unwrap().document();

  let request = PatchRequest::new(snapshot, fields(json!({ "nickname": "A" })));
  apply_patch(&s, EntityKind::Contact, id, request.clone()).await.unwrap();

  // The first patch moved date_update and revision, so the snapshot is stale.
  let err = apply_patch(&s, EntityKind::Contact, id, request).await.unwrap_err();
  assert!(matches!(err, mailroom_core::Error::Conflict(_)));
}

#[tokio::test]
async fn patch_missing_entity_is_not_found() {
  let s = store().await;
  let err = apply_patch(
    &s,
    EntityKind::Contact,
    Uuid::new_v4(),
    PatchRequest::default(),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, mailroom_core::Error::NotFound(_)));
}

#[tokio::test]
async fn malformed_patch_writes_nothing() {
  let s = store().await;
  let id = ana_lee(&s).await;
  let before = s.get_entity(EntityKind::Contact, id).await.unwrap().unwrap();

  let err = apply_patch(
    &s,
    EntityKind::Contact,
    id,
    PatchRequest::new(Fields::new(), fields(json!({ "revision": 99 }))),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, mailroom_core::Error::Malformed(_)));

  let after = s.get_entity(EntityKind::Contact, id).await.unwrap().unwrap();
  assert_eq!(after, before);
}

#[tokio::test]
async fn concurrent_patches_on_same_field_admit_one_winner() {
  let s = store().await;
  let id = s
    .create_entity(EntityKind::Discussion, fields(json!({ "counter": 0 })))
    .await
    .unwrap()
    .id;

  let patch = |n: i64| {
    PatchRequest::new(fields(json!({ "counter": 0 })), fields(json!({ "counter": n })))
  };

  let (a, b) = tokio::join!(
    apply_patch(&s, EntityKind::Discussion, id, patch(1)),
    apply_patch(&s, EntityKind::Discussion, id, patch(2)),
  );

  assert!(a.is_ok() ^ b.is_ok(), "a={a:?} b={b:?}");
  let loser = if a.is_ok() { b } else { a };
  assert!(matches!(loser, Err(mailroom_core::Error::Conflict(_))));

  let stored = s.get_entity(EntityKind::Discussion, id).await.unwrap().unwrap();
  assert_eq!(stored.revision, 1);
  assert!(stored.fields["counter"] == json!(1) || stored.fields["counter"] == json!(2));
}

#[tokio::test]
async fn concurrent_patches_on_disjoint_fields_both_land() {
  let s = store().await;
  let id = s
    .create_entity(
      EntityKind::Contact,
      fields(json!({ "given_name": "Ana", "family_name": "Lee" })),
    )
    .await
    .unwrap()
    .id;

  let nickname = PatchRequest::new(
    fields(json!({ "given_name": "Ana" })),
    fields(json!({ "nickname": "Annie" })),
  );
  let title = PatchRequest::new(
    fields(json!({ "family_name": "Lee" })),
    fields(json!({ "title": "Dr" })),
  );

  let (a, b) = tokio::join!(
    apply_patch(&s, EntityKind::Contact, id, nickname),
    apply_patch(&s, EntityKind::Contact, id, title),
  );
  assert!(a.is_ok(), "{a:?}");
  assert!(b.is_ok(), "{b:?}");

  let stored = s.get_entity(EntityKind::Contact, id).await.unwrap().unwrap();
  assert_eq!(stored.revision, 2);
  assert_eq!(
    stored.fields,
    fields(json!({
      "given_name":  "Ana",
      "family_name": "Lee",
      "nickname":    "Annie",
      "title":       "Dr",
    }))
  );
}

#[tokio::test]
async fn racing_patches_on_unrelated_fields_all_land() {
  let s = Arc::new(store().await);
  let id = s
    .create_entity(EntityKind::Contact, fields(json!({ "given_name": "Ana" })))
    .await
    .unwrap()
    .id;

  let mut tasks = JoinSet::new();
  for n in 0..8 {
    let s = s.clone();
    tasks.spawn(async move {
      let request = PatchRequest::new(
        fields(json!({ "given_name": "Ana" })),
        fields(json!({ format!("note_{n}"): n })),
      );
      apply_patch(s.as_ref(), EntityKind::Contact, id, request).await
    });
  }
  while let Some(joined) = tasks.join_next().await {
    let result = joined.unwrap();
    assert!(result.is_ok(), "{result:?}");
  }

  let stored = s.get_entity(EntityKind::Contact, id).await.unwrap().unwrap();
  assert_eq!(stored.revision, 8);
  for n in 0..8 {
    assert_eq!(stored.fields[&format!("note_{n}")], json!(n));
  }
}

// ─── Remote identities ───────────────────────────────────────────────────────

fn imap(user_id: Uuid, identifier: &str) -> RemoteIdentity {
  let mut r = RemoteIdentity::new(user_id, identifier, "imap");
  r.display_name = Some("Work mail".into());
  r.credentials = json!({ "username": identifier, "password": "hunter2" });
  r.infos.insert("server".into(), "imap.example.com:993".into());
  r
}

#[tokio::test]
async fn create_and_retrieve_remote_identity() {
  let s = store().await;
  let user = Uuid::new_v4();
  let remote = imap(user, "ana@example.com");

  s.create_remote_identity(&remote).await.unwrap();
  let fetched = s.retrieve_remote_identity(user, "ana@example.com").await.unwrap();

  assert_eq!(fetched, remote);
}

#[tokio::test]
async fn duplicate_remote_identity_already_exists() {
  let s = store().await;
  let user = Uuid::new_v4();
  s.create_remote_identity(&imap(user, "ana@example.com")).await.unwrap();

  let err = s
    .create_remote_identity(&imap(user, "ana@example.com"))
    .await
    .unwrap_err();
  assert!(matches!(core_err(err), mailroom_core::Error::AlreadyExists(_)));

  // Same identifier under another user is a separate binding.
  s.create_remote_identity(&imap(Uuid::new_v4(), "ana@example.com"))
    .await
    .unwrap();
}

#[tokio::test]
async fn blank_remote_identity_is_malformed() {
  let s = store().await;
  let mut remote = imap(Uuid::new_v4(), "ana@example.com");
  remote.protocol = " ".into();

  let err = s.create_remote_identity(&remote).await.unwrap_err();
  assert!(matches!(core_err(err), mailroom_core::Error::Malformed(_)));
}

#[tokio::test]
async fn retrieve_missing_remote_is_not_found() {
  let s = store().await;
  let err = s
    .retrieve_remote_identity(Uuid::new_v4(), "nobody@example.com")
    .await
    .unwrap_err();
  assert!(matches!(core_err(err), mailroom_core::Error::NotFound(_)));
}

#[tokio::test]
async fn update_status_leaves_other_fields() {
  let s = store().await;
  let user = Uuid::new_v4();
  let original = imap(user, "ana@example.com");
  s.create_remote_identity(&original).await.unwrap();

  // Every attribute differs, but only status is named.
  let mut changed = imap(user, "ana@example.com");
  changed.status = IdentityStatus::Inactive;
  changed.protocol = "pop3".into();
  changed.credentials = json!({ "token": "other" });
  changed.display_name = None;

  s.update_remote_identity(&changed, &BTreeSet::from([RemoteField::Status]))
    .await
    .unwrap();

  let stored = s.retrieve_remote_identity(user, "ana@example.com").await.unwrap();
  assert_eq!(stored.status, IdentityStatus::Inactive);
  assert_eq!(stored.protocol, original.protocol);
  assert_eq!(stored.credentials, original.credentials);
  assert_eq!(stored.display_name, original.display_name);
  assert_eq!(stored.infos, original.infos);
  assert!(stored.date_update >= original.date_update);
}

#[tokio::test]
async fn update_several_fields() {
  let s = store().await;
  let user = Uuid::new_v4();
  let mut remote = imap(user, "ana@example.com");
  s.create_remote_identity(&remote).await.unwrap();

  let checked = chrono::Utc::now();
  remote.last_check = Some(checked);
  remote.display_name = None;
  s.update_remote_identity(
    &remote,
    &BTreeSet::from([RemoteField::LastCheck, RemoteField::DisplayName]),
  )
  .await
  .unwrap();

  let stored = s.retrieve_remote_identity(user, "ana@example.com").await.unwrap();
  assert_eq!(stored.last_check, Some(checked));
  assert_eq!(stored.display_name, None);
}

#[tokio::test]
async fn update_missing_remote_is_not_found() {
  let s = store().await;
  let err = s
    .update_remote_identity(
      &imap(Uuid::new_v4(), "ana@example.com"),
      &BTreeSet::from([RemoteField::Status]),
    )
    .await
    .unwrap_err();
  assert!(matches!(core_err(err), mailroom_core::Error::NotFound(_)));
}

#[tokio::test]
async fn delete_remote_identity() {
  let s = store().await;
  let user = Uuid::new_v4();
  s.create_remote_identity(&imap(user, "ana@example.com")).await.unwrap();

  s.delete_remote_identity(user, "ana@example.com").await.unwrap();
  let err = s
    .delete_remote_identity(user, "ana@example.com")
    .await
    .unwrap_err();
  assert!(matches!(core_err(err), mailroom_core::Error::NotFound(_)));
}

// ─── Local identities ────────────────────────────────────────────────────────

#[tokio::test]
async fn local_identities_by_user() {
  let s = store().await;
  let user = Uuid::new_v4();

  assert!(s.get_local_identities(user).await.unwrap().is_empty());

  s.create_local_identity(&LocalIdentity::new(user, "b@mailroom.local")).await.unwrap();
  s.create_local_identity(&LocalIdentity::new(user, "a@mailroom.local")).await.unwrap();
  s.create_local_identity(&LocalIdentity::new(Uuid::new_v4(), "c@mailroom.local"))
    .await
    .unwrap();

  let locals = s.get_local_identities(user).await.unwrap();
  let names: Vec<_> = locals.iter().map(|l| l.identifier.as_str()).collect();
  assert_eq!(names, ["a@mailroom.local", "b@mailroom.local"]);

  let err = s
    .create_local_identity(&LocalIdentity::new(user, "a@mailroom.local"))
    .await
    .unwrap_err();
  assert!(matches!(core_err(err), mailroom_core::Error::AlreadyExists(_)));
}

// ─── Bulk scan ───────────────────────────────────────────────────────────────

async fn seeded(n: usize, page: usize) -> SqliteStore {
  let s = store().await.with_scan_page_size(page);
  for i in 0..n {
    let user = Uuid::new_v4();
    s.create_remote_identity(&imap(user, &format!("user{i}@example.com")))
      .await
      .unwrap();
  }
  s
}

#[tokio::test]
async fn scan_yields_every_binding_once() {
  for (n, page) in [(0, 3), (7, 3), (6, 3), (5, 100)] {
    let s = seeded(n, page).await;
    let mut cursor = s.retrieve_all_remotes().await.unwrap();
    assert_eq!(s.open_scans(), 1);

    let mut seen = HashSet::new();
    while let Some(item) = cursor.next().await {
      let remote = item.unwrap();
      assert!(seen.insert((remote.user_id, remote.identifier)), "duplicate");
    }
    assert_eq!(seen.len(), n, "n={n} page={page}");

    // Exhaustion releases the scan and the cursor stays finished.
    assert_eq!(s.open_scans(), 0);
    assert!(cursor.next().await.is_none());
  }
}

#[tokio::test]
async fn slow_consumer_sees_each_binding_once() {
  let s = seeded(5, 2).await;
  let mut cursor = s.retrieve_all_remotes().await.unwrap();

  let mut count = 0;
  while let Some(item) = cursor.next().await {
    item.unwrap();
    count += 1;
    tokio::task::yield_now().await;
  }
  assert_eq!(count, 5);
}

#[tokio::test]
async fn dropping_cursor_early_releases_scan() {
  let s = seeded(10, 3).await;
  assert_eq!(s.open_scans(), 0);

  {
    let mut cursor = s.retrieve_all_remotes().await.unwrap();
    cursor.next().await.unwrap().unwrap();
    cursor.next().await.unwrap().unwrap();
    assert_eq!(s.open_scans(), 1);
  }

  assert_eq!(s.open_scans(), 0);
}

#[tokio::test]
async fn closing_cursor_ends_sequence() {
  let s = seeded(4, 2).await;
  let mut cursor = s.retrieve_all_remotes().await.unwrap();
  cursor.next().await.unwrap().unwrap();

  cursor.close();
  assert_eq!(s.open_scans(), 0);
  assert!(cursor.next().await.is_none());

  // A fresh call re-scans from the start.
  let mut again = s.retrieve_all_remotes().await.unwrap();
  let mut count = 0;
  while let Some(item) = again.next().await {
    item.unwrap();
    count += 1;
  }
  assert_eq!(count, 4);
}

#[tokio::test]
async fn scan_error_is_surfaced_then_terminates() {
  let s = seeded(5, 2).await;
  let mut cursor = s.retrieve_all_remotes().await.unwrap();
  cursor.next().await.unwrap().unwrap();
  cursor.next().await.unwrap().unwrap();

  s.close().await;

  let err = cursor.next().await.expect("error item").unwrap_err();
  assert!(matches!(core_err(err), mailroom_core::Error::StoreUnavailable(_)));
  assert!(cursor.next().await.is_none());
  assert_eq!(s.open_scans(), 0);
}

// ─── Close ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn close_is_idempotent_and_fails_later_calls() {
  let s = store().await;
  let clone = s.clone();

  s.close().await;
  s.close().await;
  assert!(clone.is_closed());

  let err = clone.get_entity(EntityKind::Tag, Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, crate::Error::Closed));
  assert!(matches!(core_err(err), mailroom_core::Error::StoreUnavailable(_)));

  let err = clone.retrieve_all_remotes().await.map(|_| ()).unwrap_err();
  assert!(matches!(err, crate::Error::Closed));
}
