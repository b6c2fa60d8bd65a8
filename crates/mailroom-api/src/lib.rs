//! JSON REST API for Mailroom.
//!
//! Exposes an axum [`Router`] backed by any store implementing both
//! [`RecordStore`] and [`IdentityStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", mailroom_api::api_router(store.clone()))
//! ```

pub mod entities;
pub mod error;
pub mod identities;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use mailroom_core::store::{IdentityStore, RecordStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: RecordStore + IdentityStore + 'static,
{
  Router::new()
    // Records
    .route(
      "/entities/{kind}",
      get(entities::list::<S>).post(entities::create::<S>),
    )
    .route(
      "/entities/{kind}/{id}",
      get(entities::get_one::<S>)
        .patch(entities::patch_one::<S>)
        .delete(entities::delete_one::<S>),
    )
    // Identities
    .route("/identities/{user_id}/remotes", post(identities::create_remote::<S>))
    .route(
      "/identities/{user_id}/remotes/{identifier}",
      get(identities::get_remote::<S>)
        .patch(identities::update_remote::<S>)
        .delete(identities::delete_remote::<S>),
    )
    .route(
      "/identities/{user_id}/locals",
      get(identities::list_locals::<S>).post(identities::create_local::<S>),
    )
    .with_state(store)
}
