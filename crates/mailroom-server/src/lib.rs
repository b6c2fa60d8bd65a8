//! Server assembly for Mailroom.
//!
//! Holds the runtime configuration, the top-level HTTP router, and the
//! background remote-identity sweep. The `mailroomd` binary wires these
//! together.

pub mod sync;

use std::{path::PathBuf, sync::Arc};

use axum::Router;
use mailroom_core::store::{IdentityStore, RecordStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `MAILROOM_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:               String,
  #[serde(default = "default_port")]
  pub port:               u16,
  pub store_path:         PathBuf,
  /// Seconds between two remote-identity sweeps.
  #[serde(default = "default_sync_interval")]
  pub sync_interval_secs: u64,
  /// Rows fetched per page by a remote-identity scan.
  #[serde(default = "default_scan_page_size")]
  pub scan_page_size:     usize,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 31415 }

fn default_sync_interval() -> u64 { 300 }

fn default_scan_page_size() -> usize { mailroom_store_sqlite::DEFAULT_SCAN_PAGE_SIZE }

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full application router: the JSON API under `/api`, with request
/// tracing.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: RecordStore + IdentityStore + 'static,
{
  Router::new()
    .nest("/api", mailroom_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}
