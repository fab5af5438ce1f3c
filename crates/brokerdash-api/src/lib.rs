//! JSON REST API for the broker dashboard.
//!
//! Exposes an axum [`Router`] over a [`Registry`], its notification store
//! and the engagement engine. Auth, TLS, and transport concerns are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", brokerdash_api::api_router(state))
//! ```

pub mod analytics;
pub mod error;
pub mod listings;
pub mod notifications;

use axum::{
  Router,
  routing::{get, post},
};
use brokerdash_analytics::{EngagementEngine, RecordedSource};
use brokerdash_core::store::KvStore;
use brokerdash_sync::{NotificationStore, Registry};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S: KvStore> {
  pub registry:      Registry<S>,
  pub notifications: NotificationStore,
  pub engine:        EngagementEngine<S>,
  /// Where ingested samples go. `None` when the engine is fed some other
  /// way; the ingestion endpoints then answer 409.
  pub recorder:      Option<RecordedSource>,
}

impl<S: KvStore> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      registry:      self.registry.clone(),
      notifications: self.notifications.clone(),
      engine:        self.engine.clone(),
      recorder:      self.recorder.clone(),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: KvStore + 'static,
{
  Router::new()
    // Listings
    .route("/listings", get(listings::list::<S>))
    .route("/listings/grouped", get(listings::grouped::<S>))
    .route(
      "/listings/{reference}",
      get(listings::get_one::<S>)
        .put(listings::upsert::<S>)
        .delete(listings::remove::<S>),
    )
    .route("/listings/{reference}/status", post(listings::set_status::<S>))
    .route("/listings/{reference}/pin", post(listings::set_pinned::<S>))
    // Notifications
    .route("/notifications/{recipient}", get(notifications::list::<S>))
    .route(
      "/notifications/{recipient}/read",
      post(notifications::mark_all_read::<S>),
    )
    .route(
      "/notifications/{recipient}/{id}",
      axum::routing::delete(notifications::remove::<S>),
    )
    .route(
      "/notifications/{recipient}/{id}/read",
      post(notifications::mark_read::<S>),
    )
    // Analytics
    .route("/analytics/ranking", get(analytics::ranking::<S>))
    .route("/analytics/export.csv", get(analytics::export::<S>))
    .route("/analytics/recompute", post(analytics::recompute::<S>))
    .route("/analytics/samples", post(analytics::ingest_samples::<S>))
    .route("/analytics/interactions", post(analytics::ingest_interaction::<S>))
    .route("/analytics/roll-period", post(analytics::roll_period::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
