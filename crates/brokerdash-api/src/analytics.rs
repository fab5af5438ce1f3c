//! Handlers for `/analytics` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/analytics/ranking` | Optional `?top_n=&metric=&trend=` |
//! | `GET`  | `/analytics/export.csv` | Cached snapshots as CSV |
//! | `POST` | `/analytics/recompute` | Recompute now; returns every snapshot |
//! | `POST` | `/analytics/samples` | Body: array of viewer samples |
//! | `POST` | `/analytics/interactions` | Body: `{"listing":"..","interaction":"view","count":1}` |
//! | `POST` | `/analytics/roll-period` | Current counts become the trend baseline |
//!
//! Ranking and export read the engine's cache, which is filled by the
//! periodic pass while the server holds a subscription.

use axum::{
  Json,
  extract::{Query, State},
  http::{StatusCode, header},
  response::IntoResponse,
};
use brokerdash_analytics::{
  EngagementSnapshot, RankMetric, RecordedSource, Trend, rank::filter_trend, rank_by,
};
use brokerdash_core::{
  sample::{Interaction, ViewerSample},
  store::KvStore,
};
use brokerdash_export::export_csv;
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

// ─── Reading ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RankingParams {
  pub top_n:  Option<usize>,
  #[serde(default)]
  pub metric: RankMetric,
  pub trend:  Option<Trend>,
}

/// `GET /analytics/ranking[?top_n=&metric=&trend=]`
pub async fn ranking<S: KvStore + 'static>(
  State(state): State<AppState<S>>,
  Query(params): Query<RankingParams>,
) -> Json<Vec<EngagementSnapshot>> {
  let top_n = params.top_n.unwrap_or(state.engine.config().default_top_n);
  let mut snapshots = state.engine.snapshots();
  if let Some(trend) = params.trend {
    snapshots = filter_trend(snapshots, trend);
  }
  Json(rank_by(snapshots, params.metric, top_n))
}

/// `GET /analytics/export.csv`
pub async fn export<S: KvStore + 'static>(
  State(state): State<AppState<S>>,
) -> impl IntoResponse {
  let body = export_csv(&state.engine.snapshots());
  (
    [
      (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
      (
        header::CONTENT_DISPOSITION,
        "attachment; filename=\"listing-analytics.csv\"",
      ),
    ],
    body,
  )
}

/// `POST /analytics/recompute`
pub async fn recompute<S: KvStore + 'static>(
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<EngagementSnapshot>>, ApiError> {
  Ok(Json(state.engine.recompute_now().await?))
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

fn recorder<S: KvStore>(state: &AppState<S>) -> Result<&RecordedSource, ApiError> {
  state
    .recorder
    .as_ref()
    .ok_or_else(|| ApiError::Conflict("sample ingestion is disabled".into()))
}

#[derive(Debug, Serialize)]
pub struct Accepted {
  pub accepted: usize,
}

/// `POST /analytics/samples`, body `[ViewerSample, ...]`
///
/// All or nothing: a sample for an unknown listing rejects the batch.
pub async fn ingest_samples<S: KvStore>(
  State(state): State<AppState<S>>,
  Json(samples): Json<Vec<ViewerSample>>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
  let recorder = recorder(&state)?;
  if let Some(unknown) = samples
    .iter()
    .find(|s| state.registry.get(&s.listing_id).is_none())
  {
    return Err(ApiError::NotFound(format!(
      "listing {:?} not found",
      unknown.listing_id
    )));
  }
  let accepted = samples.len();
  for sample in samples {
    recorder.record_sample(sample);
  }
  Ok((StatusCode::ACCEPTED, Json(Accepted { accepted })))
}

#[derive(Debug, Deserialize)]
pub struct InteractionBody {
  pub listing:     String,
  pub interaction: Interaction,
  #[serde(default = "one")]
  pub count:       u64,
}

fn one() -> u64 { 1 }

/// `POST /analytics/interactions`
///
/// Views also bump the listing card's view counter; WhatsApp messages, phone
/// calls and bookings bump its request counter.
pub async fn ingest_interaction<S: KvStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<InteractionBody>,
) -> Result<StatusCode, ApiError> {
  let recorder = recorder(&state)?;
  let (views, requests) = match body.interaction {
    Interaction::View => (body.count, 0),
    Interaction::WhatsappMessage | Interaction::PhoneCall | Interaction::Booking => {
      (0, body.count)
    }
    _ => (0, 0),
  };
  // Also the existence check: unknown listings are a 404.
  state.registry.record_activity(&body.listing, views, requests).await?;
  recorder.record_interaction(&body.listing, body.interaction, body.count);
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /analytics/roll-period`
pub async fn roll_period<S: KvStore>(
  State(state): State<AppState<S>>,
) -> Result<StatusCode, ApiError> {
  recorder(&state)?.roll_period();
  Ok(StatusCode::NO_CONTENT)
}
