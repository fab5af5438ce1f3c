//! Handlers for `/listings` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/listings` | Optional `?status=&city=&owner=&pinned=` |
//! | `GET`    | `/listings/grouped` | Grouped by city |
//! | `PUT`    | `/listings/:reference` | Upsert; body is a partial listing |
//! | `GET`    | `/listings/:reference` | Listing plus `is_structured`; 404 if not found |
//! | `DELETE` | `/listings/:reference` | 204, or 404 if not found |
//! | `POST`   | `/listings/:reference/status` | Body: `{"status":"published"}` |
//! | `POST`   | `/listings/:reference/pin` | Body: `{"pinned":true}` |
//!
//! `:reference` may be any raw form of a listing number (percent-encoded);
//! it is normalized before lookup.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use brokerdash_core::{
  ident::is_structured,
  listing::{Listing, ListingFilter, ListingPatch, ListingStatus},
  store::KvStore,
};
use brokerdash_sync::{CityGroup, group_by_city};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub status: Option<ListingStatus>,
  pub city:   Option<String>,
  pub owner:  Option<String>,
  pub pinned: Option<bool>,
}

impl From<ListParams> for ListingFilter {
  fn from(p: ListParams) -> Self {
    Self { status: p.status, city: p.city, owner_ref: p.owner, pinned: p.pinned }
  }
}

/// `GET /listings[?status=&city=&owner=&pinned=]`
pub async fn list<S: KvStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Json<Vec<Listing>> {
  Json(state.registry.get_all(Some(&params.into())))
}

/// `GET /listings/grouped`
pub async fn grouped<S: KvStore>(
  State(state): State<AppState<S>>,
) -> Json<Vec<CityGroup>> {
  Json(group_by_city(state.registry.get_all(None)))
}

// ─── Single listing ──────────────────────────────────────────────────────────

/// A listing as returned by the detail endpoint.
#[derive(Debug, Serialize)]
pub struct ListingDetail {
  #[serde(flatten)]
  pub listing:       Listing,
  /// Whether the canonical ID is an `AD-<n>-<n>` number rather than an
  /// opaque reference.
  pub is_structured: bool,
}

/// `GET /listings/:reference`
pub async fn get_one<S: KvStore>(
  State(state): State<AppState<S>>,
  Path(reference): Path<String>,
) -> Result<Json<ListingDetail>, ApiError> {
  let listing = state
    .registry
    .get(&reference)
    .ok_or_else(|| ApiError::NotFound(format!("listing {reference:?} not found")))?;
  let is_structured = is_structured(&listing.canonical_id);
  Ok(Json(ListingDetail { listing, is_structured }))
}

/// `PUT /listings/:reference`
pub async fn upsert<S: KvStore>(
  State(state): State<AppState<S>>,
  Path(reference): Path<String>,
  Json(patch): Json<ListingPatch>,
) -> Result<Json<Listing>, ApiError> {
  Ok(Json(state.registry.upsert(&reference, patch).await?))
}

/// `DELETE /listings/:reference`
pub async fn remove<S: KvStore>(
  State(state): State<AppState<S>>,
  Path(reference): Path<String>,
) -> Result<StatusCode, ApiError> {
  if state.registry.remove(&reference).await? {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("listing {reference:?} not found")))
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: ListingStatus,
}

/// `POST /listings/:reference/status`, body `{"status":"published"}`
pub async fn set_status<S: KvStore>(
  State(state): State<AppState<S>>,
  Path(reference): Path<String>,
  Json(body): Json<StatusBody>,
) -> Result<Json<Listing>, ApiError> {
  Ok(Json(state.registry.set_status(&reference, body.status).await?))
}

#[derive(Debug, Deserialize)]
pub struct PinBody {
  pub pinned: bool,
}

/// `POST /listings/:reference/pin`, body `{"pinned":true}`
pub async fn set_pinned<S: KvStore>(
  State(state): State<AppState<S>>,
  Path(reference): Path<String>,
  Json(body): Json<PinBody>,
) -> Result<Json<Listing>, ApiError> {
  Ok(Json(state.registry.set_pinned(&reference, body.pinned).await?))
}
