//! Handlers for `/notifications` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/notifications/:recipient` | Optional `?unread_only=true` |
//! | `POST`   | `/notifications/:recipient/read` | Mark all read |
//! | `POST`   | `/notifications/:recipient/:id/read` | 404 if not found |
//! | `DELETE` | `/notifications/:recipient/:id` | 204, or 404 if not found |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use brokerdash_core::{notification::Notification, store::KvStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct Inbox {
  pub unread:        usize,
  pub notifications: Vec<Notification>,
}

/// `GET /notifications/:recipient[?unread_only=true]`, newest first.
pub async fn list<S: KvStore>(
  State(state): State<AppState<S>>,
  Path(recipient): Path<String>,
  Query(params): Query<ListParams>,
) -> Json<Inbox> {
  Json(Inbox {
    unread:        state.notifications.unread_count(&recipient),
    notifications: state.notifications.list(&recipient, params.unread_only),
  })
}

/// `POST /notifications/:recipient/:id/read`
pub async fn mark_read<S: KvStore>(
  State(state): State<AppState<S>>,
  Path((recipient, id)): Path<(String, Uuid)>,
) -> Result<Json<Notification>, ApiError> {
  Ok(Json(state.notifications.mark_read(&recipient, id)?))
}

#[derive(Debug, Serialize)]
pub struct Updated {
  pub updated: usize,
}

/// `POST /notifications/:recipient/read`
pub async fn mark_all_read<S: KvStore>(
  State(state): State<AppState<S>>,
  Path(recipient): Path<String>,
) -> Json<Updated> {
  Json(Updated { updated: state.notifications.mark_all_read(&recipient) })
}

/// `DELETE /notifications/:recipient/:id`
pub async fn remove<S: KvStore>(
  State(state): State<AppState<S>>,
  Path((recipient, id)): Path<(String, Uuid)>,
) -> Result<StatusCode, ApiError> {
  state.notifications.delete(&recipient, id)?;
  Ok(StatusCode::NO_CONTENT)
}
