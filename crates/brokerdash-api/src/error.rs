//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// Activity could not be collected; cached analytics are unchanged.
  #[error("analytics unavailable: {0}")]
  Analytics(#[from] brokerdash_analytics::Error),
}

impl From<brokerdash_sync::Error> for ApiError {
  fn from(e: brokerdash_sync::Error) -> Self {
    use brokerdash_sync::Error as E;
    match e {
      E::ListingNotFound(id) => Self::NotFound(format!("listing {id} not found")),
      E::NotificationNotFound(id) => {
        Self::NotFound(format!("notification {id} not found"))
      }
      E::Core(brokerdash_core::Error::EmptyIdentifier(raw)) => {
        Self::BadRequest(format!("reference {raw:?} has no listing identifier"))
      }
      other => Self::Store(Box::new(other)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
      ApiError::Analytics(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
