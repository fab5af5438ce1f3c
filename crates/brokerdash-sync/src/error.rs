//! Error type for `brokerdash-sync`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] brokerdash_core::Error),

  #[error("listing not found: {0}")]
  ListingNotFound(String),

  #[error("notification not found: {0}")]
  NotificationNotFound(Uuid),

  /// The durable store rejected a read or write. In-memory state is left at
  /// its last committed value.
  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The task running a mutation was cancelled, which only happens while
  /// the runtime shuts down.
  #[error("registry task interrupted: {0}")]
  Interrupted(#[source] tokio::task::JoinError),
}

impl Error {
  pub(crate) fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Storage(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
