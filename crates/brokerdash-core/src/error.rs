//! Error types for `brokerdash-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("listing reference {0:?} normalizes to an empty identifier")]
  EmptyIdentifier(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
