//! Error type for `brokerdash-analytics`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The sample source could not produce activity for a pass. The previous
  /// snapshots stay in place.
  #[error("sample source error: {0}")]
  Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
