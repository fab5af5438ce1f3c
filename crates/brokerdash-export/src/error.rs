use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unterminated quoted field starting on line {line}")]
  UnterminatedQuote { line: usize },

  #[error("unexpected character after closing quote on line {line}")]
  TrailingAfterQuote { line: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
