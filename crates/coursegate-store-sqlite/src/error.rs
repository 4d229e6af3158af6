//! Error type for `coursegate-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored integer does not fit the domain type.
  #[error("invalid value in column {column}: {value}")]
  InvalidColumn { column: &'static str, value: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
