//! Error type for `scd-store-sqlite`.

use scd_core::session::Fingerprint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] scd_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A `Supersede` or `Delete` op named a record that does not exist.
  #[error("record not found: {0}")]
  RecordNotFound(uuid::Uuid),

  /// A `Supersede` or `Delete` op named a record that was already closed.
  #[error("record {0} is not current")]
  NotCurrent(uuid::Uuid),

  /// An insert would give a fingerprint a second current record.
  #[error("fingerprint {0} already has a current record")]
  CurrentConflict(Fingerprint),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
