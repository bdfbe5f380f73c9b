//! Error types for `scd-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("staging row {staging_id} is missing required attributes: {missing:?}")]
  MalformedRecord {
    staging_id: i64,
    missing:    Vec<&'static str>,
  },

  #[error("unknown change kind: {0:?}")]
  UnknownChangeKind(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
