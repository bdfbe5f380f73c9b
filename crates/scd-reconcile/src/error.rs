//! Run-level error type for the reconciliation engine.
//!
//! Row-level problems (malformed staging rows, failed write units) never
//! surface here; they are collected in the [`RunReport`](crate::RunReport).

use std::fmt;

use scd_core::{session::Fingerprint, version::VersionId};
use serde::Serialize;
use thiserror::Error;

/// Which snapshot a conflict was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Snapshot {
  Staging,
  Current,
}

impl fmt::Display for Snapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Staging => "staging",
      Self::Current => "current",
    })
  }
}

#[derive(Debug, Error)]
pub enum Error {
  /// A snapshot could not be loaded. Raised before any version is
  /// allocated.
  #[error("store unavailable: {0}")]
  Connectivity(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("fingerprint {fingerprint} appears more than once in the {snapshot} snapshot")]
  DuplicateFingerprint {
    fingerprint: Fingerprint,
    snapshot:    Snapshot,
  },

  /// A staging row and a current record share a fingerprint but not a
  /// business key.
  #[error("fingerprint {0} is shared by two different business keys")]
  FingerprintCollision(Fingerprint),

  #[error("core error: {0}")]
  Core(#[from] scd_core::Error),

  /// A run failed after its schedule version was allocated. The version
  /// exists but no row was written under it.
  #[error("run for schedule version {version_id} aborted: {source}")]
  Aborted {
    version_id: VersionId,
    #[source]
    source:     Box<Error>,
  },
}

impl Error {
  pub(crate) fn connectivity<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Connectivity(Box::new(e))
  }

  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
