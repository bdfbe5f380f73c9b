//! SCD Type 2 reconciliation of staged event sessions.
//!
//! A run loads the staging batch and the current records from any
//! [`SessionStore`], allocates a schedule version, classifies every session
//! as insert, update, delete or no-op, and writes one atomic unit per
//! changed row.

pub mod audit;
pub mod classify;
pub mod compare;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod report;
pub mod writer;

pub use error::{Error, Result};
pub use report::RunReport;

use std::path::PathBuf;

use scd_core::store::SessionStore;
use serde::Deserialize;

use classify::{StagedSession, classify};
use report::RejectedRow;
use writer::VersionedWriter;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `reconcile.toml` and `SCD_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ReconcileConfig {
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  /// Exit non-zero when a run rejects or fails any row.
  #[serde(default)]
  pub strict:     bool,
}

fn default_store_path() -> PathBuf { PathBuf::from("sessions.db") }

// ─── Run ──────────────────────────────────────────────────────────────────────

/// Reconcile the store's staging batch against its current records under a
/// new schedule version labelled `label`.
///
/// Fails before allocating a version if either snapshot cannot be loaded.
/// Once a version exists, a conflicting batch fails with
/// [`Error::Aborted`] carrying its id and nothing is written. Per-row
/// problems do not fail the run; they are listed in the report.
pub async fn reconcile<S: SessionStore>(store: &S, label: &str) -> Result<RunReport> {
  let staging = store.load_staging_snapshot().await.map_err(Error::connectivity)?;
  let current = store.load_current_snapshot().await.map_err(Error::connectivity)?;

  let mut staged = Vec::with_capacity(staging.len());
  let mut rejected = Vec::new();
  for row in staging {
    let staging_id = row.staging_id;
    match row.validate() {
      Ok(attributes) => staged.push(StagedSession::new(staging_id, attributes)),
      Err(scd_core::Error::MalformedRecord { staging_id, missing }) => {
        tracing::warn!(staging_id, ?missing, "staging row rejected");
        rejected.push(RejectedRow { staging_id, missing });
      }
      Err(e) => return Err(e.into()),
    }
  }

  let version = store
    .allocate_schedule_version(label.to_owned())
    .await
    .map_err(Error::store)?;
  let version_id = version.version_id;
  tracing::info!(
    version = version_id,
    label,
    staged = staged.len(),
    current = current.len(),
    "schedule version allocated"
  );

  let abort = |source: Error| Error::Aborted { version_id, source: Box::new(source) };

  let classification = classify(staged, current).map_err(abort)?;

  let mut report = RunReport::new(version.clone());
  report.rejected = rejected;
  report.unchanged = classification.unchanged.len();

  let writer = VersionedWriter::new(store, &version);

  for staged in &classification.inserts {
    match writer.insert(staged).await.map_err(abort)? {
      Ok(outcome) => report.inserted.push(outcome),
      Err(failed) => report.failed.push(failed),
    }
  }
  for update in &classification.updates {
    match writer.update(update).await {
      Ok(outcome) => report.updated.push(outcome),
      Err(failed) => report.failed.push(failed),
    }
  }
  for current in &classification.deletes {
    match writer.delete(current).await.map_err(abort)? {
      Ok(outcome) => report.deleted.push(outcome),
      Err(failed) => report.failed.push(failed),
    }
  }

  if report.is_clean() {
    tracing::info!(
      version = version_id,
      inserted = report.inserted.len(),
      updated = report.updated.len(),
      deleted = report.deleted.len(),
      unchanged = report.unchanged,
      "run complete"
    );
  } else {
    tracing::warn!(
      version = version_id,
      inserted = report.inserted.len(),
      updated = report.updated.len(),
      deleted = report.deleted.len(),
      unchanged = report.unchanged,
      rejected = report.rejected.len(),
      failed = report.failed.len(),
      "run complete with row errors"
    );
  }

  Ok(report)
}

#[cfg(test)]
mod tests;
