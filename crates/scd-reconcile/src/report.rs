//! The per-run summary returned to the caller.

use scd_core::{audit::ChangeKind, session::Fingerprint, version::ScheduleVersion};
use serde::Serialize;
use uuid::Uuid;

/// A row that was written.
#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
  pub fingerprint: Fingerprint,
  /// `None` for deletes, which have no staging row.
  pub staging_id:  Option<i64>,
  /// The record created (insert, update) or retired (delete).
  pub record_id:   Uuid,
  pub audit_id:    Uuid,
}

/// A staging row excluded from the run because required attributes were
/// missing.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
  pub staging_id: i64,
  pub missing:    Vec<&'static str>,
}

/// A classified row whose write unit the store refused. Nothing was written
/// for it.
#[derive(Debug, Clone, Serialize)]
pub struct FailedRow {
  pub fingerprint: Fingerprint,
  pub staging_id:  Option<i64>,
  pub change_kind: ChangeKind,
  pub message:     String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub version:   ScheduleVersion,
  pub inserted:  Vec<RowOutcome>,
  pub updated:   Vec<RowOutcome>,
  pub deleted:   Vec<RowOutcome>,
  pub unchanged: usize,
  pub rejected:  Vec<RejectedRow>,
  pub failed:    Vec<FailedRow>,
}

impl RunReport {
  pub fn new(version: ScheduleVersion) -> Self {
    Self {
      version,
      inserted: Vec::new(),
      updated: Vec::new(),
      deleted: Vec::new(),
      unchanged: 0,
      rejected: Vec::new(),
      failed: Vec::new(),
    }
  }

  /// No rejected and no failed rows.
  pub fn is_clean(&self) -> bool { self.rejected.is_empty() && self.failed.is_empty() }

  /// Number of write units committed.
  pub fn written(&self) -> usize {
    self.inserted.len() + self.updated.len() + self.deleted.len()
  }
}
