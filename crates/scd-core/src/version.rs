//! Schedule versions: one per reconciliation run.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a schedule version. Strictly increasing in
/// allocation order.
pub type VersionId = i64;

/// The far-future `valid_to` of anything that has not been superseded yet.
pub fn open_ended() -> DateTime<Utc> {
  Utc
    .with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
    .single()
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// An immutable identifier for one reconciliation run.
///
/// Every fact row and audit entry produced by a run carries the run's
/// `version_id`. `valid_from` doubles as the run timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleVersion {
  pub version_id: VersionId,
  pub label:      String,
  pub valid_from: DateTime<Utc>,
  /// [`open_ended`] until the next version is allocated.
  pub valid_to:   DateTime<Utc>,
}

impl ScheduleVersion {
  pub fn is_open(&self) -> bool { self.valid_to == open_ended() }
}
