//! The `SessionStore` trait and the write units it applies.
//!
//! The trait is implemented by storage backends (e.g. `scd-store-sqlite`).
//! The reconciliation engine depends on this abstraction and never constructs
//! a connection of its own.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  audit::AuditEntry,
  session::{EventSessionRecord, Fingerprint, StagingRow},
  version::{ScheduleVersion, VersionId},
};

// ─── Write units ─────────────────────────────────────────────────────────────

/// A single fact-table mutation.
#[derive(Debug, Clone)]
pub enum WriteOp {
  /// Persist the first record of a new lineage.
  Insert(EventSessionRecord),
  /// Close a current record: `is_current = false`, `valid_to = closed_at`.
  Supersede {
    record_id: Uuid,
    closed_at: DateTime<Utc>,
  },
  /// Persist the replacement record of an existing lineage.
  NewVersion(EventSessionRecord),
  /// Retire a lineage in place: close the current record, stamp
  /// `current_version_id` and append `version_id` to its lineage.
  Delete {
    record_id:  Uuid,
    version_id: VersionId,
    closed_at:  DateTime<Utc>,
  },
}

impl WriteOp {
  /// The record this op creates or touches.
  pub fn record_id(&self) -> Uuid {
    match self {
      Self::Insert(r) | Self::NewVersion(r) => r.record_id,
      Self::Supersede { record_id, .. } | Self::Delete { record_id, .. } => {
        *record_id
      }
    }
  }
}

/// Fact mutations for one classified row together with the audit entry that
/// describes them. A store applies a unit all-or-nothing.
#[derive(Debug, Clone)]
pub struct WriteUnit {
  pub ops:   Vec<WriteOp>,
  pub audit: AuditEntry,
}

/// What a store reports back after committing a [`WriteUnit`].
#[derive(Debug, Clone)]
pub struct AppliedUnit {
  /// Records touched, in op order.
  pub record_ids: Vec<Uuid>,
  pub audit_id:   Uuid,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the fact store a reconciliation run reads from and
/// writes to.
///
/// The store is mutated exclusively through [`SessionStore::apply`] (facts
/// and audit) and [`SessionStore::allocate_schedule_version`]. Callers must
/// guarantee a single writer for the duration of a run.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait SessionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Schedule versions ─────────────────────────────────────────────────

  /// Create a new schedule version, valid from now until further notice.
  /// The previously open version, if any, is closed at the same instant.
  fn allocate_schedule_version(
    &self,
    label: String,
  ) -> impl Future<Output = Result<ScheduleVersion, Self::Error>> + Send + '_;

  /// Retrieve a schedule version by id. Returns `None` if not found.
  fn get_schedule_version(
    &self,
    version_id: VersionId,
  ) -> impl Future<Output = Result<Option<ScheduleVersion>, Self::Error>> + Send + '_;

  /// All schedule versions in allocation order.
  fn list_schedule_versions(
    &self,
  ) -> impl Future<Output = Result<Vec<ScheduleVersion>, Self::Error>> + Send + '_;

  // ── Snapshots ─────────────────────────────────────────────────────────

  /// Replace the whole staging table with `rows`. Staging ids are
  /// reassigned by the store.
  fn replace_staging(
    &self,
    rows: Vec<StagingRow>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// The full incoming batch. Order carries no meaning.
  fn load_staging_snapshot(
    &self,
  ) -> impl Future<Output = Result<Vec<StagingRow>, Self::Error>> + Send + '_;

  /// Every record with `is_current = true`.
  fn load_current_snapshot(
    &self,
  ) -> impl Future<Output = Result<Vec<EventSessionRecord>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Apply every op of `unit` and append its audit entry in one
  /// transaction.
  ///
  /// Returns an error, leaving the store untouched, if a `Supersede` or
  /// `Delete` target does not exist or is no longer current, or if an
  /// insert would give a fingerprint a second current record.
  fn apply(
    &self,
    unit: WriteUnit,
  ) -> impl Future<Output = Result<AppliedUnit, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Every physical record of a lineage, oldest first.
  fn lineage<'a>(
    &'a self,
    fingerprint: &'a Fingerprint,
  ) -> impl Future<Output = Result<Vec<EventSessionRecord>, Self::Error>> + Send + 'a;

  /// The change log written by one run, in write order.
  fn audit_entries(
    &self,
    version_id: VersionId,
  ) -> impl Future<Output = Result<Vec<AuditEntry>, Self::Error>> + Send + '_;

  /// The records that were current once `version_id` finished writing.
  /// Returns an empty set for an unknown version.
  fn snapshot_at(
    &self,
    version_id: VersionId,
  ) -> impl Future<Output = Result<Vec<EventSessionRecord>, Self::Error>> + Send + '_;
}
