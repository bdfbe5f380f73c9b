//! Turns classified rows into write units and applies them.
//!
//! Each row is its own unit: the fact mutations and the audit entry commit
//! together or not at all. A refused unit is reported and the run moves on
//! to the next row.

use scd_core::{
  audit::ChangeKind,
  session::{EventSessionRecord, Fingerprint},
  store::{SessionStore, WriteOp, WriteUnit},
  version::{ScheduleVersion, open_ended},
};
use uuid::Uuid;

use crate::{
  Result,
  audit::{delete_entry, insert_entry, update_entry},
  classify::{StagedSession, Update},
  report::{FailedRow, RowOutcome},
};

// ─── Planning ────────────────────────────────────────────────────────────────

fn new_record(
  staged: &StagedSession,
  version: &ScheduleVersion,
  version_lineage: Vec<i64>,
) -> EventSessionRecord {
  EventSessionRecord {
    record_id: Uuid::new_v4(),
    fingerprint: staged.fingerprint.clone(),
    schedule_version_id: version.version_id,
    current_version_id: version.version_id,
    version_lineage,
    attributes: staged.attributes.clone(),
    valid_from: version.valid_from,
    valid_to: open_ended(),
    is_current: true,
  }
}

/// The first record of a lineage plus its INSERT entry.
pub fn plan_insert(staged: &StagedSession, version: &ScheduleVersion) -> Result<WriteUnit> {
  let record = new_record(staged, version, vec![version.version_id]);
  let audit = insert_entry(&record, record.attributes.to_map()?);
  Ok(WriteUnit { ops: vec![WriteOp::Insert(record)], audit })
}

/// Close the current record and open its replacement, which inherits the
/// lineage with this version appended.
pub fn plan_update(update: &Update, version: &ScheduleVersion) -> WriteUnit {
  let mut lineage = update.current.version_lineage.clone();
  lineage.push(version.version_id);
  let record = new_record(&update.staged, version, lineage);
  let audit = update_entry(&update.current, version.version_id, update.diff.clone());

  WriteUnit {
    ops: vec![
      WriteOp::Supersede {
        record_id: update.current.record_id,
        closed_at: version.valid_from,
      },
      WriteOp::NewVersion(record),
    ],
    audit,
  }
}

/// Retire a lineage in place. No successor record is written.
pub fn plan_delete(
  current: &EventSessionRecord,
  version: &ScheduleVersion,
) -> Result<WriteUnit> {
  let audit = delete_entry(current, version.version_id, current.attributes.to_map()?);
  Ok(WriteUnit {
    ops: vec![WriteOp::Delete {
      record_id:  current.record_id,
      version_id: version.version_id,
      closed_at:  version.valid_from,
    }],
    audit,
  })
}

// ─── Applying ────────────────────────────────────────────────────────────────

/// Applies planned units to a store under one schedule version.
pub struct VersionedWriter<'a, S> {
  store:   &'a S,
  version: &'a ScheduleVersion,
}

impl<'a, S: SessionStore> VersionedWriter<'a, S> {
  pub fn new(store: &'a S, version: &'a ScheduleVersion) -> Self { Self { store, version } }

  pub async fn insert(&self, staged: &StagedSession) -> Result<Result<RowOutcome, FailedRow>> {
    let unit = plan_insert(staged, self.version)?;
    let record_id = unit.ops[0].record_id();
    Ok(
      self
        .commit(unit, &staged.fingerprint, Some(staged.staging_id), ChangeKind::Insert, record_id)
        .await,
    )
  }

  pub async fn update(&self, update: &Update) -> Result<RowOutcome, FailedRow> {
    let unit = plan_update(update, self.version);
    let record_id = unit.ops[1].record_id();
    self
      .commit(
        unit,
        &update.staged.fingerprint,
        Some(update.staged.staging_id),
        ChangeKind::Update,
        record_id,
      )
      .await
  }

  pub async fn delete(
    &self,
    current: &EventSessionRecord,
  ) -> Result<Result<RowOutcome, FailedRow>> {
    let unit = plan_delete(current, self.version)?;
    Ok(
      self
        .commit(unit, &current.fingerprint, None, ChangeKind::Delete, current.record_id)
        .await,
    )
  }

  async fn commit(
    &self,
    unit: WriteUnit,
    fingerprint: &Fingerprint,
    staging_id: Option<i64>,
    change_kind: ChangeKind,
    record_id: Uuid,
  ) -> Result<RowOutcome, FailedRow> {
    match self.store.apply(unit).await {
      Ok(applied) => {
        tracing::debug!(
          version = self.version.version_id,
          %fingerprint,
          %change_kind,
          %record_id,
          "row written"
        );
        Ok(RowOutcome {
          fingerprint: fingerprint.clone(),
          staging_id,
          record_id,
          audit_id: applied.audit_id,
        })
      }
      Err(e) => {
        tracing::warn!(
          version = self.version.version_id,
          %fingerprint,
          %change_kind,
          error = %e,
          "write unit refused"
        );
        Err(FailedRow {
          fingerprint: fingerprint.clone(),
          staging_id,
          change_kind,
          message: e.to_string(),
        })
      }
    }
  }
}
