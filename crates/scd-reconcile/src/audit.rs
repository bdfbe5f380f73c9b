//! Builders for the audit entry that accompanies each write unit.

use chrono::Utc;
use scd_core::{
  audit::{AuditEntry, ChangeKind},
  session::{AttributeMap, EventSessionRecord, Fingerprint},
  version::VersionId,
};
use uuid::Uuid;

use crate::diff::RowDiff;

fn entry(
  record_id: Uuid,
  fingerprint: Fingerprint,
  version_id: VersionId,
  change_kind: ChangeKind,
  changed_fields: Option<AttributeMap>,
  previous_values: Option<AttributeMap>,
) -> AuditEntry {
  AuditEntry {
    audit_id: Uuid::new_v4(),
    record_id: Some(record_id),
    fingerprint,
    schedule_version_id: version_id,
    change_kind,
    changed_fields,
    previous_values,
    recorded_at: Utc::now(),
  }
}

/// A new lineage. `changed_fields` carries the full attribute map.
pub fn insert_entry(
  record: &EventSessionRecord,
  attributes: AttributeMap,
) -> AuditEntry {
  entry(
    record.record_id,
    record.fingerprint.clone(),
    record.schedule_version_id,
    ChangeKind::Insert,
    Some(attributes),
    None,
  )
}

/// A changed lineage, keyed on the record being superseded.
pub fn update_entry(
  superseded: &EventSessionRecord,
  version_id: VersionId,
  diff: RowDiff,
) -> AuditEntry {
  entry(
    superseded.record_id,
    superseded.fingerprint.clone(),
    version_id,
    ChangeKind::Update,
    Some(diff.changed_fields),
    Some(diff.previous_values),
  )
}

/// A retired lineage. `previous_values` carries the full last-known
/// attribute map.
pub fn delete_entry(
  retired: &EventSessionRecord,
  version_id: VersionId,
  attributes: AttributeMap,
) -> AuditEntry {
  entry(
    retired.record_id,
    retired.fingerprint.clone(),
    version_id,
    ChangeKind::Delete,
    None,
    Some(attributes),
  )
}
