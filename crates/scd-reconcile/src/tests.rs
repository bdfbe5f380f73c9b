//! End-to-end runs against an in-memory `SqliteStore`.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{NaiveDate, NaiveTime};
use scd_core::{
  audit::{AuditEntry, ChangeKind},
  session::{EventSessionRecord, Fingerprint, SessionAttributes, StagingRow},
  store::{AppliedUnit, SessionStore, WriteUnit},
  version::{ScheduleVersion, VersionId},
};
use scd_store_sqlite::SqliteStore;
use serde_json::json;

use crate::{
  Error,
  compare::{VersionChange, compare_versions},
  error::Snapshot,
  fingerprint::fingerprint,
  reconcile,
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn attrs(venue_id: i64, gross_seats: i64) -> SessionAttributes {
  let mut a = SessionAttributes::new(
    venue_id,
    2,
    3,
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
    "Final",
    NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
  );
  a.gross_seats = Some(gross_seats);
  a
}

async fn stage(s: &impl SessionStore, batch: &[SessionAttributes]) {
  let rows = batch.iter().map(StagingRow::from).collect();
  s.replace_staging(rows).await.expect("stage batch");
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn new_session_is_inserted() {
  let s = store().await;
  stage(&s, &[attrs(1, 100)]).await;

  let report = reconcile(&s, "first load").await.unwrap();
  let v1 = report.version.version_id;
  assert_eq!(report.inserted.len(), 1);
  assert_eq!(report.written(), 1);
  assert!(report.is_clean());

  let current = s.load_current_snapshot().await.unwrap();
  assert_eq!(current.len(), 1);
  assert_eq!(current[0].version_lineage, vec![v1]);
  assert_eq!(current[0].fingerprint, fingerprint(&attrs(1, 100)));
  assert_eq!(current[0].valid_from, report.version.valid_from);

  let audit = s.audit_entries(v1).await.unwrap();
  assert_eq!(audit.len(), 1);
  assert_eq!(audit[0].change_kind, ChangeKind::Insert);
  assert_eq!(audit[0].record_id, Some(current[0].record_id));
}

#[tokio::test]
async fn changed_session_is_versioned() {
  let s = store().await;
  stage(&s, &[attrs(1, 100)]).await;
  let v1 = reconcile(&s, "first").await.unwrap().version.version_id;
  let old = s.load_current_snapshot().await.unwrap().remove(0);

  stage(&s, &[attrs(1, 150)]).await;
  let report = reconcile(&s, "second").await.unwrap();
  let v2 = report.version.version_id;
  assert_eq!(report.updated.len(), 1);

  let history = s.lineage(&old.fingerprint).await.unwrap();
  assert_eq!(history.len(), 2);
  let (closed, open) = (&history[0], &history[1]);

  assert_eq!(closed.record_id, old.record_id);
  assert!(!closed.is_current);
  assert_eq!(closed.valid_to, report.version.valid_from);

  assert!(open.is_current);
  assert_eq!(open.attributes.gross_seats, Some(150));
  assert_eq!(open.version_lineage, vec![v1, v2]);
  assert_eq!(open.valid_from, closed.valid_to);

  let audit = s.audit_entries(v2).await.unwrap();
  assert_eq!(audit.len(), 1);
  assert_eq!(audit[0].change_kind, ChangeKind::Update);
  assert_eq!(audit[0].record_id, Some(old.record_id));
  assert_eq!(
    audit[0].changed_fields,
    Some([("gross_seats".to_owned(), json!(150))].into())
  );
  assert_eq!(
    audit[0].previous_values,
    Some([("gross_seats".to_owned(), json!(100))].into())
  );
}

#[tokio::test]
async fn vanished_session_is_retired_in_place() {
  let s = store().await;
  stage(&s, &[attrs(1, 100)]).await;
  let v1 = reconcile(&s, "first").await.unwrap().version.version_id;
  let old = s.load_current_snapshot().await.unwrap().remove(0);

  stage(&s, &[]).await;
  let report = reconcile(&s, "second").await.unwrap();
  let v2 = report.version.version_id;
  assert_eq!(report.deleted.len(), 1);
  assert_eq!(report.deleted[0].staging_id, None);

  assert!(s.load_current_snapshot().await.unwrap().is_empty());
  let history = s.lineage(&old.fingerprint).await.unwrap();
  assert_eq!(history.len(), 1, "a delete writes no successor row");
  assert!(!history[0].is_current);
  assert_eq!(history[0].version_lineage, vec![v1, v2]);
  assert_eq!(history[0].current_version_id, v2);

  let audit = s.audit_entries(v2).await.unwrap();
  assert_eq!(audit.len(), 1);
  assert_eq!(audit[0].change_kind, ChangeKind::Delete);
  assert!(audit[0].changed_fields.is_none());
  let previous = audit[0].previous_values.as_ref().unwrap();
  for key in ["venue_id", "sport_id", "day_id", "event_date", "event_type", "start_time", "date_start"] {
    assert!(previous.contains_key(key), "missing {key}");
  }
  assert_eq!(previous["gross_seats"], json!(100));
}

#[tokio::test]
async fn identical_session_writes_nothing() {
  let s = store().await;
  stage(&s, &[attrs(1, 100)]).await;
  reconcile(&s, "first").await.unwrap();
  let before = s.load_current_snapshot().await.unwrap();

  let report = reconcile(&s, "second").await.unwrap();
  assert_eq!(report.written(), 0);
  assert_eq!(report.unchanged, 1);
  assert!(s.audit_entries(report.version.version_id).await.unwrap().is_empty());
  assert_eq!(s.load_current_snapshot().await.unwrap(), before);
}

// ─── Run-wide properties ─────────────────────────────────────────────────────

#[tokio::test]
async fn every_write_has_one_audit_entry() {
  let s = store().await;
  stage(&s, &[attrs(1, 100), attrs(2, 100), attrs(3, 100)]).await;
  reconcile(&s, "first").await.unwrap();

  stage(&s, &[attrs(1, 100), attrs(2, 200), attrs(4, 100)]).await;
  let report = reconcile(&s, "second").await.unwrap();
  assert_eq!(
    (report.inserted.len(), report.updated.len(), report.deleted.len(), report.unchanged),
    (1, 1, 1, 1)
  );

  let audit = s.audit_entries(report.version.version_id).await.unwrap();
  assert_eq!(audit.len(), report.written());
  let mut ids: Vec<_> = report
    .inserted
    .iter()
    .chain(&report.updated)
    .chain(&report.deleted)
    .map(|o| o.audit_id)
    .collect();
  let mut logged: Vec<_> = audit.iter().map(|a| a.audit_id).collect();
  ids.sort();
  logged.sort();
  assert_eq!(ids, logged);
}

#[tokio::test]
async fn at_most_one_current_row_per_fingerprint() {
  let s = store().await;
  for seats in [100, 110, 120] {
    stage(&s, &[attrs(1, seats), attrs(2, seats)]).await;
    reconcile(&s, "load").await.unwrap();
  }

  let current = s.load_current_snapshot().await.unwrap();
  assert_eq!(current.len(), 2);
  let history = s.lineage(&fingerprint(&attrs(1, 0))).await.unwrap();
  assert_eq!(history.len(), 3);
  assert_eq!(history.iter().filter(|r| r.is_current).count(), 1);
  assert_eq!(history[2].version_lineage.len(), 3);
}

#[tokio::test]
async fn malformed_rows_are_reported_not_written() {
  let s = store().await;
  let mut broken = StagingRow::from(&attrs(2, 100));
  broken.sport_id = None;
  broken.event_type = Some("  ".into());
  s.replace_staging(vec![StagingRow::from(&attrs(1, 100)), broken])
    .await
    .unwrap();

  let report = reconcile(&s, "load").await.unwrap();
  assert!(!report.is_clean());
  assert_eq!(report.inserted.len(), 1);
  assert_eq!(report.rejected.len(), 1);
  assert_eq!(report.rejected[0].missing, vec!["sport_id", "event_type"]);
  assert_eq!(s.load_current_snapshot().await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_staging_fingerprint_aborts_after_allocation() {
  let s = store().await;
  stage(&s, &[attrs(1, 100), attrs(1, 200)]).await;

  let err = reconcile(&s, "load").await.unwrap_err();
  let Error::Aborted { version_id, source } = err else {
    panic!("expected an aborted run, got {err:?}");
  };
  assert!(matches!(
    *source,
    Error::DuplicateFingerprint { snapshot: Snapshot::Staging, .. }
  ));

  assert!(s.get_schedule_version(version_id).await.unwrap().is_some());
  assert!(s.load_current_snapshot().await.unwrap().is_empty());
  assert!(s.audit_entries(version_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn versions_are_strictly_ordered() {
  let s = store().await;
  stage(&s, &[attrs(1, 100)]).await;
  let mut versions: Vec<ScheduleVersion> = Vec::new();
  for _ in 0..3 {
    versions.push(reconcile(&s, "load").await.unwrap().version);
  }
  for pair in versions.windows(2) {
    assert!(pair[0].version_id < pair[1].version_id);
    assert!(pair[0].valid_from < pair[1].valid_from);
  }

  let listed = s.list_schedule_versions().await.unwrap();
  assert_eq!(listed.len(), 3);
  assert!(listed[..2].iter().all(|v| !v.is_open()));
  assert!(listed[2].is_open());
}

#[tokio::test]
async fn compare_versions_reports_the_run_delta() {
  let s = store().await;
  stage(&s, &[attrs(1, 100), attrs(2, 100)]).await;
  let v1 = reconcile(&s, "first").await.unwrap().version.version_id;

  stage(&s, &[attrs(1, 150), attrs(3, 100)]).await;
  let v2 = reconcile(&s, "second").await.unwrap().version.version_id;

  let changes = compare_versions(&s, v1, v2).await.unwrap();
  assert_eq!(changes.len(), 3);
  let kinds: Vec<&str> = changes
    .iter()
    .map(|c| match c {
      VersionChange::Added { .. } => "added",
      VersionChange::Removed { .. } => "removed",
      VersionChange::Modified { .. } => "modified",
    })
    .collect();
  for kind in ["added", "removed", "modified"] {
    assert!(kinds.contains(&kind), "no {kind} change");
  }

  assert!(compare_versions(&s, v2, v2).await.unwrap().is_empty());
}

// ─── Failure injection ───────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum FlakyError {
  #[error(transparent)]
  Store(#[from] scd_store_sqlite::Error),
  #[error("injected failure")]
  Injected,
}

/// Delegates to a `SqliteStore`, refusing writes for one fingerprint and
/// optionally every snapshot load.
struct FlakyStore {
  inner:       SqliteStore,
  refuse:      Option<Fingerprint>,
  unreachable: AtomicBool,
}

impl FlakyStore {
  fn new(inner: SqliteStore) -> Self {
    Self { inner, refuse: None, unreachable: AtomicBool::new(false) }
  }

  fn check_reachable(&self) -> Result<(), FlakyError> {
    if self.unreachable.load(Ordering::SeqCst) {
      return Err(FlakyError::Injected);
    }
    Ok(())
  }
}

impl SessionStore for FlakyStore {
  type Error = FlakyError;

  async fn allocate_schedule_version(&self, label: String) -> Result<ScheduleVersion, FlakyError> {
    Ok(self.inner.allocate_schedule_version(label).await?)
  }

  async fn get_schedule_version(
    &self,
    version_id: VersionId,
  ) -> Result<Option<ScheduleVersion>, FlakyError> {
    Ok(self.inner.get_schedule_version(version_id).await?)
  }

  async fn list_schedule_versions(&self) -> Result<Vec<ScheduleVersion>, FlakyError> {
    Ok(self.inner.list_schedule_versions().await?)
  }

  async fn replace_staging(&self, rows: Vec<StagingRow>) -> Result<usize, FlakyError> {
    Ok(self.inner.replace_staging(rows).await?)
  }

  async fn load_staging_snapshot(&self) -> Result<Vec<StagingRow>, FlakyError> {
    self.check_reachable()?;
    Ok(self.inner.load_staging_snapshot().await?)
  }

  async fn load_current_snapshot(&self) -> Result<Vec<EventSessionRecord>, FlakyError> {
    self.check_reachable()?;
    Ok(self.inner.load_current_snapshot().await?)
  }

  async fn apply(&self, unit: WriteUnit) -> Result<AppliedUnit, FlakyError> {
    if self.refuse.as_ref() == Some(&unit.audit.fingerprint) {
      return Err(FlakyError::Injected);
    }
    Ok(self.inner.apply(unit).await?)
  }

  async fn lineage<'a>(
    &'a self,
    fingerprint: &'a Fingerprint,
  ) -> Result<Vec<EventSessionRecord>, FlakyError> {
    Ok(self.inner.lineage(fingerprint).await?)
  }

  async fn audit_entries(&self, version_id: VersionId) -> Result<Vec<AuditEntry>, FlakyError> {
    Ok(self.inner.audit_entries(version_id).await?)
  }

  async fn snapshot_at(&self, version_id: VersionId) -> Result<Vec<EventSessionRecord>, FlakyError> {
    Ok(self.inner.snapshot_at(version_id).await?)
  }
}

#[tokio::test]
async fn refused_unit_is_reported_and_run_continues() {
  let mut s = FlakyStore::new(store().await);
  stage(&s, &[attrs(1, 100), attrs(2, 100), attrs(3, 100)]).await;
  s.refuse = Some(fingerprint(&attrs(2, 0)));

  let report = reconcile(&s, "load").await.unwrap();
  assert_eq!(report.inserted.len(), 2);
  assert_eq!(report.failed.len(), 1);
  assert_eq!(report.failed[0].change_kind, ChangeKind::Insert);
  assert_eq!(report.failed[0].fingerprint, fingerprint(&attrs(2, 0)));

  let current = s.load_current_snapshot().await.unwrap();
  assert_eq!(current.len(), 2);
  assert!(current.iter().all(|r| r.fingerprint != fingerprint(&attrs(2, 0))));
  assert_eq!(s.audit_entries(report.version.version_id).await.unwrap().len(), 2);

  // The refused row is picked up as an insert once the store accepts it.
  s.refuse = None;
  let retry = reconcile(&s, "retry").await.unwrap();
  assert_eq!(retry.inserted.len(), 1);
  assert_eq!(retry.unchanged, 2);
}

#[tokio::test]
async fn unreachable_store_fails_before_allocating() {
  let s = FlakyStore::new(store().await);
  stage(&s, &[attrs(1, 100)]).await;
  s.unreachable.store(true, Ordering::SeqCst);

  let err = reconcile(&s, "load").await.unwrap_err();
  assert!(matches!(err, Error::Connectivity(_)));
  assert!(s.list_schedule_versions().await.unwrap().is_empty());
}
