//! [`SqliteStore`]: the SQLite implementation of [`SessionStore`].

use std::path::Path;

use chrono::{Duration, Utc};
use rusqlite::{OptionalExtension as _, ToSql, Transaction};
use uuid::Uuid;

use scd_core::{
  audit::AuditEntry,
  session::{EventSessionRecord, Fingerprint, StagingRow},
  store::{AppliedUnit, SessionStore, WriteOp, WriteUnit},
  version::{ScheduleVersion, VersionId, open_ended},
};

use crate::{
  encode::{
    ATTRIBUTE_COLUMNS, EncodedAttributes, EncodedRecord, RECORD_COLUMNS,
    RawAuditEntry, RawScheduleVersion, RawSessionRecord, column_precision,
    decode_dt, encode_attribute_map, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Encoded write ops ───────────────────────────────────────────────────────

/// A [`WriteOp`] with every parameter already encoded, ready to move onto the
/// database thread.
enum EncodedOp {
  Insert(EncodedRecord),
  Close {
    record_id:     Uuid,
    record_id_str: String,
    closed_at:     String,
  },
  Retire {
    record_id:     Uuid,
    record_id_str: String,
    version_id:    VersionId,
    closed_at:     String,
  },
}

impl EncodedOp {
  fn new(op: &WriteOp) -> Result<Self> {
    Ok(match op {
      WriteOp::Insert(r) | WriteOp::NewVersion(r) => {
        Self::Insert(EncodedRecord::new(r)?)
      }
      WriteOp::Supersede { record_id, closed_at } => Self::Close {
        record_id:     *record_id,
        record_id_str: encode_uuid(*record_id),
        closed_at:     encode_dt(*closed_at),
      },
      WriteOp::Delete { record_id, version_id, closed_at } => Self::Retire {
        record_id:     *record_id,
        record_id_str: encode_uuid(*record_id),
        version_id:    *version_id,
        closed_at:     encode_dt(*closed_at),
      },
    })
  }
}

struct EncodedAudit {
  audit_id:            Uuid,
  audit_id_str:        String,
  record_id:           Option<String>,
  fingerprint:         String,
  schedule_version_id: VersionId,
  change_kind:         &'static str,
  changed_fields:      Option<String>,
  previous_values:     Option<String>,
  recorded_at:         String,
}

impl EncodedAudit {
  fn new(entry: &AuditEntry) -> Result<Self> {
    Ok(Self {
      audit_id:            entry.audit_id,
      audit_id_str:        encode_uuid(entry.audit_id),
      record_id:           entry.record_id.map(encode_uuid),
      fingerprint:         entry.fingerprint.as_str().to_owned(),
      schedule_version_id: entry.schedule_version_id,
      change_kind:         entry.change_kind.as_str(),
      changed_fields:      encode_attribute_map(entry.changed_fields.as_ref())?,
      previous_values:     encode_attribute_map(entry.previous_values.as_ref())?,
      recorded_at:         encode_dt(entry.recorded_at),
    })
  }
}

// ─── Transaction helpers ─────────────────────────────────────────────────────

/// `Some(is_current)` for an existing record, `None` if it does not exist.
fn current_flag(tx: &Transaction<'_>, record_id: &str) -> rusqlite::Result<Option<bool>> {
  tx.query_row(
    "SELECT is_current FROM event_sessions WHERE record_id = ?1",
    rusqlite::params![record_id],
    |r| r.get(0),
  )
  .optional()
}

fn has_current(tx: &Transaction<'_>, fingerprint: &Fingerprint) -> rusqlite::Result<bool> {
  Ok(
    tx.query_row(
      "SELECT 1 FROM event_sessions WHERE fingerprint = ?1 AND is_current = 1",
      rusqlite::params![fingerprint.as_str()],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false),
  )
}

/// Check that a `Supersede`/`Delete` target exists and is still current.
fn check_closable(
  tx: &Transaction<'_>,
  record_id: Uuid,
  record_id_str: &str,
) -> rusqlite::Result<Option<Error>> {
  Ok(match current_flag(tx, record_id_str)? {
    None => Some(Error::RecordNotFound(record_id)),
    Some(false) => Some(Error::NotCurrent(record_id)),
    Some(true) => None,
  })
}

fn insert_record(tx: &Transaction<'_>, r: &EncodedRecord) -> rusqlite::Result<()> {
  let fingerprint = r.fingerprint.as_str();
  let mut params: Vec<&dyn ToSql> = vec![
    &r.record_id_str,
    &fingerprint,
    &r.schedule_version_id,
    &r.current_version_id,
    &r.version_lineage,
  ];
  params.extend(r.attributes.params());
  params.extend([&r.valid_from as &dyn ToSql, &r.valid_to, &r.is_current]);

  tx.execute(
    &format!(
      "INSERT INTO event_sessions ({RECORD_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
               ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)"
    ),
    params.as_slice(),
  )?;
  Ok(())
}

fn insert_audit(tx: &Transaction<'_>, a: &EncodedAudit) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO event_audit (
       audit_id, record_id, fingerprint, schedule_version_id, change_kind,
       changed_fields, previous_values, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    rusqlite::params![
      a.audit_id_str,
      a.record_id,
      a.fingerprint,
      a.schedule_version_id,
      a.change_kind,
      a.changed_fields,
      a.previous_values,
      a.recorded_at,
    ],
  )?;
  Ok(())
}

fn select_records(
  conn: &rusqlite::Connection,
  where_clause: &str,
  params: &[&dyn ToSql],
) -> rusqlite::Result<Vec<RawSessionRecord>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {RECORD_COLUMNS} FROM event_sessions {where_clause}"
  ))?;
  stmt
    .query_map(params, RawSessionRecord::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An event-session history store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── SessionStore impl ───────────────────────────────────────────────────────

impl SessionStore for SqliteStore {
  type Error = Error;

  // ── Schedule versions ─────────────────────────────────────────────────────

  async fn allocate_schedule_version(&self, label: String) -> Result<ScheduleVersion> {
    let sentinel_str = encode_dt(open_ended());

    let (latest_from, now_candidate): (Option<String>, _) = self
      .conn
      .call(|conn| {
        let latest: Option<String> = conn
          .query_row(
            "SELECT valid_from FROM schedule_versions ORDER BY version_id DESC LIMIT 1",
            [],
            |r| r.get(0),
          )
          .optional()?;
        Ok((latest, column_precision(Utc::now())))
      })
      .await?;

    // Versions are ordered by time as well as by id, so a snapshot taken at
    // one version's valid_from never sees a later version's rows.
    let valid_from = match latest_from.as_deref().map(decode_dt).transpose()? {
      Some(prev) if now_candidate <= prev => prev + Duration::microseconds(1),
      _ => now_candidate,
    };
    let from_str = encode_dt(valid_from);
    let label_db = label.clone();

    let version_id: VersionId = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE schedule_versions SET valid_to = ?1 WHERE valid_to = ?2",
          rusqlite::params![from_str, sentinel_str],
        )?;
        tx.execute(
          "INSERT INTO schedule_versions (label, valid_from, valid_to)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![label_db, from_str, sentinel_str],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
      })
      .await?;

    tracing::debug!(version_id, %label, "allocated schedule version");

    Ok(ScheduleVersion {
      version_id,
      label,
      valid_from,
      valid_to: open_ended(),
    })
  }

  async fn get_schedule_version(&self, version_id: VersionId) -> Result<Option<ScheduleVersion>> {
    let raw: Option<RawScheduleVersion> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT version_id, label, valid_from, valid_to
             FROM schedule_versions WHERE version_id = ?1",
            rusqlite::params![version_id],
            RawScheduleVersion::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawScheduleVersion::into_version).transpose()
  }

  async fn list_schedule_versions(&self) -> Result<Vec<ScheduleVersion>> {
    let raws: Vec<RawScheduleVersion> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT version_id, label, valid_from, valid_to
           FROM schedule_versions ORDER BY version_id",
        )?;
        let rows = stmt
          .query_map([], RawScheduleVersion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawScheduleVersion::into_version).collect()
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn replace_staging(&self, rows: Vec<StagingRow>) -> Result<usize> {
    let encoded: Vec<EncodedAttributes> =
      rows.iter().map(EncodedAttributes::from_staging).collect();

    let count = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM staging_event_sessions", [])?;
        tx.execute(
          "DELETE FROM sqlite_sequence WHERE name = 'staging_event_sessions'",
          [],
        )?;
        {
          let mut stmt = tx.prepare(&format!(
            "INSERT INTO staging_event_sessions ({ATTRIBUTE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                     ?14, ?15, ?16)"
          ))?;
          for attrs in &encoded {
            stmt.execute(attrs.params().as_slice())?;
          }
        }
        tx.commit()?;
        Ok(encoded.len())
      })
      .await?;

    Ok(count)
  }

  async fn load_staging_snapshot(&self) -> Result<Vec<StagingRow>> {
    let raws: Vec<(i64, EncodedAttributes)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT staging_id, {ATTRIBUTE_COLUMNS}
           FROM staging_event_sessions ORDER BY staging_id"
        ))?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, EncodedAttributes::from_row(row, 1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(id, attrs)| attrs.into_staging(id))
      .collect()
  }

  async fn load_current_snapshot(&self) -> Result<Vec<EventSessionRecord>> {
    let raws = self
      .conn
      .call(|conn| Ok(select_records(conn, "WHERE is_current = 1", &[])?))
      .await?;

    raws.into_iter().map(RawSessionRecord::into_record).collect()
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn apply(&self, unit: WriteUnit) -> Result<AppliedUnit> {
    let ops: Vec<EncodedOp> =
      unit.ops.iter().map(EncodedOp::new).collect::<Result<_>>()?;
    let audit = EncodedAudit::new(&unit.audit)?;

    // The closure yields `Ok(Err(..))` for a violated precondition; the
    // transaction is dropped without commit, which rolls it back.
    let outcome: Result<AppliedUnit> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut record_ids = Vec::with_capacity(ops.len());

        for op in &ops {
          match op {
            EncodedOp::Insert(r) => {
              if has_current(&tx, &r.fingerprint)? {
                return Ok(Err(Error::CurrentConflict(r.fingerprint.clone())));
              }
              insert_record(&tx, r)?;
              record_ids.push(r.record_id);
            }
            EncodedOp::Close { record_id, record_id_str, closed_at } => {
              if let Some(err) = check_closable(&tx, *record_id, record_id_str)? {
                return Ok(Err(err));
              }
              tx.execute(
                "UPDATE event_sessions SET is_current = 0, valid_to = ?2
                 WHERE record_id = ?1",
                rusqlite::params![record_id_str, closed_at],
              )?;
              record_ids.push(*record_id);
            }
            EncodedOp::Retire { record_id, record_id_str, version_id, closed_at } => {
              if let Some(err) = check_closable(&tx, *record_id, record_id_str)? {
                return Ok(Err(err));
              }
              tx.execute(
                "UPDATE event_sessions
                 SET is_current         = 0,
                     valid_to           = ?2,
                     current_version_id = ?3,
                     version_lineage    = json_insert(version_lineage, '$[#]', ?3)
                 WHERE record_id = ?1",
                rusqlite::params![record_id_str, closed_at, version_id],
              )?;
              record_ids.push(*record_id);
            }
          }
        }

        insert_audit(&tx, &audit)?;
        tx.commit()?;

        Ok(Ok(AppliedUnit { record_ids, audit_id: audit.audit_id }))
      })
      .await?;

    outcome
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn lineage<'a>(&'a self, fingerprint: &'a Fingerprint) -> Result<Vec<EventSessionRecord>> {
    let fp = fingerprint.as_str().to_owned();

    let raws = self
      .conn
      .call(move |conn| {
        Ok(select_records(
          conn,
          "WHERE fingerprint = ?1 ORDER BY valid_from, schedule_version_id",
          &[&fp as &dyn ToSql],
        )?)
      })
      .await?;

    raws.into_iter().map(RawSessionRecord::into_record).collect()
  }

  async fn audit_entries(&self, version_id: VersionId) -> Result<Vec<AuditEntry>> {
    let raws: Vec<RawAuditEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT audit_id, record_id, fingerprint, schedule_version_id,
                  change_kind, changed_fields, previous_values, recorded_at
           FROM event_audit
           WHERE schedule_version_id = ?1
           ORDER BY audit_seq",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![version_id], |row| {
            Ok(RawAuditEntry {
              audit_id:            row.get(0)?,
              record_id:           row.get(1)?,
              fingerprint:         row.get(2)?,
              schedule_version_id: row.get(3)?,
              change_kind:         row.get(4)?,
              changed_fields:      row.get(5)?,
              previous_values:     row.get(6)?,
              recorded_at:         row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAuditEntry::into_entry).collect()
  }

  async fn snapshot_at(&self, version_id: VersionId) -> Result<Vec<EventSessionRecord>> {
    let Some(version) = self.get_schedule_version(version_id).await? else {
      return Ok(Vec::new());
    };
    let at_str = encode_dt(version.valid_from);

    let raws = self
      .conn
      .call(move |conn| {
        Ok(select_records(
          conn,
          "WHERE valid_from <= ?1 AND valid_to > ?1 ORDER BY fingerprint",
          &[&at_str as &dyn ToSql],
        )?)
      })
      .await?;

    raws.into_iter().map(RawSessionRecord::into_record).collect()
  }
}
