//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with a fixed microsecond width so
//! that string comparison in SQL orders them correctly. Dates are
//! `YYYY-MM-DD`, times `HH:MM:SS[.f]`. Lineages and attribute maps are compact
//! JSON. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, SubsecRound as _, Utc};
use scd_core::{
  audit::{AuditEntry, ChangeKind},
  session::{
    AttributeMap, EventSessionRecord, Fingerprint, SessionAttributes, StagingRow,
  },
  version::{ScheduleVersion, VersionId},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Drop sub-microsecond precision so a value survives a column round trip.
pub fn column_precision(dt: DateTime<Utc>) -> DateTime<Utc> { dt.trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate / NaiveTime ───────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_time(t: NaiveTime) -> String { t.format("%H:%M:%S%.f").to_string() }

pub fn decode_time(s: &str) -> Result<NaiveTime> {
  s.parse::<NaiveTime>()
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn decode_opt<T>(
  s: Option<String>,
  f: impl FnOnce(&str) -> Result<T>,
) -> Result<Option<T>> {
  s.as_deref().map(f).transpose()
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_lineage(lineage: &[VersionId]) -> Result<String> {
  Ok(serde_json::to_string(lineage)?)
}

pub fn decode_lineage(s: &str) -> Result<Vec<VersionId>> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_json(v: Option<&serde_json::Value>) -> Option<String> {
  v.map(serde_json::Value::to_string)
}

pub fn decode_json(s: Option<String>) -> Result<Option<serde_json::Value>> {
  Ok(s.as_deref().map(serde_json::from_str::<serde_json::Value>).transpose()?)
}

pub fn encode_attribute_map(m: Option<&AttributeMap>) -> Result<Option<String>> {
  Ok(m.map(serde_json::to_string).transpose()?)
}

pub fn decode_attribute_map(s: Option<String>) -> Result<Option<AttributeMap>> {
  Ok(s.as_deref().map(serde_json::from_str::<AttributeMap>).transpose()?)
}

// ─── Attribute columns ───────────────────────────────────────────────────────

/// The sixteen business-attribute columns in table order, encoded for
/// binding.
pub struct EncodedAttributes {
  pub venue_id:              Option<i64>,
  pub sport_id:              Option<i64>,
  pub day_id:                Option<i64>,
  pub event_date:            Option<String>,
  pub event_type:            Option<String>,
  pub start_time:            Option<String>,
  pub date_start:            Option<String>,
  pub end_time:              Option<String>,
  pub date_end:              Option<String>,
  pub gross_seats:           Option<i64>,
  pub seat_kill:             Option<f64>,
  pub est_ticket_sold:       Option<f64>,
  pub net_seats:             Option<i64>,
  pub est_sold_seats:        Option<i64>,
  pub workforce_count:       Option<i64>,
  pub additional_attributes: Option<String>,
}

impl EncodedAttributes {
  pub fn from_staging(row: &StagingRow) -> Self {
    Self {
      venue_id:              row.venue_id,
      sport_id:              row.sport_id,
      day_id:                row.day_id,
      event_date:            row.event_date.map(encode_date),
      event_type:            row.event_type.clone(),
      start_time:            row.start_time.map(encode_time),
      date_start:            row.date_start.map(encode_date),
      end_time:              row.end_time.map(encode_time),
      date_end:              row.date_end.map(encode_date),
      gross_seats:           row.gross_seats,
      seat_kill:             row.seat_kill,
      est_ticket_sold:       row.est_ticket_sold,
      net_seats:             row.net_seats,
      est_sold_seats:        row.est_sold_seats,
      workforce_count:       row.workforce_count,
      additional_attributes: encode_json(row.additional_attributes.as_ref()),
    }
  }

  pub fn from_attributes(a: &SessionAttributes) -> Self {
    Self::from_staging(&StagingRow::from(a))
  }

  /// Bind order matches the column order in [`ATTRIBUTE_COLUMNS`].
  pub fn params(&self) -> [&dyn rusqlite::ToSql; 16] {
    [
      &self.venue_id,
      &self.sport_id,
      &self.day_id,
      &self.event_date,
      &self.event_type,
      &self.start_time,
      &self.date_start,
      &self.end_time,
      &self.date_end,
      &self.gross_seats,
      &self.seat_kill,
      &self.est_ticket_sold,
      &self.net_seats,
      &self.est_sold_seats,
      &self.workforce_count,
      &self.additional_attributes,
    ]
  }

  /// Read the sixteen attribute columns starting at column `at`.
  pub fn from_row(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      venue_id:              row.get(at)?,
      sport_id:              row.get(at + 1)?,
      day_id:                row.get(at + 2)?,
      event_date:            row.get(at + 3)?,
      event_type:            row.get(at + 4)?,
      start_time:            row.get(at + 5)?,
      date_start:            row.get(at + 6)?,
      end_time:              row.get(at + 7)?,
      date_end:              row.get(at + 8)?,
      gross_seats:           row.get(at + 9)?,
      seat_kill:             row.get(at + 10)?,
      est_ticket_sold:       row.get(at + 11)?,
      net_seats:             row.get(at + 12)?,
      est_sold_seats:        row.get(at + 13)?,
      workforce_count:       row.get(at + 14)?,
      additional_attributes: row.get(at + 15)?,
    })
  }

  pub fn into_staging(self, staging_id: i64) -> Result<StagingRow> {
    Ok(StagingRow {
      staging_id,
      venue_id:              self.venue_id,
      sport_id:              self.sport_id,
      day_id:                self.day_id,
      event_date:            decode_opt(self.event_date, decode_date)?,
      event_type:            self.event_type,
      start_time:            decode_opt(self.start_time, decode_time)?,
      date_start:            decode_opt(self.date_start, decode_date)?,
      end_time:              decode_opt(self.end_time, decode_time)?,
      date_end:              decode_opt(self.date_end, decode_date)?,
      gross_seats:           self.gross_seats,
      seat_kill:             self.seat_kill,
      est_ticket_sold:       self.est_ticket_sold,
      net_seats:             self.net_seats,
      est_sold_seats:        self.est_sold_seats,
      workforce_count:       self.workforce_count,
      additional_attributes: decode_json(self.additional_attributes)?,
    })
  }

  /// Fact rows always carry the required attributes; a NULL there is a
  /// corrupt row.
  pub fn into_attributes(self) -> Result<SessionAttributes> {
    Ok(self.into_staging(0)?.validate()?)
  }
}

/// Attribute column list shared by the staging and fact tables.
pub const ATTRIBUTE_COLUMNS: &str = "venue_id, sport_id, day_id, event_date, event_type, \
   start_time, date_start, end_time, date_end, gross_seats, seat_kill, \
   est_ticket_sold, net_seats, est_sold_seats, workforce_count, \
   additional_attributes";

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns selected for an `event_sessions` row, in [`RawSessionRecord`]
/// order.
pub const RECORD_COLUMNS: &str = "record_id, fingerprint, schedule_version_id, \
   current_version_id, version_lineage, venue_id, sport_id, day_id, \
   event_date, event_type, start_time, date_start, end_time, date_end, \
   gross_seats, seat_kill, est_ticket_sold, net_seats, est_sold_seats, \
   workforce_count, additional_attributes, valid_from, valid_to, is_current";

/// Raw values read directly from an `event_sessions` row.
pub struct RawSessionRecord {
  pub record_id:           String,
  pub fingerprint:         String,
  pub schedule_version_id: i64,
  pub current_version_id:  i64,
  pub version_lineage:     String,
  pub attributes:          EncodedAttributes,
  pub valid_from:          String,
  pub valid_to:            String,
  pub is_current:          bool,
}

impl RawSessionRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:           row.get(0)?,
      fingerprint:         row.get(1)?,
      schedule_version_id: row.get(2)?,
      current_version_id:  row.get(3)?,
      version_lineage:     row.get(4)?,
      attributes:          EncodedAttributes::from_row(row, 5)?,
      valid_from:          row.get(21)?,
      valid_to:            row.get(22)?,
      is_current:          row.get(23)?,
    })
  }

  pub fn into_record(self) -> Result<EventSessionRecord> {
    Ok(EventSessionRecord {
      record_id:           decode_uuid(&self.record_id)?,
      fingerprint:         Fingerprint::new(self.fingerprint),
      schedule_version_id: self.schedule_version_id,
      current_version_id:  self.current_version_id,
      version_lineage:     decode_lineage(&self.version_lineage)?,
      attributes:          self.attributes.into_attributes()?,
      valid_from:          decode_dt(&self.valid_from)?,
      valid_to:            decode_dt(&self.valid_to)?,
      is_current:          self.is_current,
    })
  }
}

/// A fact row encoded for `INSERT`.
pub struct EncodedRecord {
  pub record_id:           Uuid,
  pub record_id_str:       String,
  pub fingerprint:         Fingerprint,
  pub schedule_version_id: i64,
  pub current_version_id:  i64,
  pub version_lineage:     String,
  pub attributes:          EncodedAttributes,
  pub valid_from:          String,
  pub valid_to:            String,
  pub is_current:          bool,
}

impl EncodedRecord {
  pub fn new(r: &EventSessionRecord) -> Result<Self> {
    Ok(Self {
      record_id:           r.record_id,
      record_id_str:       encode_uuid(r.record_id),
      fingerprint:         r.fingerprint.clone(),
      schedule_version_id: r.schedule_version_id,
      current_version_id:  r.current_version_id,
      version_lineage:     encode_lineage(&r.version_lineage)?,
      attributes:          EncodedAttributes::from_attributes(&r.attributes),
      valid_from:          encode_dt(r.valid_from),
      valid_to:            encode_dt(r.valid_to),
      is_current:          r.is_current,
    })
  }
}

/// Raw values read directly from an `event_audit` row.
pub struct RawAuditEntry {
  pub audit_id:            String,
  pub record_id:           Option<String>,
  pub fingerprint:         String,
  pub schedule_version_id: i64,
  pub change_kind:         String,
  pub changed_fields:      Option<String>,
  pub previous_values:     Option<String>,
  pub recorded_at:         String,
}

impl RawAuditEntry {
  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      audit_id:            decode_uuid(&self.audit_id)?,
      record_id:           self.record_id.as_deref().map(decode_uuid).transpose()?,
      fingerprint:         Fingerprint::new(self.fingerprint),
      schedule_version_id: self.schedule_version_id,
      change_kind:         self.change_kind.parse::<ChangeKind>()?,
      changed_fields:      decode_attribute_map(self.changed_fields)?,
      previous_values:     decode_attribute_map(self.previous_values)?,
      recorded_at:         decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw values read directly from a `schedule_versions` row.
pub struct RawScheduleVersion {
  pub version_id: i64,
  pub label:      String,
  pub valid_from: String,
  pub valid_to:   String,
}

impl RawScheduleVersion {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id: row.get(0)?,
      label:      row.get(1)?,
      valid_from: row.get(2)?,
      valid_to:   row.get(3)?,
    })
  }

  pub fn into_version(self) -> Result<ScheduleVersion> {
    Ok(ScheduleVersion {
      version_id: self.version_id,
      label:      self.label,
      valid_from: decode_dt(&self.valid_from)?,
      valid_to:   decode_dt(&self.valid_to)?,
    })
  }
}
