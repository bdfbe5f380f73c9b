//! Event sessions, the business entity tracked by the history store.
//!
//! A staging row is the incoming truth for one session. A session record is
//! one physical version of a session's attributes; records sharing a
//! fingerprint form a lineage, of which at most one record is current.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, version::VersionId};

/// Attribute name → value, ordered by name so serialised payloads are stable.
pub type AttributeMap = BTreeMap<String, serde_json::Value>;

// ─── Fingerprint ─────────────────────────────────────────────────────────────

/// Hex digest of a session's business key. Matches staging rows to fact rows
/// across loads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
  pub fn new(hex: impl Into<String>) -> Self { Self(hex.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Business key ────────────────────────────────────────────────────────────

/// The attribute subset that identifies a session across loads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessKey {
  pub venue_id:   i64,
  pub sport_id:   i64,
  pub day_id:     i64,
  pub event_date: NaiveDate,
  pub event_type: String,
  pub start_time: NaiveTime,
  pub date_start: Option<NaiveDate>,
}

// ─── Attributes ──────────────────────────────────────────────────────────────

/// Business attributes of an event session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAttributes {
  pub venue_id:              i64,
  pub sport_id:              i64,
  pub day_id:                i64,
  pub event_date:            NaiveDate,
  pub event_type:            String,
  pub start_time:            NaiveTime,
  pub date_start:            Option<NaiveDate>,
  pub end_time:              Option<NaiveTime>,
  pub date_end:              Option<NaiveDate>,
  pub gross_seats:           Option<i64>,
  pub seat_kill:             Option<f64>,
  pub est_ticket_sold:       Option<f64>,
  pub net_seats:             Option<i64>,
  pub est_sold_seats:        Option<i64>,
  pub workforce_count:       Option<i64>,
  /// Free-form extras; compared as a whole.
  pub additional_attributes: Option<serde_json::Value>,
}

impl SessionAttributes {
  /// Minimal attributes with every optional field unset.
  pub fn new(
    venue_id: i64,
    sport_id: i64,
    day_id: i64,
    event_date: NaiveDate,
    event_type: impl Into<String>,
    start_time: NaiveTime,
  ) -> Self {
    Self {
      venue_id,
      sport_id,
      day_id,
      event_date,
      event_type: event_type.into(),
      start_time,
      date_start: None,
      end_time: None,
      date_end: None,
      gross_seats: None,
      seat_kill: None,
      est_ticket_sold: None,
      net_seats: None,
      est_sold_seats: None,
      workforce_count: None,
      additional_attributes: None,
    }
  }

  pub fn business_key(&self) -> BusinessKey {
    BusinessKey {
      venue_id:   self.venue_id,
      sport_id:   self.sport_id,
      day_id:     self.day_id,
      event_date: self.event_date,
      event_type: self.event_type.clone(),
      start_time: self.start_time,
      date_start: self.date_start,
    }
  }

  /// Every business attribute keyed by name. Unset attributes map to `null`.
  pub fn to_map(&self) -> Result<AttributeMap> {
    match serde_json::to_value(self)? {
      serde_json::Value::Object(obj) => Ok(obj.into_iter().collect()),
      _ => Ok(AttributeMap::new()),
    }
  }
}

// ─── Staging ─────────────────────────────────────────────────────────────────

/// One row of the staging table. Every attribute is optional here; required
/// ones are checked by [`StagingRow::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagingRow {
  /// Assigned by the store when the row is loaded.
  #[serde(default)]
  pub staging_id:            i64,
  pub venue_id:              Option<i64>,
  pub sport_id:              Option<i64>,
  pub day_id:                Option<i64>,
  pub event_date:            Option<NaiveDate>,
  pub event_type:            Option<String>,
  pub start_time:            Option<NaiveTime>,
  pub date_start:            Option<NaiveDate>,
  pub end_time:              Option<NaiveTime>,
  pub date_end:              Option<NaiveDate>,
  pub gross_seats:           Option<i64>,
  pub seat_kill:             Option<f64>,
  pub est_ticket_sold:       Option<f64>,
  pub net_seats:             Option<i64>,
  pub est_sold_seats:        Option<i64>,
  pub workforce_count:       Option<i64>,
  pub additional_attributes: Option<serde_json::Value>,
}

impl StagingRow {
  /// Turn the row into validated attributes, or report every missing
  /// required attribute at once.
  pub fn validate(self) -> Result<SessionAttributes> {
    let mut missing = Vec::new();
    if self.venue_id.is_none() {
      missing.push("venue_id");
    }
    if self.sport_id.is_none() {
      missing.push("sport_id");
    }
    if self.day_id.is_none() {
      missing.push("day_id");
    }
    if self.event_date.is_none() {
      missing.push("event_date");
    }
    if self.event_type.as_deref().is_none_or(|t| t.trim().is_empty()) {
      missing.push("event_type");
    }
    if self.start_time.is_none() {
      missing.push("start_time");
    }

    let (
      Some(venue_id),
      Some(sport_id),
      Some(day_id),
      Some(event_date),
      Some(event_type),
      Some(start_time),
    ) = (
      self.venue_id,
      self.sport_id,
      self.day_id,
      self.event_date,
      self.event_type,
      self.start_time,
    )
    else {
      return Err(Error::MalformedRecord { staging_id: self.staging_id, missing });
    };
    if !missing.is_empty() {
      return Err(Error::MalformedRecord { staging_id: self.staging_id, missing });
    }

    Ok(SessionAttributes {
      venue_id,
      sport_id,
      day_id,
      event_date,
      event_type,
      start_time,
      date_start: self.date_start,
      end_time: self.end_time,
      date_end: self.date_end,
      gross_seats: self.gross_seats,
      seat_kill: self.seat_kill,
      est_ticket_sold: self.est_ticket_sold,
      net_seats: self.net_seats,
      est_sold_seats: self.est_sold_seats,
      workforce_count: self.workforce_count,
      additional_attributes: self.additional_attributes,
    })
  }
}

impl From<&SessionAttributes> for StagingRow {
  fn from(a: &SessionAttributes) -> Self {
    Self {
      staging_id:            0,
      venue_id:              Some(a.venue_id),
      sport_id:              Some(a.sport_id),
      day_id:                Some(a.day_id),
      event_date:            Some(a.event_date),
      event_type:            Some(a.event_type.clone()),
      start_time:            Some(a.start_time),
      date_start:            a.date_start,
      end_time:              a.end_time,
      date_end:              a.date_end,
      gross_seats:           a.gross_seats,
      seat_kill:             a.seat_kill,
      est_ticket_sold:       a.est_ticket_sold,
      net_seats:             a.net_seats,
      est_sold_seats:        a.est_sold_seats,
      workforce_count:       a.workforce_count,
      additional_attributes: a.additional_attributes.clone(),
    }
  }
}

// ─── Fact rows ───────────────────────────────────────────────────────────────

/// One physical version of an event session.
///
/// Records are never physically deleted. Superseding or retiring a record
/// only flips `is_current` and closes `valid_to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSessionRecord {
  pub record_id:           Uuid,
  pub fingerprint:         Fingerprint,
  /// The run that produced this physical row.
  pub schedule_version_id: VersionId,
  /// The run that last touched this lineage.
  pub current_version_id:  VersionId,
  /// Every run that produced a row for this lineage (or retired it), in
  /// order. Append-only.
  pub version_lineage:     Vec<VersionId>,
  pub attributes:          SessionAttributes,
  pub valid_from:          DateTime<Utc>,
  pub valid_to:            DateTime<Utc>,
  pub is_current:          bool,
}

impl EventSessionRecord {
  /// Whether this record was the current one at instant `at`.
  pub fn valid_at(&self, at: DateTime<Utc>) -> bool {
    self.valid_from <= at && at < self.valid_to
  }
}
