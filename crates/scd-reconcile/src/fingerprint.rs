//! Fingerprint computation for event sessions.
//!
//! A fingerprint is a SHA-256 hash over the business key only: venue, sport,
//! day, event date, event type, start time and start date. Every field is
//! written with a fixed width or a length prefix, and optional fields carry a
//! presence byte, so no two distinct keys share an encoding.
//!
//! Two distinct keys can still collide in the digest itself. The classifier
//! compares the full business key whenever a fingerprint matches and aborts
//! the run on a mismatch rather than merging unrelated sessions.

use chrono::{Datelike as _, NaiveDate, NaiveTime, Timelike as _};
use scd_core::session::{BusinessKey, Fingerprint, SessionAttributes};
use sha2::{Digest, Sha256};

/// Compute the fingerprint of a session from its business attributes.
pub fn fingerprint(attrs: &SessionAttributes) -> Fingerprint {
  fingerprint_key(&attrs.business_key())
}

/// Compute the fingerprint of a business key.
///
/// Stable: the same key always yields the same fingerprint, independent of
/// any other attribute or of where the row sits in its batch.
pub fn fingerprint_key(key: &BusinessKey) -> Fingerprint {
  let mut hasher = Sha256::new();
  hasher.update(key.venue_id.to_le_bytes());
  hasher.update(key.sport_id.to_le_bytes());
  hasher.update(key.day_id.to_le_bytes());
  update_date(&mut hasher, key.event_date);
  update_str(&mut hasher, &key.event_type);
  update_time(&mut hasher, key.start_time);
  match key.date_start {
    Some(d) => {
      hasher.update([1]);
      update_date(&mut hasher, d);
    }
    None => hasher.update([0]),
  }
  Fingerprint::new(hex::encode(hasher.finalize()))
}

fn update_date(hasher: &mut Sha256, d: NaiveDate) {
  hasher.update(d.num_days_from_ce().to_le_bytes());
}

fn update_time(hasher: &mut Sha256, t: NaiveTime) {
  hasher.update(t.num_seconds_from_midnight().to_le_bytes());
  hasher.update(t.nanosecond().to_le_bytes());
}

fn update_str(hasher: &mut Sha256, s: &str) {
  hasher.update((s.len() as u64).to_le_bytes());
  hasher.update(s.as_bytes());
}
