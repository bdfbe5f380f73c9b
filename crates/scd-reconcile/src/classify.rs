//! Three-way partition of a staging batch against the current records.
//!
//! Staging rows and current records are joined on fingerprint through a hash
//! map: staging rows without a partner are inserts, partners whose attributes
//! differ are updates, partners with identical attributes are no-ops, and
//! current records nobody in staging claimed are deletes.

use std::collections::{HashMap, HashSet};

use scd_core::session::{EventSessionRecord, Fingerprint, SessionAttributes};

use crate::{
  Error, Result,
  diff::{RowDiff, diff},
  error::Snapshot,
  fingerprint::fingerprint,
};

/// A validated staging row with its fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedSession {
  pub staging_id:  i64,
  pub fingerprint: Fingerprint,
  pub attributes:  SessionAttributes,
}

impl StagedSession {
  pub fn new(staging_id: i64, attributes: SessionAttributes) -> Self {
    Self { staging_id, fingerprint: fingerprint(&attributes), attributes }
  }
}

/// A staging row matched to a current record with at least one changed
/// attribute.
#[derive(Debug, Clone)]
pub struct Update {
  pub staged:  StagedSession,
  pub current: EventSessionRecord,
  pub diff:    RowDiff,
}

/// The result of [`classify`]. Every fingerprint of either input lands in
/// exactly one of the four buckets.
#[derive(Debug, Default)]
pub struct Classification {
  pub inserts:   Vec<StagedSession>,
  pub updates:   Vec<Update>,
  /// Sorted by fingerprint.
  pub deletes:   Vec<EventSessionRecord>,
  /// Matched rows with no attribute change. Nothing is written for them.
  pub unchanged: Vec<Fingerprint>,
}

impl Classification {
  pub fn is_noop(&self) -> bool {
    self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
  }
}

/// Partition `staging` against `current`.
///
/// Fails without partial output if either snapshot holds a fingerprint twice,
/// or if a fingerprint match joins two different business keys.
pub fn classify(
  staging: Vec<StagedSession>,
  current: Vec<EventSessionRecord>,
) -> Result<Classification> {
  let mut by_fingerprint: HashMap<Fingerprint, EventSessionRecord> =
    HashMap::with_capacity(current.len());
  for record in current {
    let fp = record.fingerprint.clone();
    if by_fingerprint.insert(fp.clone(), record).is_some() {
      return Err(Error::DuplicateFingerprint { fingerprint: fp, snapshot: Snapshot::Current });
    }
  }

  let mut seen: HashSet<Fingerprint> = HashSet::with_capacity(staging.len());
  for staged in &staging {
    if !seen.insert(staged.fingerprint.clone()) {
      return Err(Error::DuplicateFingerprint {
        fingerprint: staged.fingerprint.clone(),
        snapshot:    Snapshot::Staging,
      });
    }
  }

  let mut out = Classification::default();

  for staged in staging {
    let Some(current) = by_fingerprint.remove(&staged.fingerprint) else {
      out.inserts.push(staged);
      continue;
    };

    if current.attributes.business_key() != staged.attributes.business_key() {
      return Err(Error::FingerprintCollision(staged.fingerprint));
    }

    let row_diff = diff(&current.attributes.to_map()?, &staged.attributes.to_map()?);
    if row_diff.is_empty() {
      out.unchanged.push(staged.fingerprint);
    } else {
      out.updates.push(Update { staged, current, diff: row_diff });
    }
  }

  out.deletes = by_fingerprint.into_values().collect();
  out.deletes.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

  Ok(out)
}
