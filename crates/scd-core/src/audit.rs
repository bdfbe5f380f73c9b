//! Audit entries, the append-only change log written alongside every fact
//! mutation.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  session::{AttributeMap, Fingerprint},
  version::VersionId,
};

/// What happened to a lineage in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
}

impl ChangeKind {
  /// The string stored in the `change_kind` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Insert => "INSERT",
      Self::Update => "UPDATE",
      Self::Delete => "DELETE",
    }
  }
}

impl fmt::Display for ChangeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ChangeKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "INSERT" => Ok(Self::Insert),
      "UPDATE" => Ok(Self::Update),
      "DELETE" => Ok(Self::Delete),
      other => Err(Error::UnknownChangeKind(other.to_owned())),
    }
  }
}

/// Immutable record of one classified change.
///
/// | kind   | `record_id`         | `changed_fields`     | `previous_values`   |
/// |--------|---------------------|----------------------|---------------------|
/// | INSERT | the new record      | every new attribute  | `None`              |
/// | UPDATE | the superseded one  | new values, changed  | old values, changed |
/// | DELETE | the retired record  | `None`               | every old attribute |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
  pub audit_id:            Uuid,
  pub record_id:           Option<Uuid>,
  pub fingerprint:         Fingerprint,
  pub schedule_version_id: VersionId,
  pub change_kind:         ChangeKind,
  pub changed_fields:      Option<AttributeMap>,
  pub previous_values:     Option<AttributeMap>,
  pub recorded_at:         DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn change_kind_parses_its_own_display() {
    for kind in [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete] {
      assert_eq!(kind.to_string().parse::<ChangeKind>().unwrap(), kind);
    }
  }

  #[test]
  fn change_kind_rejects_lowercase() {
    let err = "insert".parse::<ChangeKind>().unwrap_err();
    assert!(matches!(err, Error::UnknownChangeKind(ref s) if s == "insert"));
  }

  #[test]
  fn change_kind_serialises_upper_case() {
    let json = serde_json::to_string(&ChangeKind::Delete).unwrap();
    assert_eq!(json, "\"DELETE\"");
  }
}
