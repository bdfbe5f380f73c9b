//! Point-in-time comparison of two schedule versions.

use std::collections::{BTreeMap, BTreeSet};

use scd_core::{
  session::{AttributeMap, EventSessionRecord, Fingerprint},
  store::SessionStore,
  version::VersionId,
};
use serde::Serialize;

use crate::{Error, Result, diff::diff};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
  pub old: serde_json::Value,
  pub new: serde_json::Value,
}

/// One lineage that differs between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionChange {
  Added {
    fingerprint: Fingerprint,
    attributes:  AttributeMap,
  },
  Removed {
    fingerprint: Fingerprint,
    attributes:  AttributeMap,
  },
  Modified {
    fingerprint: Fingerprint,
    changes:     BTreeMap<String, FieldChange>,
  },
}

impl VersionChange {
  pub fn fingerprint(&self) -> &Fingerprint {
    match self {
      Self::Added { fingerprint, .. }
      | Self::Removed { fingerprint, .. }
      | Self::Modified { fingerprint, .. } => fingerprint,
    }
  }
}

/// Diff two sets of records by fingerprint. Output is ordered by fingerprint.
pub fn compare_snapshots(
  from: &[EventSessionRecord],
  to: &[EventSessionRecord],
) -> Result<Vec<VersionChange>> {
  let from: BTreeMap<&Fingerprint, &EventSessionRecord> =
    from.iter().map(|r| (&r.fingerprint, r)).collect();
  let to: BTreeMap<&Fingerprint, &EventSessionRecord> =
    to.iter().map(|r| (&r.fingerprint, r)).collect();

  let keys: BTreeSet<&Fingerprint> = from.keys().chain(to.keys()).copied().collect();
  let mut out = Vec::new();

  for fp in keys {
    match (from.get(fp), to.get(fp)) {
      (None, Some(new)) => out.push(VersionChange::Added {
        fingerprint: fp.clone(),
        attributes:  new.attributes.to_map()?,
      }),
      (Some(old), None) => out.push(VersionChange::Removed {
        fingerprint: fp.clone(),
        attributes:  old.attributes.to_map()?,
      }),
      (Some(old), Some(new)) => {
        let d = diff(&old.attributes.to_map()?, &new.attributes.to_map()?);
        if d.is_empty() {
          continue;
        }
        let changes = d
          .previous_values
          .into_iter()
          .zip(d.changed_fields.into_values())
          .map(|((field, old), new)| (field, FieldChange { old, new }))
          .collect();
        out.push(VersionChange::Modified { fingerprint: fp.clone(), changes });
      }
      (None, None) => {}
    }
  }

  Ok(out)
}

/// Compare the snapshots visible right after two runs.
pub async fn compare_versions<S: SessionStore>(
  store: &S,
  from: VersionId,
  to: VersionId,
) -> Result<Vec<VersionChange>> {
  let old = store.snapshot_at(from).await.map_err(Error::store)?;
  let new = store.snapshot_at(to).await.map_err(Error::store)?;
  compare_snapshots(&old, &new)
}
