//! Field-level diff between two versions of the same session.

use serde::{Deserialize, Serialize};
use scd_core::session::AttributeMap;

/// Attributes that differ between an old and a new version.
///
/// `changed_fields` holds the new values and `previous_values` the old ones;
/// both always have the same key set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowDiff {
  pub changed_fields:  AttributeMap,
  pub previous_values: AttributeMap,
}

impl RowDiff {
  /// True when no attribute changed; the row is a no-op.
  pub fn is_empty(&self) -> bool { self.changed_fields.is_empty() }
}

/// Compare `old` and `new` attribute by attribute.
///
/// Values are compared exactly, so `100` and `100.0` differ. A key present on
/// only one side counts as changed, with `null` standing in for the missing
/// value.
pub fn diff(old: &AttributeMap, new: &AttributeMap) -> RowDiff {
  let mut out = RowDiff::default();

  for (key, old_value) in old {
    match new.get(key) {
      Some(new_value) if new_value == old_value => {}
      new_value => {
        out
          .changed_fields
          .insert(key.clone(), new_value.cloned().unwrap_or_default());
        out.previous_values.insert(key.clone(), old_value.clone());
      }
    }
  }

  for (key, new_value) in new {
    if !old.contains_key(key) {
      out.changed_fields.insert(key.clone(), new_value.clone());
      out.previous_values.insert(key.clone(), serde_json::Value::Null);
    }
  }

  out
}
