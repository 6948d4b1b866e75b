//! Change records — the append-only replication log's wire format.
//!
//! Every mutation appends exactly one record. A store can be reconstructed
//! (or two stores converged) by replaying records in sequence order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::container::ContainerDef;

// ─── Records ─────────────────────────────────────────────────────────────────

/// One logged mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChangeRecord {
  /// A container declaration, carried in full (including seeded objects).
  ContainerSet { value: ContainerDef },
  /// A document insert, carried as the full value with its id.
  ObjectAdd { container: String, value: Value },
  /// A document update, carried as the patch operations that transform the
  /// previous value into the new one.
  ObjectUpdate {
    container: String,
    id:        String,
    changes:   Vec<PatchOp>,
  },
  ObjectDelete { container: String, id: String },
}

impl ChangeRecord {
  /// The container this record applies to.
  pub fn container(&self) -> &str {
    match self {
      Self::ContainerSet { value } => &value.name,
      Self::ObjectAdd { container, .. }
      | Self::ObjectUpdate { container, .. }
      | Self::ObjectDelete { container, .. } => container,
    }
  }

  /// The document id, when the record addresses a single document.
  pub fn id(&self) -> Option<&str> {
    match self {
      Self::ContainerSet { .. } => None,
      Self::ObjectAdd { value, .. } => {
        value.get("id").and_then(Value::as_str)
      }
      Self::ObjectUpdate { id, .. } | Self::ObjectDelete { id, .. } => {
        Some(id)
      }
    }
  }
}

/// Bounds for reading the change log. Both are inclusive.
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
  pub since:         Option<DateTime<Utc>>,
  pub from_sequence: Option<i64>,
}

// ─── Patch operations ────────────────────────────────────────────────────────

/// A path-addressed edit replayed to apply an object-update record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PatchOp {
  PropAdd { prop: String, value: Value },
  PropUpdate { prop: String, value: Value },
  PropDelete { prop: String },
  /// Move the value at `prop` to the sibling key named by `value`.
  PropRename { prop: String, value: String },
  /// Insert `value` at `index` within the array at `prop`.
  ArrayAdd { prop: String, index: usize, value: Value },
  /// Replace the element of the array at `prop` whose `id` field matches.
  ArrayUpdate { prop: String, id: String, value: Value },
  ArrayDelete { prop: String, id: String },
  /// Element ids in their desired order. Accepted in the wire format;
  /// replay does not reorder (see DESIGN notes).
  ArrayOrder { prop: String, value: Vec<String> },
}

impl PatchOp {
  /// The dotted path this operation addresses.
  pub fn prop(&self) -> &str {
    match self {
      Self::PropAdd { prop, .. }
      | Self::PropUpdate { prop, .. }
      | Self::PropDelete { prop }
      | Self::PropRename { prop, .. }
      | Self::ArrayAdd { prop, .. }
      | Self::ArrayUpdate { prop, .. }
      | Self::ArrayDelete { prop, .. }
      | Self::ArrayOrder { prop, .. } => prop,
    }
  }
}
