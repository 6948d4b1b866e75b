//! The append-only change log and change-stream replay.

use satchel_core::{
  Result,
  change::{ChangeFilter, ChangeRecord, PatchOp},
  dialect::SqlBackend,
  document::SetOptions,
  params::ParamBuilder,
  path,
  time::{now_stamp, stamp},
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::store::SqlStore;

impl<D: SqlBackend> SqlStore<D> {
  /// Append one record to the change log. The backend assigns the
  /// sequence number; this is the only writer of the `changes` table.
  pub(crate) async fn append_change(
    &self,
    record: &ChangeRecord,
  ) -> Result<()> {
    let b = self.backend();
    let mut p = ParamBuilder::new(b);
    p.add("container", record.container())
      .add("id", record.id().unwrap_or_default())
      .add("change", serde_json::to_string(record)?)
      .add("timestamp", now_stamp());
    let sql = format!(
      "INSERT INTO {} ({}, {}, {}, {}) VALUES ({}, {}, {}, {})",
      b.quote_ident("changes"),
      b.quote_ident("container"),
      b.quote_ident("id"),
      b.quote_ident("change"),
      b.quote_ident("timestamp"),
      p.placeholder("container")?,
      p.placeholder("id")?,
      p.placeholder("change")?,
      p.placeholder("timestamp")?,
    );
    b.execute(&sql, &p.finalize()).await?;
    Ok(())
  }

  /// Read the change log in sequence order, optionally bounded below by
  /// timestamp and/or sequence (both inclusive).
  pub async fn get_changes(
    &self,
    filter: ChangeFilter,
  ) -> Result<Vec<ChangeRecord>> {
    let b = self.backend();
    let mut p = ParamBuilder::new(b);
    let mut conditions = Vec::new();
    if let Some(since) = filter.since {
      p.add("since", stamp(since));
      conditions.push(format!(
        "{} >= {}",
        b.quote_ident("timestamp"),
        p.placeholder("since")?,
      ));
    }
    if let Some(sequence) = filter.from_sequence {
      p.add("sequence", sequence);
      conditions.push(format!(
        "{} >= {}",
        b.quote_ident("change_id"),
        p.placeholder("sequence")?,
      ));
    }

    let mut sql = format!(
      "SELECT {} FROM {}",
      b.quote_ident("change"),
      b.quote_ident("changes"),
    );
    if !conditions.is_empty() {
      sql.push_str(" WHERE ");
      sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(&format!(" ORDER BY {} ASC", b.quote_ident("change_id")));

    let mut records = Vec::new();
    for row in b.query_all(&sql, &p.finalize()).await? {
      let Some(text) = row.text("change") else { continue };
      records.push(serde_json::from_str(text)?);
    }
    Ok(records)
  }

  /// Replay a change stream against this store, with change tracking
  /// suppressed so merged mutations are not re-logged. Best-effort: a
  /// record whose target is missing is skipped with a warning, never
  /// aborting the rest of the stream.
  pub async fn merge(&self, changes: &[ChangeRecord]) -> Result<()> {
    for record in changes {
      match record {
        ChangeRecord::ContainerSet { value } => {
          self.set_container_tracked(value.clone(), false).await?;
        }
        ChangeRecord::ObjectAdd { container, value } => {
          self
            .set_tracked(SetOptions::new(container, value.clone()), false)
            .await?;
        }
        ChangeRecord::ObjectDelete { container, id } => {
          match self.del_tracked(container, id, false).await {
            Err(satchel_core::Error::ItemNotFound { .. })
            | Err(satchel_core::Error::ContainerNotFound(_)) => {
              warn!(%container, %id, "merge: delete target missing, skipping");
            }
            other => other?,
          }
        }
        ChangeRecord::ObjectUpdate { container, id, changes } => {
          let Some(current) = self.fetch_row(container, id).await? else {
            warn!(%container, %id, "merge: update target missing, skipping");
            continue;
          };
          let mut value = current.value;
          for op in changes {
            if !apply_patch(&mut value, op) {
              warn!(
                %container,
                %id,
                prop = op.prop(),
                "merge: patch target missing, skipping operation"
              );
            }
          }
          if let Some(obj) = value.as_object_mut() {
            obj.insert("id".to_string(), Value::from(id.clone()));
          }
          self.set_tracked(SetOptions::new(container, value), false).await?;
        }
      }
    }
    Ok(())
  }
}

/// Apply one patch operation in place. Returns whether it took effect.
fn apply_patch(value: &mut Value, op: &PatchOp) -> bool {
  match op {
    PatchOp::PropAdd { prop, value: new }
    | PatchOp::PropUpdate { prop, value: new } => {
      path::set(value, prop, new.clone())
    }
    PatchOp::PropDelete { prop } => path::remove(value, prop).is_some(),
    PatchOp::PropRename { prop, value: new_key } => {
      path::rename(value, prop, new_key)
    }
    PatchOp::ArrayAdd { prop, index, value: item } => {
      let Some(items) =
        path::get_mut(value, prop).and_then(Value::as_array_mut)
      else {
        return false;
      };
      items.insert((*index).min(items.len()), item.clone());
      true
    }
    PatchOp::ArrayUpdate { prop, id, value: item } => {
      let Some(items) =
        path::get_mut(value, prop).and_then(Value::as_array_mut)
      else {
        return false;
      };
      match items.iter_mut().find(|e| element_id(e) == Some(id)) {
        Some(slot) => {
          *slot = item.clone();
          true
        }
        None => false,
      }
    }
    PatchOp::ArrayDelete { prop, id } => {
      let Some(items) =
        path::get_mut(value, prop).and_then(Value::as_array_mut)
      else {
        return false;
      };
      let before = items.len();
      items.retain(|e| element_id(e) != Some(id));
      items.len() < before
    }
    PatchOp::ArrayOrder { prop, value: order } => {
      // Carried in the wire format but not applied; the ordering was
      // never persisted by replay.
      debug!(%prop, ids = order.len(), "array-order accepted, not applied");
      true
    }
  }
}

fn element_id(item: &Value) -> Option<&str> {
  item.get("id").and_then(Value::as_str)
}
