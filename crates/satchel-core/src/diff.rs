//! Structural diff between two JSON documents.
//!
//! Produces the ordered patch operations that transform the old value into
//! the new one; these are what an object-update change record carries.
//! Arrays whose elements all carry a string `id` diff element-wise by that
//! id; any other array change is a wholesale property update.

use serde_json::Value;

use crate::change::PatchOp;

/// Compare `old` and `new` as documents.
pub fn diff(old: &Value, new: &Value) -> Vec<PatchOp> {
  let mut ops = Vec::new();
  diff_objects("", old, new, &mut ops);
  ops
}

fn join(prefix: &str, key: &str) -> String {
  if prefix.is_empty() {
    key.to_string()
  } else {
    format!("{prefix}.{key}")
  }
}

fn diff_objects(prefix: &str, old: &Value, new: &Value, ops: &mut Vec<PatchOp>) {
  let (Some(old_map), Some(new_map)) = (old.as_object(), new.as_object())
  else {
    return;
  };

  for (key, new_value) in new_map {
    let path = join(prefix, key);
    match old_map.get(key) {
      None => {
        ops.push(PatchOp::PropAdd { prop: path, value: new_value.clone() });
      }
      Some(old_value) if old_value == new_value => {}
      Some(old_value) => {
        if old_value.is_object() && new_value.is_object() {
          diff_objects(&path, old_value, new_value, ops);
        } else if let (Some(old_items), Some(new_items)) =
          (old_value.as_array(), new_value.as_array())
        {
          diff_arrays(&path, old_items, new_items, ops);
        } else {
          ops.push(PatchOp::PropUpdate {
            prop:  path,
            value: new_value.clone(),
          });
        }
      }
    }
  }

  for key in old_map.keys() {
    if !new_map.contains_key(key) {
      ops.push(PatchOp::PropDelete { prop: join(prefix, key) });
    }
  }
}

fn element_id(item: &Value) -> Option<&str> {
  item.get("id").and_then(Value::as_str)
}

fn diff_arrays(
  path: &str,
  old_items: &[Value],
  new_items: &[Value],
  ops: &mut Vec<PatchOp>,
) {
  let keyed = old_items.iter().chain(new_items).all(|i| element_id(i).is_some());
  if !keyed {
    ops.push(PatchOp::PropUpdate {
      prop:  path.to_string(),
      value: Value::Array(new_items.to_vec()),
    });
    return;
  }

  let old_ids: Vec<&str> = old_items.iter().filter_map(element_id).collect();
  let new_ids: Vec<&str> = new_items.iter().filter_map(element_id).collect();
  let before = ops.len();

  for id in &old_ids {
    if !new_ids.contains(id) {
      ops.push(PatchOp::ArrayDelete {
        prop: path.to_string(),
        id:   (*id).to_string(),
      });
    }
  }

  for (index, item) in new_items.iter().enumerate() {
    let Some(id) = element_id(item) else { continue };
    match old_ids.iter().position(|old| *old == id) {
      Some(at) => {
        if old_items[at] != *item {
          ops.push(PatchOp::ArrayUpdate {
            prop:  path.to_string(),
            id:    id.to_string(),
            value: item.clone(),
          });
        }
      }
      None => {
        ops.push(PatchOp::ArrayAdd {
          prop: path.to_string(),
          index,
          value: item.clone(),
        });
      }
    }
  }

  // same ids, same elements, different order
  if ops.len() == before && old_ids != new_ids {
    ops.push(PatchOp::ArrayOrder {
      prop:  path.to_string(),
      value: new_ids.iter().map(|id| id.to_string()).collect(),
    });
  }
}
