//! Dotted-path navigation over JSON values.
//!
//! Shared by index projection, patch replay, and sensitive-field pruning.
//! Paths descend object keys only; array elements are addressed by their own
//! `id` field at the patch-operation layer, not here.

use serde_json::{Map, Value};

/// The value at `path`, if every segment resolves.
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
  let mut cur = value;
  for seg in path.split('.') {
    cur = cur.as_object()?.get(seg)?;
  }
  Some(cur)
}

/// Mutable access to the value at `path`.
pub fn get_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
  let mut cur = value;
  for seg in path.split('.') {
    cur = cur.as_object_mut()?.get_mut(seg)?;
  }
  Some(cur)
}

/// Write `new` at `path`, creating intermediate objects as needed. Returns
/// false (leaving `value` untouched beyond created intermediates) when an
/// existing intermediate is not an object.
pub fn set(value: &mut Value, path: &str, new: Value) -> bool {
  let mut cur = value;
  let mut segments = path.split('.').peekable();
  loop {
    let Some(seg) = segments.next() else { return false };
    let Some(obj) = cur.as_object_mut() else { return false };
    if segments.peek().is_none() {
      obj.insert(seg.to_string(), new);
      return true;
    }
    cur = obj
      .entry(seg.to_string())
      .or_insert_with(|| Value::Object(Map::new()));
  }
}

/// Remove the key at `path` from its immediate parent.
pub fn remove(value: &mut Value, path: &str) -> Option<Value> {
  match path.rsplit_once('.') {
    None => value.as_object_mut()?.remove(path),
    Some((parent, key)) => {
      get_mut(value, parent)?.as_object_mut()?.remove(key)
    }
  }
}

/// Move the value at `path` to the sibling key `new_key`.
pub fn rename(value: &mut Value, path: &str, new_key: &str) -> bool {
  let (parent, key) = match path.rsplit_once('.') {
    None => (Some(&mut *value), path),
    Some((parent, key)) => (get_mut(value, parent), key),
  };
  let Some(obj) = parent.and_then(Value::as_object_mut) else {
    return false;
  };
  match obj.remove(key) {
    Some(v) => {
      obj.insert(new_key.to_string(), v);
      true
    }
    None => false,
  }
}
