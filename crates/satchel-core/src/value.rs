//! Dialect-neutral scalars, rows, and bound-parameter payloads.
//!
//! The engine speaks these types; each backend crate converts them to its
//! driver's native representation at the call boundary.

use std::collections::BTreeMap;

use serde_json::Value;

// ─── Scalars ─────────────────────────────────────────────────────────────────

/// A scalar crossing the engine/backend boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
  Null,
  Int(i64),
  Float(f64),
  Text(String),
  Bool(bool),
}

impl SqlValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Int(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Float(f) => Some(*f),
      Self::Int(i) => Some(*i as f64),
      _ => None,
    }
  }

  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  /// Lower-case text in place; other variants pass through. Search columns
  /// store folded text so comparisons are case-insensitive by construction.
  pub fn fold(self) -> Self {
    match self {
      Self::Text(s) => Self::Text(s.to_lowercase()),
      other => other,
    }
  }

  /// Convert a JSON leaf for storage in a search column. Strings fold to
  /// lower case; objects and arrays store as their JSON text.
  pub fn from_json_folded(value: &Value) -> Self {
    match value {
      Value::Null => Self::Null,
      Value::Bool(b) => Self::Bool(*b),
      Value::Number(n) => match n.as_i64() {
        Some(i) => Self::Int(i),
        None => Self::Float(n.as_f64().unwrap_or(0.0)),
      },
      Value::String(s) => Self::Text(s.to_lowercase()),
      other => Self::Text(other.to_string().to_lowercase()),
    }
  }
}

impl From<&str> for SqlValue {
  fn from(s: &str) -> Self { Self::Text(s.to_string()) }
}

impl From<String> for SqlValue {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<i64> for SqlValue {
  fn from(i: i64) -> Self { Self::Int(i) }
}

impl From<f64> for SqlValue {
  fn from(f: f64) -> Self { Self::Float(f) }
}

impl From<bool> for SqlValue {
  fn from(b: bool) -> Self { Self::Bool(b) }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// One result row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(BTreeMap<String, SqlValue>);

impl Row {
  pub fn new() -> Self { Self(BTreeMap::new()) }

  pub fn set(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
    self.0.insert(name.into(), value.into());
  }

  pub fn get(&self, name: &str) -> Option<&SqlValue> { self.0.get(name) }

  pub fn text(&self, name: &str) -> Option<&str> {
    self.0.get(name).and_then(SqlValue::as_str)
  }

  pub fn int(&self, name: &str) -> Option<i64> {
    self.0.get(name).and_then(SqlValue::as_i64)
  }

  pub fn float(&self, name: &str) -> Option<f64> {
    self.0.get(name).and_then(SqlValue::as_f64)
  }

  pub fn columns(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

// ─── Bound parameters ────────────────────────────────────────────────────────

/// A named bind parameter with its 1-based ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
  pub ordinal: usize,
  pub name:    String,
  pub value:   SqlValue,
}

/// Bound parameters in first-use order. Positional backends read them by
/// ordinal, named backends by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<Param>);

impl Params {
  pub const fn empty() -> Self { Self(Vec::new()) }

  pub fn iter(&self) -> std::slice::Iter<'_, Param> { self.0.iter() }

  /// Values alone, in ordinal order.
  pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
    self.0.iter().map(|p| &p.value)
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl From<Vec<Param>> for Params {
  fn from(items: Vec<Param>) -> Self { Self(items) }
}

impl<'a> IntoIterator for &'a Params {
  type Item = &'a Param;
  type IntoIter = std::slice::Iter<'a, Param>;

  fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fold_lowercases_text_only() {
    assert_eq!(
      SqlValue::from("Hello@X.Com").fold(),
      SqlValue::Text("hello@x.com".into())
    );
    assert_eq!(SqlValue::Int(42).fold(), SqlValue::Int(42));
  }

  #[test]
  fn from_json_folded_maps_leaf_types() {
    use serde_json::json;

    assert_eq!(SqlValue::from_json_folded(&json!(null)), SqlValue::Null);
    assert_eq!(SqlValue::from_json_folded(&json!(3)), SqlValue::Int(3));
    assert_eq!(SqlValue::from_json_folded(&json!(2.5)), SqlValue::Float(2.5));
    assert_eq!(
      SqlValue::from_json_folded(&json!("ABC")),
      SqlValue::Text("abc".into())
    );
    assert_eq!(SqlValue::from_json_folded(&json!(true)), SqlValue::Bool(true));
  }

  #[test]
  fn row_typed_accessors() {
    let mut row = Row::new();
    row.set("id", "u1");
    row.set("version", 3i64);
    assert_eq!(row.text("id"), Some("u1"));
    assert_eq!(row.int("version"), Some(3));
    assert_eq!(row.text("missing"), None);
  }
}
