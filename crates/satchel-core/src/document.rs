//! Document write/read options and identity projection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Generate a time-ordered document id.
pub fn new_document_id() -> String {
  Uuid::now_v7().to_string()
}

/// Attach the storage-managed fields to a value leaving storage.
pub fn inject_identity(value: &mut Value, id: &str, version: i64) {
  if let Some(obj) = value.as_object_mut() {
    obj.insert("version".to_string(), Value::from(version));
    obj.insert("id".to_string(), Value::from(id));
  }
}

/// Remove the storage-managed fields before persisting or diffing.
pub fn strip_identity(value: &mut Value) {
  if let Some(obj) = value.as_object_mut() {
    obj.remove("id");
    obj.remove("version");
  }
}

// ─── Options ─────────────────────────────────────────────────────────────────

/// Caller identity attached to writes for audit stamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
  pub id: String,
}

/// Options for one document write.
#[derive(Debug, Clone)]
pub struct SetOptions {
  pub container:  String,
  pub object:     Value,
  /// Shallow merge: supplied root-level fields replace the stored ones,
  /// everything else is kept. Nested objects are replaced wholesale.
  pub merge:      bool,
  pub auth_token: Option<AuthToken>,
}

impl SetOptions {
  pub fn new(container: impl Into<String>, object: Value) -> Self {
    Self {
      container: container.into(),
      object,
      merge: false,
      auth_token: None,
    }
  }
}

/// Options for one document read.
#[derive(Debug, Clone)]
pub struct GetOptions {
  pub container:       String,
  pub ids:             Vec<String>,
  /// Redact the container's declared sensitive paths (see `roles`).
  pub prune_sensitive: bool,
  pub roles:           Vec<String>,
}

impl GetOptions {
  pub fn new(container: impl Into<String>, ids: Vec<String>) -> Self {
    Self {
      container: container.into(),
      ids,
      prune_sensitive: false,
      roles: Vec::new(),
    }
  }

  pub fn one(container: impl Into<String>, id: impl Into<String>) -> Self {
    Self::new(container, vec![id.into()])
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn identity_round_trip() {
    let mut value = json!({"a": 1});
    inject_identity(&mut value, "u1", 3);
    assert_eq!(value, json!({"a": 1, "id": "u1", "version": 3}));

    strip_identity(&mut value);
    assert_eq!(value, json!({"a": 1}));
  }

  #[test]
  fn generated_ids_are_time_ordered() {
    let a = new_document_id();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = new_document_id();
    assert_ne!(a, b);
    assert!(a < b);
  }
}
