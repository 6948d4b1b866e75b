//! Container declarations and registry metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalize a caller-supplied table name: lower-cased and restricted to
/// `[a-z0-9_]`.
pub fn sanitize_name(name: &str) -> String {
  name
    .chars()
    .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
    .collect::<String>()
    .to_lowercase()
}

// ─── Index declarations ──────────────────────────────────────────────────────

/// The value shape a search column is typed as.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
  #[default]
  String,
  Number,
}

/// A dotted document path projected into a physical search-table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
  pub path:      String,
  #[serde(default, rename = "dataType")]
  pub data_type: IndexType,
}

impl IndexDef {
  pub fn string(path: impl Into<String>) -> Self {
    Self { path: path.into(), data_type: IndexType::String }
  }

  pub fn number(path: impl Into<String>) -> Self {
    Self { path: path.into(), data_type: IndexType::Number }
  }

  /// The physical search-table column for this path. Every dot becomes an
  /// underscore so a nested path stays addressable as one column.
  pub fn column_name(&self) -> String {
    sanitize_name(&self.path.replace('.', "_"))
  }

  /// Path segments for descending a document.
  pub fn segments(&self) -> impl Iterator<Item = &str> {
    self.path.split('.')
  }
}

// ─── Registry metadata ───────────────────────────────────────────────────────

/// What the registry knows about one container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMeta {
  pub name:      String,
  #[serde(default)]
  pub indexes:   Vec<IndexDef>,
  #[serde(default)]
  pub sensitive: Vec<String>,
}

impl ContainerMeta {
  /// Declared-empty metadata for a container with no registry row.
  pub fn empty(name: impl Into<String>) -> Self {
    Self { name: name.into(), indexes: Vec::new(), sensitive: Vec::new() }
  }

  /// Whether `prop` may appear in query predicates and sorts. `id` is
  /// always available.
  pub fn is_indexed(&self, prop: &str) -> bool {
    prop == "id" || self.indexes.iter().any(|i| i.path == prop)
  }

  /// The declared index whose path is `prop`.
  pub fn index(&self, prop: &str) -> Option<&IndexDef> {
    self.indexes.iter().find(|i| i.path == prop)
  }
}

// ─── Declarations ────────────────────────────────────────────────────────────

/// A container declaration passed to `set_container`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerDef {
  pub name:      String,
  pub indexes:   Vec<IndexDef>,
  pub sensitive: Vec<String>,
  /// Documents seeded on creation, written without individual change
  /// records — the container-set record carries them.
  pub objects:   Vec<Value>,
  /// Drop and re-create the container before applying this declaration.
  pub recreate:  bool,
  /// Drop the container instead of declaring it.
  pub delete:    bool,
}

impl ContainerDef {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Self::default() }
  }

  pub fn with_index(mut self, index: IndexDef) -> Self {
    self.indexes.push(index);
    self
  }

  pub fn with_sensitive(mut self, path: impl Into<String>) -> Self {
    self.sensitive.push(path.into());
    self
  }
}
