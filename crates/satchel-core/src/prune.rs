//! Role-gated redaction of sensitive fields.

use serde_json::Value;

use crate::{container::ContainerMeta, path};

/// Callers holding this role see sensitive fields unredacted.
pub const BYPASS_ROLE: &str = "admin";

/// Removes a container's declared sensitive paths from documents before
/// they are returned.
#[derive(Debug, Clone)]
pub struct Pruner {
  paths:  Vec<String>,
  active: bool,
}

impl Pruner {
  pub fn new(meta: &ContainerMeta, roles: &[String]) -> Self {
    let active = !meta.sensitive.is_empty()
      && !roles.iter().any(|r| r == BYPASS_ROLE);
    Self { paths: meta.sensitive.clone(), active }
  }

  /// Whether redaction applies for this container/caller combination.
  pub fn is_active(&self) -> bool { self.active }

  /// Strip the sensitive paths in place.
  pub fn prune(&self, value: &mut Value) {
    if !self.active {
      return;
    }
    for p in &self.paths {
      path::remove(value, p);
    }
  }
}
