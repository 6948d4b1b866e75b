//! Environment-driven configuration for the SQLite backend.

use satchel_core::{Error, Result};
use serde::Deserialize;

/// Settings for [`crate::SqliteBackend`], loaded from `SATCHEL_SQLITE_*`
/// environment variables (e.g. `SATCHEL_SQLITE_PATH=/var/lib/satchel.db`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
  pub path: String,
}

impl Default for SqliteConfig {
  fn default() -> Self {
    Self { path: "satchel.db".to_string() }
  }
}

impl SqliteConfig {
  pub fn from_env() -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::Environment::with_prefix("SATCHEL_SQLITE"))
      .build()
      .map_err(Error::backend)?;
    let mut loaded = Self::default();
    if let Ok(path) = settings.get_string("path") {
      loaded.path = path;
    }
    Ok(loaded)
  }
}
