//! Environment-driven configuration for the PostgreSQL backend.

use satchel_core::{Error, Result};
use serde::Deserialize;

/// Settings for [`crate::PostgresBackend`], loaded from `SATCHEL_PG_*`
/// environment variables (e.g. `SATCHEL_PG_HOST`, `SATCHEL_PG_DBNAME`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
  pub host:      String,
  pub port:      u16,
  pub user:      String,
  pub password:  String,
  pub dbname:    String,
  pub pool_size: usize,
}

impl Default for PostgresConfig {
  fn default() -> Self {
    Self {
      host:      "localhost".to_string(),
      port:      5432,
      user:      "postgres".to_string(),
      password:  String::new(),
      dbname:    "satchel".to_string(),
      pool_size: 20,
    }
  }
}

impl PostgresConfig {
  pub fn from_env() -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::Environment::with_prefix("SATCHEL_PG"))
      .build()
      .map_err(Error::backend)?;
    let mut loaded = Self::default();
    if let Ok(host) = settings.get_string("host") {
      loaded.host = host;
    }
    if let Ok(port) = settings.get_int("port") {
      loaded.port = port as u16;
    }
    if let Ok(user) = settings.get_string("user") {
      loaded.user = user;
    }
    if let Ok(password) = settings.get_string("password") {
      loaded.password = password;
    }
    if let Ok(dbname) = settings.get_string("dbname") {
      loaded.dbname = dbname;
    }
    if let Ok(size) = settings.get_int("pool_size") {
      loaded.pool_size = size as usize;
    }
    Ok(loaded)
  }
}
