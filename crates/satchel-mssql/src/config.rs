//! Environment-driven configuration for the SQL Server backend.

use satchel_core::{Error, Result};
use serde::Deserialize;

/// Settings for [`crate::MssqlBackend`], loaded from `SATCHEL_MSSQL_*`
/// environment variables (e.g. `SATCHEL_MSSQL_HOST`, `SATCHEL_MSSQL_USER`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MssqlConfig {
  pub host:     String,
  pub port:     u16,
  pub user:     String,
  pub password: String,
  pub dbname:   String,
}

impl Default for MssqlConfig {
  fn default() -> Self {
    Self {
      host:     "localhost".to_string(),
      port:     1433,
      user:     "sa".to_string(),
      password: String::new(),
      dbname:   "satchel".to_string(),
    }
  }
}

impl MssqlConfig {
  pub fn from_env() -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::Environment::with_prefix("SATCHEL_MSSQL"))
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
    Ok(loaded)
  }
}
