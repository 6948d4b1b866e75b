//! [`SqliteBackend`] — the SQLite dialect and connection.

use std::path::Path;

use satchel_core::{
  Error, Result,
  dialect::{ColumnInfo, ColumnTypes, SqlBackend, SqlDialect},
  value::{Params, Row, SqlValue},
};
use tracing::debug;

use crate::config::SqliteConfig;

/// A satchel backend over one SQLite database.
///
/// Cloning is cheap — the inner connection is reference-counted and all
/// statements are serialized onto its worker thread, which doubles as the
/// write lock SQLite wants anyway.
#[derive(Clone)]
pub struct SqliteBackend {
  conn: tokio_rusqlite::Connection,
}

impl SqliteBackend {
  /// Open (or create) a database file.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn =
      tokio_rusqlite::Connection::open(path).await.map_err(Error::backend)?;
    Ok(Self { conn })
  }

  /// Open an in-memory database — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory()
      .await
      .map_err(Error::backend)?;
    Ok(Self { conn })
  }

  pub async fn from_config(config: &SqliteConfig) -> Result<Self> {
    Self::open(&config.path).await
  }

  async fn with_statement<T>(
    &self,
    sql: &str,
    params: &Params,
    f: impl FnOnce(&mut rusqlite::Statement<'_>) -> rusqlite::Result<T>
    + Send
    + 'static,
  ) -> Result<T>
  where
    T: Send + 'static,
  {
    let sql = sql.to_string();
    let bindings: Vec<(String, rusqlite::types::Value)> = params
      .iter()
      .map(|p| (format!(":{}", p.name), encode(&p.value)))
      .collect();
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        // Bind by name before the caller runs the statement; parameters a
        // statement does not reference are skipped.
        for (name, value) in &bindings {
          if let Some(index) = stmt.parameter_index(name)? {
            stmt.raw_bind_parameter(index, value)?;
          }
        }
        Ok(f(&mut stmt)?)
      })
      .await
      .map_err(Error::backend)
  }
}

fn encode(value: &SqlValue) -> rusqlite::types::Value {
  use rusqlite::types::Value as V;
  match value {
    SqlValue::Null => V::Null,
    SqlValue::Int(i) => V::Integer(*i),
    SqlValue::Float(f) => V::Real(*f),
    SqlValue::Text(s) => V::Text(s.clone()),
    SqlValue::Bool(b) => V::Integer(i64::from(*b)),
  }
}

fn decode(value: rusqlite::types::Value) -> SqlValue {
  use rusqlite::types::Value as V;
  match value {
    V::Null => SqlValue::Null,
    V::Integer(i) => SqlValue::Int(i),
    V::Real(f) => SqlValue::Float(f),
    V::Text(s) => SqlValue::Text(s),
    // The engine never writes blobs.
    V::Blob(_) => SqlValue::Null,
  }
}

fn decode_rows(stmt: &mut rusqlite::Statement<'_>) -> rusqlite::Result<Vec<Row>> {
  let columns: Vec<String> =
    stmt.column_names().iter().map(|c| c.to_string()).collect();
  let mut rows = stmt.raw_query();
  let mut out = Vec::new();
  while let Some(row) = rows.next()? {
    let mut decoded = Row::new();
    for (i, name) in columns.iter().enumerate() {
      decoded.set(name, decode(row.get::<_, rusqlite::types::Value>(i)?));
    }
    out.push(decoded);
  }
  Ok(out)
}

impl SqlDialect for SqliteBackend {
  fn quote_ident(&self, name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
  }

  fn placeholder(&self, _ordinal: usize, name: &str) -> String {
    format!(":{name}")
  }

  fn pagination_clause(&self, limit: u64, offset: Option<u64>) -> String {
    match offset {
      Some(offset) => format!(" LIMIT {limit} OFFSET {offset}"),
      None => format!(" LIMIT {limit}"),
    }
  }

  fn column_types(&self) -> ColumnTypes {
    ColumnTypes {
      small_text:      "TEXT",
      large_text:      "TEXT",
      searchable_text: "TEXT",
      int:             "INTEGER",
      float:           "REAL",
      auto_pk:         "INTEGER PRIMARY KEY AUTOINCREMENT",
    }
  }
}

impl SqlBackend for SqliteBackend {
  async fn execute(&self, sql: &str, params: &Params) -> Result<u64> {
    debug!(sql, "execute");
    self
      .with_statement(sql, params, |stmt| Ok(stmt.raw_execute()? as u64))
      .await
  }

  async fn query_one(&self, sql: &str, params: &Params) -> Result<Option<Row>> {
    debug!(sql, "query_one");
    let rows = self.with_statement(sql, params, decode_rows).await?;
    Ok(rows.into_iter().next())
  }

  async fn query_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
    debug!(sql, "query_all");
    self.with_statement(sql, params, decode_rows).await
  }

  async fn table_exists(&self, name: &str) -> Result<bool> {
    let name = name.to_string();
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )?;
        Ok(stmt.exists(rusqlite::params![name])?)
      })
      .await
      .map_err(Error::backend)
  }

  async fn list_user_tables(&self) -> Result<Vec<String>> {
    self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT name FROM sqlite_master
           WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )?;
        let names = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
      })
      .await
      .map_err(Error::backend)
  }

  async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
    let table = table.to_string();
    self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
        let columns = stmt
          .query_map(rusqlite::params![table], |row| {
            Ok(ColumnInfo { name: row.get(0)?, data_type: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
      })
      .await
      .map_err(Error::backend)
  }

  async fn close(&self) -> Result<()> {
    self.conn.clone().close().await.map_err(Error::backend)
  }
}
