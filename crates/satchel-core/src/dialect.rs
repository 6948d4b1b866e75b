//! The contract a relational backend implements to host the store.
//!
//! [`SqlDialect`] covers synchronous formatting concerns (quoting,
//! placeholders, comparator translation); [`SqlBackend`] adds the async I/O
//! surface plus provided DDL methods composed from the dialect's column
//! types. The engine is generic over `SqlBackend` and never names a concrete
//! driver.

use crate::{
  Result,
  value::{Params, Row},
};

/// The search table paired with a container table.
pub fn search_table_name(container: &str) -> String {
  format!("{container}_search")
}

// ─── Formatting ──────────────────────────────────────────────────────────────

/// DDL type names for the handful of column shapes the engine creates.
#[derive(Debug, Clone, Copy)]
pub struct ColumnTypes {
  /// Ids, container names, timestamps.
  pub small_text:      &'static str,
  /// Document values, change payloads, index/sensitive declarations.
  pub large_text:      &'static str,
  /// Search columns — must stay within the dialect's index key limit.
  pub searchable_text: &'static str,
  pub int:             &'static str,
  pub float:           &'static str,
  /// Auto-incrementing primary key for the change log.
  pub auto_pk:         &'static str,
}

/// Synchronous formatting concerns of one SQL dialect.
pub trait SqlDialect: Send + Sync {
  /// Quote an identifier for this dialect.
  fn quote_ident(&self, name: &str) -> String;

  /// The in-SQL placeholder for a bind parameter. Positional dialects use
  /// `ordinal` (1-based), named dialects use `name`.
  fn placeholder(&self, ordinal: usize, name: &str) -> String;

  /// Map portable comparator tokens onto this dialect's operators.
  /// Unrecognized tokens pass through unchanged, which is how extensions
  /// such as `in` reach the SQL text.
  fn translate_comparator(&self, op: &str) -> String {
    match op {
      "==" | "===" => "=".to_string(),
      "!=" => "<>".to_string(),
      "&&" => "AND".to_string(),
      "||" => "OR".to_string(),
      other => other.to_string(),
    }
  }

  /// The pagination fragment appended after an ORDER BY clause.
  fn pagination_clause(&self, limit: u64, offset: Option<u64>) -> String;

  fn column_types(&self) -> ColumnTypes;
}

// ─── Connected backend ───────────────────────────────────────────────────────

/// A column as reported by backend introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
  pub name:      String,
  pub data_type: String,
}

/// The async surface of a connected backend.
///
/// Beyond raw statement execution, a backend supplies table/column
/// introspection; the DDL operations below have provided bodies built from
/// [`SqlDialect::column_types`] and only need overriding where a dialect
/// deviates from the common syntax.
pub trait SqlBackend: SqlDialect {
  /// Run a statement, returning the number of rows affected.
  async fn execute(&self, sql: &str, params: &Params) -> Result<u64>;

  /// Run a query expected to produce at most one row.
  async fn query_one(&self, sql: &str, params: &Params) -> Result<Option<Row>>;

  /// Run a query, returning every row.
  async fn query_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>>;

  async fn table_exists(&self, name: &str) -> Result<bool>;

  /// Every user-created table, excluding the dialect's own bookkeeping.
  async fn list_user_tables(&self) -> Result<Vec<String>>;

  async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

  /// Release the connection or pool.
  async fn close(&self) -> Result<()>;

  /// Create the registry and change-log tables if the registry is absent.
  async fn ensure_base_schema(&self) -> Result<()> {
    if self.table_exists("schema").await? {
      return Ok(());
    }
    let t = self.column_types();

    // One statement per call; sqlite will not run these batched.
    let schema = self.quote_ident("schema");
    let sql = format!(
      "CREATE TABLE {schema} ({} {} NOT NULL, {} {}, {} {}, {} {})",
      self.quote_ident("container"),
      t.small_text,
      self.quote_ident("indexes"),
      t.large_text,
      self.quote_ident("sensitive"),
      t.large_text,
      self.quote_ident("updated"),
      t.small_text,
    );
    self.execute(&sql, &Params::empty()).await?;

    let sql = format!(
      "CREATE UNIQUE INDEX idx_schema_container ON {schema} ({})",
      self.quote_ident("container"),
    );
    self.execute(&sql, &Params::empty()).await?;

    let sql = format!(
      "CREATE TABLE {} ({} {}, {} {} NOT NULL, {} {}, {} {} NOT NULL, {} {})",
      self.quote_ident("changes"),
      self.quote_ident("change_id"),
      t.auto_pk,
      self.quote_ident("container"),
      t.small_text,
      self.quote_ident("id"),
      t.small_text,
      self.quote_ident("change"),
      t.large_text,
      self.quote_ident("timestamp"),
      t.small_text,
    );
    self.execute(&sql, &Params::empty()).await?;
    Ok(())
  }

  /// Create a container's document table.
  async fn create_document_table(&self, name: &str) -> Result<()> {
    let t = self.column_types();
    let sql = format!(
      "CREATE TABLE {} ({} {} NOT NULL PRIMARY KEY, {} {}, {} {}, {} {})",
      self.quote_ident(name),
      self.quote_ident("id"),
      t.small_text,
      self.quote_ident("value"),
      t.large_text,
      self.quote_ident("meta"),
      t.large_text,
      self.quote_ident("version"),
      t.int,
    );
    self.execute(&sql, &Params::empty()).await?;
    Ok(())
  }

  /// Create a search table with only its id column; index columns are added
  /// by reconciliation.
  async fn create_search_table(&self, name: &str) -> Result<()> {
    let t = self.column_types();
    let sql = format!(
      "CREATE TABLE {} ({} {} NOT NULL PRIMARY KEY)",
      self.quote_ident(name),
      self.quote_ident("id"),
      t.small_text,
    );
    self.execute(&sql, &Params::empty()).await?;
    Ok(())
  }

  async fn add_column(
    &self,
    table: &str,
    column: &str,
    ddl_type: &str,
  ) -> Result<()> {
    let sql = format!(
      "ALTER TABLE {} ADD COLUMN {} {}",
      self.quote_ident(table),
      self.quote_ident(column),
      ddl_type,
    );
    self.execute(&sql, &Params::empty()).await?;
    Ok(())
  }

  async fn drop_column(&self, table: &str, column: &str) -> Result<()> {
    let sql = format!(
      "ALTER TABLE {} DROP COLUMN {}",
      self.quote_ident(table),
      self.quote_ident(column),
    );
    self.execute(&sql, &Params::empty()).await?;
    Ok(())
  }

  /// Create the database index backing one search column.
  async fn create_column_index(&self, table: &str, column: &str) -> Result<()> {
    let sql = format!(
      "CREATE INDEX {} ON {} ({})",
      self.quote_ident(&format!("idx_{table}_{column}")),
      self.quote_ident(table),
      self.quote_ident(column),
    );
    self.execute(&sql, &Params::empty()).await?;
    Ok(())
  }

  async fn drop_table(&self, name: &str) -> Result<()> {
    let sql = format!("DROP TABLE IF EXISTS {}", self.quote_ident(name));
    self.execute(&sql, &Params::empty()).await?;
    Ok(())
  }
}
