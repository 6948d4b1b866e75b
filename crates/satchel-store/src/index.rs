//! Search-table maintenance: column reconciliation and per-document
//! projection.

use std::collections::BTreeSet;

use satchel_core::{
  Result,
  container::{IndexDef, IndexType},
  dialect::{SqlBackend, search_table_name},
  event::StoreEvent,
  params::ParamBuilder,
  value::{Params, SqlValue},
};
use serde_json::Value;
use tracing::{debug, info};

use crate::{documents::parse_json_column, store::SqlStore};

/// The search-column value for one declared path of one document. Absent
/// paths project as an empty string for text columns and NULL for numeric
/// ones, so typed backends accept the row.
pub(crate) fn project_index(def: &IndexDef, value: &Value) -> SqlValue {
  match satchel_core::path::get(value, &def.path) {
    Some(v) if !v.is_null() => SqlValue::from_json_folded(v),
    _ => match def.data_type {
      IndexType::Number => SqlValue::Null,
      IndexType::String => SqlValue::Text(String::new()),
    },
  }
}

impl<D: SqlBackend> SqlStore<D> {
  /// Bring the physical search table in line with the declared indexes:
  /// create it if missing, add and index new columns, drop surplus ones,
  /// and backfill added columns from the existing documents.
  pub(crate) async fn reconcile_indexes(
    &self,
    container: &str,
    indexes: &[IndexDef],
  ) -> Result<()> {
    let b = self.backend();
    let table = search_table_name(container);

    let fresh = !b.table_exists(&table).await?;
    if fresh {
      info!(container, "creating search table");
      b.create_search_table(&table).await?;
    }

    let existing: Vec<String> = b
      .list_columns(&table)
      .await?
      .into_iter()
      .map(|c| c.name)
      .collect();

    // `id` is the join key, never a projected column.
    let declared: Vec<&IndexDef> =
      indexes.iter().filter(|d| d.column_name() != "id").collect();

    let types = b.column_types();
    let mut added = Vec::new();
    for def in &declared {
      let column = def.column_name();
      if existing.iter().any(|c| *c == column) {
        continue;
      }
      let ddl_type = match def.data_type {
        IndexType::Number => types.float,
        IndexType::String => types.searchable_text,
      };
      debug!(container, column = %column, "adding search column");
      b.add_column(&table, &column, ddl_type).await?;
      b.create_column_index(&table, &column).await?;
      added.push((*def).clone());
    }

    let required: BTreeSet<String> = std::iter::once("id".to_string())
      .chain(declared.iter().map(|d| d.column_name()))
      .collect();
    for column in &existing {
      if !required.contains(column) {
        debug!(container, column = %column, "dropping search column");
        b.drop_column(&table, column).await?;
      }
    }

    if !added.is_empty() {
      self.populate_columns(container, &table, &added, fresh).await?;
      self.emit(StoreEvent::CreateIndexes {
        container: container.to_string(),
        columns:   added.iter().map(IndexDef::column_name).collect(),
      });
    }
    Ok(())
  }

  /// Backfill newly added columns from every document in the container.
  async fn populate_columns(
    &self,
    container: &str,
    table: &str,
    added: &[IndexDef],
    fresh: bool,
  ) -> Result<()> {
    let b = self.backend();
    let sql = format!(
      "SELECT {}, {} FROM {}",
      b.quote_ident("id"),
      b.quote_ident("value"),
      b.quote_ident(container),
    );
    for row in b.query_all(&sql, &Params::empty()).await? {
      let Some(id) = row.text("id") else { continue };
      let value = parse_json_column(row.text("value"))?;
      self.upsert_search_columns(table, added, id, &value, fresh).await?;
    }
    Ok(())
  }

  /// Recompute the full search row for one document against the current
  /// index declarations. Runs after every successful insert or update.
  pub(crate) async fn rebuild_search_row(
    &self,
    container: &str,
    indexes: &[IndexDef],
    id: &str,
    value: &Value,
  ) -> Result<()> {
    if indexes.is_empty() {
      return Ok(());
    }
    self
      .upsert_search_columns(
        &search_table_name(container),
        indexes,
        id,
        value,
        false,
      )
      .await
  }

  /// Write the projected columns for one id: insert directly into a fresh
  /// table, otherwise update and fall back to insert on zero rows affected
  /// (which also covers the first write after a container gains indexes).
  async fn upsert_search_columns(
    &self,
    table: &str,
    defs: &[IndexDef],
    id: &str,
    value: &Value,
    fresh: bool,
  ) -> Result<()> {
    let b = self.backend();
    let defs: Vec<&IndexDef> =
      defs.iter().filter(|d| d.column_name() != "id").collect();

    let mut p = ParamBuilder::new(b);
    p.add("id", id);
    for def in &defs {
      p.add(&def.column_name(), project_index(def, value));
    }

    if !fresh {
      let assignments = defs
        .iter()
        .map(|def| {
          let column = def.column_name();
          Ok(format!(
            "{} = {}",
            b.quote_ident(&column),
            p.placeholder(&column)?,
          ))
        })
        .collect::<Result<Vec<_>>>()?
        .join(", ");
      let sql = format!(
        "UPDATE {} SET {assignments} WHERE {} = {}",
        b.quote_ident(table),
        b.quote_ident("id"),
        p.placeholder("id")?,
      );
      if b.execute(&sql, &p.finalize()).await? > 0 {
        return Ok(());
      }
    }

    let mut columns = vec![b.quote_ident("id")];
    let mut placeholders = vec![p.placeholder("id")?];
    for def in &defs {
      let column = def.column_name();
      columns.push(b.quote_ident(&column));
      placeholders.push(p.placeholder(&column)?);
    }
    let sql = format!(
      "INSERT INTO {} ({}) VALUES ({})",
      b.quote_ident(table),
      columns.join(", "),
      placeholders.join(", "),
    );
    b.execute(&sql, &p.finalize()).await?;
    Ok(())
  }
}
