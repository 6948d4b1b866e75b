//! The search compiler: validated boolean criteria over declared index
//! columns, joined against the document table.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use satchel_core::{
  Error, Result,
  container::{ContainerMeta, sanitize_name},
  dialect::{SqlBackend, search_table_name},
  document::inject_identity,
  event::StoreEvent,
  params::ParamBuilder,
  parser,
  prune::Pruner,
  query::{Comparison, Query, QueryInput, ReturnType, SearchOptions, SearchResult},
  value::SqlValue,
};
use serde_json::Value;
use tracing::warn;

use crate::{documents::parse_json_column, store::SqlStore};

impl<D: SqlBackend> SqlStore<D> {
  /// Run one search against a container.
  pub async fn search(&self, opts: SearchOptions) -> Result<SearchResult> {
    let container = sanitize_name(&opts.container);
    let meta = self.read_container_meta(&container).await?;
    let b = self.backend();

    let query = match &opts.query {
      QueryInput::All => None,
      QueryInput::Tree(q) => Some(q.clone()),
      QueryInput::Text(text) => Some(parser::parse_query(text, &opts.params)?),
    };

    let mut compiler = Compiler {
      backend:    b,
      container:  &container,
      meta:       &meta,
      params:     ParamBuilder::new(b),
      next_param: 0,
    };
    let criteria = match &query {
      Some(q) => Some(compiler.compile(q)?),
      None => None,
    };

    let id_col = b.quote_ident("id");
    let projection = match opts.return_type {
      ReturnType::Ids => format!("t.{id_col}"),
      ReturnType::Count => "COUNT(*) AS total".to_string(),
      ReturnType::Map | ReturnType::Array => format!(
        "t.{id_col}, t.{}, t.{}",
        b.quote_ident("value"),
        b.quote_ident("version"),
      ),
    };

    let mut sql = format!(
      "SELECT {projection} FROM {} t INNER JOIN {} s ON t.{id_col} = s.{id_col}",
      b.quote_ident(&container),
      b.quote_ident(&search_table_name(&container)),
    );
    if let Some(criteria) = &criteria {
      sql.push_str(" WHERE ");
      sql.push_str(criteria);
    }

    // Unindexed sort keys are dropped, not fatal; pagination needs at
    // least one surviving key to stay portable across dialects.
    let mut order = Vec::new();
    for key in &opts.sort {
      if !meta.is_indexed(&key.prop) {
        warn!(
          container = %container,
          prop = %key.prop,
          "dropping sort key with no index"
        );
        continue;
      }
      let column = match meta.index(&key.prop) {
        Some(def) => def.column_name(),
        None => "id".to_string(),
      };
      order.push(format!(
        "s.{} {}",
        b.quote_ident(&column),
        if key.descending { "DESC" } else { "ASC" },
      ));
    }
    if opts.return_type != ReturnType::Count && !order.is_empty() {
      sql.push_str(" ORDER BY ");
      sql.push_str(&order.join(", "));
      if let Some(limit) = opts.limit {
        sql.push_str(&b.pagination_clause(limit, opts.offset));
      }
    }

    let params = compiler.params.finalize();
    let result = match opts.return_type {
      ReturnType::Count => {
        let row = b.query_one(&sql, &params).await?;
        let total = row.and_then(|r| r.int("total")).unwrap_or(0);
        SearchResult::Count(total.max(0) as u64)
      }
      ReturnType::Ids => SearchResult::Ids(
        b.query_all(&sql, &params)
          .await?
          .iter()
          .filter_map(|r| r.text("id"))
          .map(str::to_string)
          .collect(),
      ),
      ReturnType::Map => {
        let pruner = Pruner::new(&meta, &opts.roles);
        let mut out = BTreeMap::new();
        for row in b.query_all(&sql, &params).await? {
          let Some(id) = row.text("id").map(str::to_string) else {
            continue;
          };
          let mut value = parse_json_column(row.text("value"))?;
          pruner.prune(&mut value);
          if let Some(obj) = value.as_object_mut() {
            obj.insert(
              "version".to_string(),
              Value::from(row.int("version").unwrap_or(1)),
            );
          }
          out.insert(id, value);
        }
        SearchResult::Map(out)
      }
      ReturnType::Array => {
        let pruner = Pruner::new(&meta, &opts.roles);
        let mut out = Vec::new();
        for row in b.query_all(&sql, &params).await? {
          let Some(id) = row.text("id").map(str::to_string) else {
            continue;
          };
          let mut value = parse_json_column(row.text("value"))?;
          pruner.prune(&mut value);
          inject_identity(&mut value, &id, row.int("version").unwrap_or(1));
          out.push(value);
        }
        SearchResult::Array(out)
      }
    };

    self.emit(StoreEvent::Search { container });
    Ok(result)
  }

  /// Run several searches concurrently; results come back in input order.
  pub async fn search_all(
    &self,
    queries: Vec<SearchOptions>,
  ) -> Result<Vec<SearchResult>> {
    try_join_all(queries.into_iter().map(|opts| self.search(opts))).await
  }
}

// ─── Criteria compilation ────────────────────────────────────────────────────

struct Compiler<'a, D: SqlBackend> {
  backend:    &'a D,
  container:  &'a str,
  meta:       &'a ContainerMeta,
  params:     ParamBuilder<'a, D>,
  next_param: usize,
}

impl<D: SqlBackend> Compiler<'_, D> {
  fn compile(&mut self, query: &Query) -> Result<String> {
    match query {
      Query::Cmp(cmp) => self.comparison(cmp),
      Query::And(items) => self.group(items, "&&"),
      Query::Or(items) => self.group(items, "||"),
    }
  }

  fn group(&mut self, items: &[Query], op: &str) -> Result<String> {
    let joiner = format!(" {} ", self.backend.translate_comparator(op));
    let parts = items
      .iter()
      .map(|q| self.compile(q))
      .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", parts.join(&joiner)))
  }

  fn comparison(&mut self, cmp: &Comparison) -> Result<String> {
    // Hard validation: only `id` and declared index paths are queryable.
    let column = if cmp.prop == "id" {
      "id".to_string()
    } else {
      self
        .meta
        .index(&cmp.prop)
        .ok_or_else(|| Error::UnindexedProperty {
          container: self.container.to_string(),
          prop:      cmp.prop.clone(),
        })?
        .column_name()
    };
    let column = format!("s.{}", self.backend.quote_ident(&column));
    let op = self.backend.translate_comparator(&cmp.comparator);

    if matches!(cmp.comparator.as_str(), "in" | "not in") {
      // Membership lists are inlined; their length varies per query, so a
      // single placeholder does not fit.
      let Some(items) = cmp.value.as_array() else {
        return Err(Error::QueryParse(format!(
          "'{}' requires a value list",
          cmp.comparator,
        )));
      };
      let list = items
        .iter()
        .map(inline_literal)
        .collect::<Vec<_>>()
        .join(", ");
      Ok(format!("{column} {op} ({list})"))
    } else {
      self.next_param += 1;
      let name = format!("q{}", self.next_param);
      self.params.add(&name, SqlValue::from_json_folded(&cmp.value));
      Ok(format!("{column} {op} {}", self.params.placeholder(&name)?))
    }
  }
}

/// Render one membership-list element as a SQL literal. Strings fold to
/// lower case with embedded quotes doubled, matching how search columns
/// are populated.
fn inline_literal(value: &Value) -> String {
  match value {
    Value::String(s) => {
      format!("'{}'", s.to_lowercase().replace('\'', "''"))
    }
    other => other.to_string().to_lowercase(),
  }
}
