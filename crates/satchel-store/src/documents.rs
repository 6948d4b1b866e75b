//! Document CRUD: reads with identity projection, optimistic writes, and
//! deletes.

use satchel_core::{
  Error, Result,
  change::ChangeRecord,
  container::sanitize_name,
  dialect::{SqlBackend, search_table_name},
  diff,
  document::{GetOptions, SetOptions, inject_identity, new_document_id},
  event::StoreEvent,
  params::ParamBuilder,
  prune::Pruner,
  time::now_stamp,
  value::Params,
};
use serde_json::Value;
use tracing::debug;

use crate::store::SqlStore;

/// CAS attempts per update before surfacing a hard failure.
const MAX_SET_ATTEMPTS: u32 = 3;

/// Storage-managed fields, projected on read and stripped on write.
const META_FIELDS: [&str; 4] = ["created", "created_by", "updated", "updated_by"];

/// A document row as stored: value and meta already parsed, identity still
/// outside the value.
pub(crate) struct StoredDocument {
  pub value:   Value,
  pub meta:    Value,
  pub version: i64,
}

pub(crate) fn parse_json_column(text: Option<&str>) -> Result<Value> {
  match text {
    Some(s) if !s.is_empty() => Ok(serde_json::from_str(s)?),
    _ => Ok(Value::Object(serde_json::Map::new())),
  }
}

fn strip_managed_fields(value: &mut Value) {
  satchel_core::document::strip_identity(value);
  if let Some(obj) = value.as_object_mut() {
    for field in META_FIELDS {
      obj.remove(field);
    }
  }
}

fn project_meta(value: &mut Value, meta: &Value) {
  let (Some(obj), Some(meta)) = (value.as_object_mut(), meta.as_object())
  else {
    return;
  };
  for field in META_FIELDS {
    if let Some(v) = meta.get(field) {
      obj.insert(field.to_string(), v.clone());
    }
  }
}

/// Ids acceptable to the batched `IN (...)` lookup, which inlines its list.
fn sanitize_ids(ids: &[String]) -> Vec<String> {
  ids
    .iter()
    .filter(|id| !id.is_empty() && id.len() <= 50 && !id.contains('\''))
    .map(|id| id.to_lowercase())
    .collect()
}

impl<D: SqlBackend> SqlStore<D> {
  /// Fetch one document, or `None` if absent.
  pub async fn get_one(
    &self,
    container: &str,
    id: &str,
    prune_sensitive: bool,
    roles: &[String],
  ) -> Result<Option<Value>> {
    let mut opts = GetOptions::one(container, id);
    opts.prune_sensitive = prune_sensitive;
    opts.roles = roles.to_vec();
    Ok(self.get(opts).await?.into_iter().next())
  }

  /// Fetch documents by id. Missing ids are simply absent from the result.
  pub async fn get(&self, opts: GetOptions) -> Result<Vec<Value>> {
    let container = sanitize_name(&opts.container);
    let b = self.backend();

    let mut documents = Vec::new();
    if let [id] = opts.ids.as_slice() {
      if let Some(doc) = self.fetch_row(&container, id).await? {
        documents.push(assemble(doc, id));
      }
    } else {
      let ids = sanitize_ids(&opts.ids);
      if !ids.is_empty() {
        let list = ids
          .iter()
          .map(|id| format!("'{id}'"))
          .collect::<Vec<_>>()
          .join(", ");
        let sql = format!(
          "SELECT {}, {}, {}, {} FROM {} WHERE {} IN ({list})",
          b.quote_ident("id"),
          b.quote_ident("value"),
          b.quote_ident("meta"),
          b.quote_ident("version"),
          b.quote_ident(&container),
          b.quote_ident("id"),
        );
        for row in b.query_all(&sql, &Params::empty()).await? {
          let Some(id) = row.text("id").map(str::to_string) else {
            continue;
          };
          let doc = StoredDocument {
            value:   parse_json_column(row.text("value"))?,
            meta:    parse_json_column(row.text("meta"))?,
            version: row.int("version").unwrap_or(1),
          };
          documents.push(assemble(doc, &id));
        }
      }
    }

    if opts.prune_sensitive {
      let meta = self.read_container_meta(&container).await?;
      let pruner = Pruner::new(&meta, &opts.roles);
      for doc in &mut documents {
        pruner.prune(doc);
      }
    }

    self.emit(StoreEvent::Get { container, ids: opts.ids });
    Ok(documents)
  }

  /// Insert or update one document and rebuild its search row.
  ///
  /// Updates are a compare-and-swap on `version`: on a conflict the current
  /// row is re-read and the write retried, [`MAX_SET_ATTEMPTS`] times in
  /// total.
  pub async fn set(&self, opts: SetOptions) -> Result<Value> {
    self.set_tracked(opts, true).await
  }

  pub(crate) async fn set_tracked(
    &self,
    opts: SetOptions,
    track: bool,
  ) -> Result<Value> {
    let container = sanitize_name(&opts.container);
    let meta = self.read_container_meta(&container).await?;
    let b = self.backend();

    let mut object = opts.object;
    let id = match object.get("id").and_then(Value::as_str) {
      Some(id) => id.to_string(),
      None => new_document_id(),
    };
    strip_managed_fields(&mut object);
    let actor = opts.auth_token.map(|t| t.id);

    let mut attempts = 0u32;
    let (version, value) = loop {
      attempts += 1;
      let Some(current) = self.fetch_row(&container, &id).await? else {
        // Insert path: version starts at 1.
        let stamp = now_stamp();
        let mut doc_meta = serde_json::Map::new();
        doc_meta.insert("created".to_string(), Value::from(stamp.clone()));
        doc_meta.insert("updated".to_string(), Value::from(stamp));
        if let Some(actor) = &actor {
          doc_meta.insert("created_by".to_string(), Value::from(actor.clone()));
        }

        let mut p = ParamBuilder::new(b);
        p.add("id", id.as_str())
          .add("value", serde_json::to_string(&object)?)
          .add("meta", serde_json::to_string(&doc_meta)?)
          .add("version", 1i64);
        let sql = format!(
          "INSERT INTO {} ({}, {}, {}, {}) VALUES ({}, {}, {}, {})",
          b.quote_ident(&container),
          b.quote_ident("id"),
          b.quote_ident("value"),
          b.quote_ident("meta"),
          b.quote_ident("version"),
          p.placeholder("id")?,
          p.placeholder("value")?,
          p.placeholder("meta")?,
          p.placeholder("version")?,
        );
        b.execute(&sql, &p.finalize()).await?;

        if track {
          let mut logged = object.clone();
          if let Some(obj) = logged.as_object_mut() {
            obj.insert("id".to_string(), Value::from(id.clone()));
          }
          self
            .append_change(&ChangeRecord::ObjectAdd {
              container: container.clone(),
              value:     logged,
            })
            .await?;
        }
        break (1, object);
      };

      let mut new_value = if opts.merge {
        let mut merged = current.value.clone();
        if let (Some(dst), Some(src)) =
          (merged.as_object_mut(), object.as_object())
        {
          for (key, v) in src {
            dst.insert(key.clone(), v.clone());
          }
        }
        merged
      } else {
        object.clone()
      };
      strip_managed_fields(&mut new_value);

      let mut doc_meta = match current.meta {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
      };
      doc_meta.insert("updated".to_string(), Value::from(now_stamp()));
      if let Some(actor) = &actor {
        doc_meta.insert("updated_by".to_string(), Value::from(actor.clone()));
      }

      let next = current.version + 1;
      let mut p = ParamBuilder::new(b);
      p.add("value", serde_json::to_string(&new_value)?)
        .add("meta", serde_json::to_string(&doc_meta)?)
        .add("version", next)
        .add("id", id.as_str())
        .add("expected", current.version);
      let sql = format!(
        "UPDATE {} SET {} = {}, {} = {}, {} = {} WHERE {} = {} AND {} = {}",
        b.quote_ident(&container),
        b.quote_ident("value"),
        p.placeholder("value")?,
        b.quote_ident("meta"),
        p.placeholder("meta")?,
        b.quote_ident("version"),
        p.placeholder("version")?,
        b.quote_ident("id"),
        p.placeholder("id")?,
        b.quote_ident("version"),
        p.placeholder("expected")?,
      );

      if b.execute(&sql, &p.finalize()).await? > 0 {
        if track {
          let ops = diff::diff(&current.value, &new_value);
          if !ops.is_empty() {
            self
              .append_change(&ChangeRecord::ObjectUpdate {
                container: container.clone(),
                id:        id.clone(),
                changes:   ops,
              })
              .await?;
          }
        }
        break (next, new_value);
      }

      if attempts >= MAX_SET_ATTEMPTS {
        return Err(Error::OptimisticUpdateExhausted {
          container,
          id,
          attempts,
        });
      }
      debug!(
        container = %container,
        id = %id,
        attempt = attempts,
        "version conflict, retrying"
      );
    };

    self.rebuild_search_row(&container, &meta.indexes, &id, &value).await?;

    let mut result = value;
    inject_identity(&mut result, &id, version);
    self.emit(StoreEvent::Set { container, id, version });
    Ok(result)
  }

  /// Delete one document (and its search row, when the container declares
  /// indexes). Fails if the container was never declared or the document
  /// is absent.
  pub async fn del(&self, container: &str, id: &str) -> Result<()> {
    self.del_tracked(container, id, true).await
  }

  pub(crate) async fn del_tracked(
    &self,
    container: &str,
    id: &str,
    track: bool,
  ) -> Result<()> {
    let container = sanitize_name(container);
    let Some(meta) = self.registry_row(&container).await? else {
      return Err(Error::ContainerNotFound(container));
    };
    if self.fetch_row(&container, id).await?.is_none() {
      return Err(Error::ItemNotFound { container, id: id.to_string() });
    }

    let b = self.backend();
    let mut p = ParamBuilder::new(b);
    p.add("id", id);
    let ph = p.placeholder("id")?;
    let params = p.finalize();

    let sql = format!(
      "DELETE FROM {} WHERE {} = {ph}",
      b.quote_ident(&container),
      b.quote_ident("id"),
    );
    b.execute(&sql, &params).await?;

    if !meta.indexes.is_empty() {
      let sql = format!(
        "DELETE FROM {} WHERE {} = {ph}",
        b.quote_ident(&search_table_name(&container)),
        b.quote_ident("id"),
      );
      b.execute(&sql, &params).await?;
    }

    if track {
      self
        .append_change(&ChangeRecord::ObjectDelete {
          container: container.clone(),
          id:        id.to_string(),
        })
        .await?;
    }
    self.emit(StoreEvent::Delete { container, id: id.to_string() });
    Ok(())
  }

  pub(crate) async fn fetch_row(
    &self,
    container: &str,
    id: &str,
  ) -> Result<Option<StoredDocument>> {
    let b = self.backend();
    let mut p = ParamBuilder::new(b);
    p.add("id", id);
    let sql = format!(
      "SELECT {}, {}, {} FROM {} WHERE {} = {}",
      b.quote_ident("value"),
      b.quote_ident("meta"),
      b.quote_ident("version"),
      b.quote_ident(container),
      b.quote_ident("id"),
      p.placeholder("id")?,
    );
    let Some(row) = b.query_one(&sql, &p.finalize()).await? else {
      return Ok(None);
    };
    Ok(Some(StoredDocument {
      value:   parse_json_column(row.text("value"))?,
      meta:    parse_json_column(row.text("meta"))?,
      version: row.int("version").unwrap_or(1),
    }))
  }
}

/// A stored row as callers see it: identity and audit stamps projected
/// into the value.
fn assemble(doc: StoredDocument, id: &str) -> Value {
  let mut value = doc.value;
  project_meta(&mut value, &doc.meta);
  inject_identity(&mut value, id, doc.version);
  value
}
