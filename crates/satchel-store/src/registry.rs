//! Container declarations and the `schema` registry table.

use satchel_core::{
  Result,
  change::ChangeRecord,
  container::{ContainerDef, ContainerMeta, IndexDef, sanitize_name},
  dialect::{SqlBackend, search_table_name},
  document::SetOptions,
  event::StoreEvent,
  params::ParamBuilder,
  time::now_stamp,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::store::SqlStore;

impl<D: SqlBackend> SqlStore<D> {
  /// The registry's view of a container. A container that was never
  /// declared yields empty metadata, not an error.
  pub async fn get_container(&self, name: &str) -> Result<ContainerMeta> {
    let name = sanitize_name(name);
    let meta = self.read_container_meta(&name).await?;
    self.emit(StoreEvent::GetContainer { container: name });
    Ok(meta)
  }

  /// The declared index paths for a container.
  pub async fn get_indexes(&self, name: &str) -> Result<Vec<IndexDef>> {
    Ok(self.read_container_meta(&sanitize_name(name)).await?.indexes)
  }

  /// Apply a container declaration: create, reconfigure, recreate, or
  /// delete, per the flags on `def`.
  pub async fn set_container(&self, def: ContainerDef) -> Result<()> {
    self.set_container_tracked(def, true).await
  }

  pub(crate) async fn set_container_tracked(
    &self,
    mut def: ContainerDef,
    track: bool,
  ) -> Result<()> {
    def.name = sanitize_name(&def.name);
    let container = def.name.clone();

    let applied = self.apply_container_def(&def).await;

    // The declaration is recorded even when the body returned early
    // (delete/recreate) or failed partway, so replay sees what was asked
    // of this store.
    if track {
      let logged =
        self.append_change(&ChangeRecord::ContainerSet { value: def }).await;
      if applied.is_ok() {
        logged?;
      }
    }

    self.emit(StoreEvent::SetContainer { container });
    applied
  }

  async fn apply_container_def(&self, def: &ContainerDef) -> Result<()> {
    if def.delete {
      self.delete_container(&def.name).await?;
      return Ok(());
    }
    if def.recreate {
      self.delete_container(&def.name).await?;
    }

    if !self.backend().table_exists(&def.name).await? {
      info!(container = %def.name, "creating container");
      self.backend().create_document_table(&def.name).await?;
    }
    self.heal_registry_row(def).await?;

    if !def.indexes.is_empty() || !def.sensitive.is_empty() {
      self.persist_declarations(def).await?;
      self.reconcile_indexes(&def.name, &def.indexes).await?;
    }

    // Seeded documents are not logged individually; the container-set
    // record carries them.
    for object in &def.objects {
      self
        .set_tracked(SetOptions::new(&def.name, object.clone()), false)
        .await?;
    }
    Ok(())
  }

  /// Drop a container, its search table, and its change-log rows. Returns
  /// whether the container existed; deleting a missing container is a
  /// no-op.
  pub async fn delete_container(&self, name: &str) -> Result<bool> {
    let name = sanitize_name(name);
    let b = self.backend();
    let existed = b.table_exists(&name).await?;
    if existed {
      info!(container = %name, "deleting container");
      let mut p = ParamBuilder::new(b);
      p.add("container", name.as_str());
      let ph = p.placeholder("container")?;
      let params = p.finalize();

      let sql = format!(
        "DELETE FROM {} WHERE {} = {ph}",
        b.quote_ident("schema"),
        b.quote_ident("container"),
      );
      b.execute(&sql, &params).await?;

      let sql = format!(
        "DELETE FROM {} WHERE {} = {ph}",
        b.quote_ident("changes"),
        b.quote_ident("container"),
      );
      b.execute(&sql, &params).await?;

      b.drop_table(&name).await?;
      b.drop_table(&search_table_name(&name)).await?;
    }
    self.emit(StoreEvent::DeleteContainer { container: name, existed });
    Ok(existed)
  }

  pub(crate) async fn read_container_meta(
    &self,
    name: &str,
  ) -> Result<ContainerMeta> {
    Ok(
      self
        .registry_row(name)
        .await?
        .unwrap_or_else(|| ContainerMeta::empty(name)),
    )
  }

  /// The registry row for `name`, distinguishing "never declared" from
  /// "declared empty".
  pub(crate) async fn registry_row(
    &self,
    name: &str,
  ) -> Result<Option<ContainerMeta>> {
    let b = self.backend();
    let mut p = ParamBuilder::new(b);
    p.add("container", name);
    let sql = format!(
      "SELECT {}, {} FROM {} WHERE {} = {}",
      b.quote_ident("indexes"),
      b.quote_ident("sensitive"),
      b.quote_ident("schema"),
      b.quote_ident("container"),
      p.placeholder("container")?,
    );
    let Some(row) = b.query_one(&sql, &p.finalize()).await? else {
      return Ok(None);
    };
    Ok(Some(ContainerMeta {
      name:      name.to_string(),
      indexes:   parse_declaration(row.text("indexes"))?,
      sensitive: parse_declaration(row.text("sensitive"))?,
    }))
  }

  /// Insert the registry row when the document table exists without one —
  /// the split-brain left behind by a crash between DDL and registration.
  async fn heal_registry_row(&self, def: &ContainerDef) -> Result<()> {
    if self.registry_row(&def.name).await?.is_some() {
      return Ok(());
    }
    debug!(container = %def.name, "registry row missing, inserting");
    let b = self.backend();
    let mut p = ParamBuilder::new(b);
    p.add("container", def.name.as_str())
      .add("indexes", serde_json::to_string(&def.indexes)?)
      .add("sensitive", serde_json::to_string(&def.sensitive)?)
      .add("updated", now_stamp());
    let sql = format!(
      "INSERT INTO {} ({}, {}, {}, {}) VALUES ({}, {}, {}, {})",
      b.quote_ident("schema"),
      b.quote_ident("container"),
      b.quote_ident("indexes"),
      b.quote_ident("sensitive"),
      b.quote_ident("updated"),
      p.placeholder("container")?,
      p.placeholder("indexes")?,
      p.placeholder("sensitive")?,
      p.placeholder("updated")?,
    );
    b.execute(&sql, &p.finalize()).await?;
    Ok(())
  }

  async fn persist_declarations(&self, def: &ContainerDef) -> Result<()> {
    let b = self.backend();
    let mut p = ParamBuilder::new(b);
    p.add("indexes", serde_json::to_string(&def.indexes)?)
      .add("sensitive", serde_json::to_string(&def.sensitive)?)
      .add("updated", now_stamp())
      .add("container", def.name.as_str());
    let sql = format!(
      "UPDATE {} SET {} = {}, {} = {}, {} = {} WHERE {} = {}",
      b.quote_ident("schema"),
      b.quote_ident("indexes"),
      p.placeholder("indexes")?,
      b.quote_ident("sensitive"),
      p.placeholder("sensitive")?,
      b.quote_ident("updated"),
      p.placeholder("updated")?,
      b.quote_ident("container"),
      p.placeholder("container")?,
    );
    b.execute(&sql, &p.finalize()).await?;
    Ok(())
  }
}

fn parse_declaration<T: DeserializeOwned + Default>(
  text: Option<&str>,
) -> Result<T> {
  match text {
    Some(s) if !s.is_empty() => Ok(serde_json::from_str(s)?),
    _ => Ok(T::default()),
  }
}
