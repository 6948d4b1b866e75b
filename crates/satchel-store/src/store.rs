//! [`SqlStore`] — lifecycle, event fan-out, and the backend handle.

use satchel_core::{Result, dialect::SqlBackend, event::StoreEvent};
use tokio::sync::broadcast;
use tracing::info;

/// A document store over one connected relational backend.
///
/// Construction requires an already-connected backend, so every operation
/// can assume a live connection. Aside from the broadcast channel there is
/// no shared mutable state; concurrent callers coordinate only through the
/// database itself.
pub struct SqlStore<D: SqlBackend> {
  backend: D,
  events:  broadcast::Sender<StoreEvent>,
}

impl<D: SqlBackend> SqlStore<D> {
  /// Attach a backend, creating the registry and change-log tables on
  /// first contact.
  pub async fn connect(backend: D) -> Result<Self> {
    backend.ensure_base_schema().await?;
    let (events, _) = broadcast::channel(64);
    let store = Self { backend, events };
    info!("store connected");
    store.emit(StoreEvent::Connect);
    Ok(store)
  }

  /// The dialect backend this store runs on.
  pub fn backend(&self) -> &D {
    &self.backend
  }

  /// Subscribe to lifecycle events. Slow subscribers lag; the store never
  /// blocks on delivery.
  pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
    self.events.subscribe()
  }

  pub(crate) fn emit(&self, event: StoreEvent) {
    // No receivers is the normal case.
    let _ = self.events.send(event);
  }

  /// Release the backend connection.
  pub async fn close(self) -> Result<()> {
    self.emit(StoreEvent::Close);
    info!("store closed");
    self.backend.close().await
  }

  /// Drop every user table and re-create the base schema. Destructive;
  /// meant for tests and tooling.
  pub async fn reset(&self) -> Result<()> {
    for table in self.backend.list_user_tables().await? {
      self.backend.drop_table(&table).await?;
    }
    self.backend.ensure_base_schema().await
  }
}
