//! Lifecycle events published by the store for external subscribers.

/// A notification of one store operation having completed.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
  Connect,
  Close,
  GetContainer { container: String },
  SetContainer { container: String },
  DeleteContainer { container: String, existed: bool },
  /// Search columns were created during index reconciliation.
  CreateIndexes { container: String, columns: Vec<String> },
  Get { container: String, ids: Vec<String> },
  Set { container: String, id: String, version: i64 },
  Delete { container: String, id: String },
  Search { container: String },
}
