//! The satchel engine: container registry, secondary-index maintenance,
//! document CRUD with optimistic concurrency, the search compiler, and the
//! change log.
//!
//! [`SqlStore`] is generic over a connected [`satchel_core::dialect::SqlBackend`];
//! the backend crates (`satchel-sqlite`, `satchel-postgres`, `satchel-mssql`)
//! supply the concrete dialects.

mod changes;
mod documents;
mod index;
mod registry;
mod search;
mod store;

pub use store::SqlStore;
