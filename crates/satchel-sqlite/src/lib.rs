//! SQLite backend for the satchel document store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. This crate also carries the
//! engine's integration-test suite, run against in-memory databases.

mod backend;
mod config;

pub use backend::SqliteBackend;
pub use config::SqliteConfig;

#[cfg(test)]
mod tests;
