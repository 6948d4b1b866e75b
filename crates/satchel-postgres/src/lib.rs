//! PostgreSQL backend for the satchel document store, pooled through
//! [`deadpool_postgres`].

mod backend;
mod config;

pub use backend::PostgresBackend;
pub use config::PostgresConfig;

#[cfg(test)]
mod tests;
