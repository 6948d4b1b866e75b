//! SQL Server backend for the satchel document store, speaking TDS through
//! [`tiberius`] over a plain TCP stream.

mod backend;
mod config;

pub use backend::MssqlBackend;
pub use config::MssqlConfig;

#[cfg(test)]
mod tests;
