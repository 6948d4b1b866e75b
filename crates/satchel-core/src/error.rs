//! Error types shared by the satchel crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A query referenced a bind name that was never added to the builder.
  #[error("unknown query parameter: {0}")]
  UnknownParameter(String),

  /// A search predicate or sort referenced a property with no declared
  /// index.
  #[error(
    "property '{prop}' in container '{container}' has not been indexed"
  )]
  UnindexedProperty { container: String, prop: String },

  /// The compare-and-swap update loop lost to concurrent writers on every
  /// attempt.
  #[error("unable to update {container}/{id} after {attempts} attempts")]
  OptimisticUpdateExhausted {
    container: String,
    id:        String,
    attempts:  u32,
  },

  #[error("item {container}/{id} not found")]
  ItemNotFound { container: String, id: String },

  #[error("unknown container {0}")]
  ContainerNotFound(String),

  #[error("query parse error: {0}")]
  QueryParse(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// A driver-level failure, propagated with its message intact.
  #[error("backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend driver error.
  pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Backend(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
