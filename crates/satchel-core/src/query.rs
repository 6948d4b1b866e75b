//! Search queries: the boolean-expression tree and search options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Expression tree ─────────────────────────────────────────────────────────

/// One comparison against an indexed property (or `id`).
///
/// The comparator is carried as its portable token (`==`, `!=`, `<`, `in`,
/// ...) and translated per dialect at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
  pub prop:       String,
  pub comparator: String,
  pub value:      Value,
}

impl Comparison {
  pub fn new(
    prop: impl Into<String>,
    comparator: impl Into<String>,
    value: impl Into<Value>,
  ) -> Self {
    Self {
      prop:       prop.into(),
      comparator: comparator.into(),
      value:      value.into(),
    }
  }
}

/// A boolean combination of comparisons. The operator lives on the group,
/// so a tree is unambiguous regardless of how it was built.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
  Cmp(Comparison),
  And(Vec<Query>),
  Or(Vec<Query>),
}

impl Query {
  pub fn cmp(
    prop: impl Into<String>,
    comparator: impl Into<String>,
    value: impl Into<Value>,
  ) -> Self {
    Self::Cmp(Comparison::new(prop, comparator, value))
  }
}

impl From<Comparison> for Query {
  fn from(c: Comparison) -> Self { Self::Cmp(c) }
}

// ─── Options ─────────────────────────────────────────────────────────────────

/// How a query was supplied.
#[derive(Debug, Clone, Default)]
pub enum QueryInput {
  /// No predicate — every document in the container.
  #[default]
  All,
  Tree(Query),
  /// An expression in the search-string grammar, parsed at search time.
  Text(String),
}

impl From<Query> for QueryInput {
  fn from(q: Query) -> Self { Self::Tree(q) }
}

impl From<Comparison> for QueryInput {
  fn from(c: Comparison) -> Self { Self::Tree(Query::Cmp(c)) }
}

impl From<&str> for QueryInput {
  fn from(s: &str) -> Self { Self::Text(s.to_string()) }
}

impl From<String> for QueryInput {
  fn from(s: String) -> Self { Self::Text(s) }
}

/// One ORDER BY key. Sorting is restricted to indexed properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
  pub prop:       String,
  pub descending: bool,
}

impl SortKey {
  pub fn asc(prop: impl Into<String>) -> Self {
    Self { prop: prop.into(), descending: false }
  }

  pub fn desc(prop: impl Into<String>) -> Self {
    Self { prop: prop.into(), descending: true }
  }
}

/// Projection and post-processing of search hits.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
  /// Bare id list; skips value materialization and pruning.
  #[default]
  Ids,
  /// Aggregate count only.
  Count,
  /// id → pruned document (the id is the key, not repeated inside).
  Map,
  /// Pruned documents with id and version injected, in result order.
  Array,
}

/// Parameters for one search call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
  pub container:   String,
  pub query:       QueryInput,
  /// Values for `@name` references in a text query.
  pub params:      BTreeMap<String, Value>,
  pub sort:        Vec<SortKey>,
  /// Maximum rows returned. Applied only when a valid sort key was
  /// accepted, since unordered pagination is not portable.
  pub limit:       Option<u64>,
  pub offset:      Option<u64>,
  pub return_type: ReturnType,
  /// Roles checked against the container's sensitive-path declarations.
  pub roles:       Vec<String>,
}

impl SearchOptions {
  pub fn new(
    container: impl Into<String>,
    query: impl Into<QueryInput>,
  ) -> Self {
    Self {
      container:   container.into(),
      query:       query.into(),
      params:      BTreeMap::new(),
      sort:        Vec::new(),
      limit:       None,
      offset:      None,
      return_type: ReturnType::default(),
      roles:       Vec::new(),
    }
  }

  pub fn returning(mut self, return_type: ReturnType) -> Self {
    self.return_type = return_type;
    self
  }

  pub fn with_param(
    mut self,
    name: impl Into<String>,
    value: impl Into<Value>,
  ) -> Self {
    self.params.insert(name.into(), value.into());
    self
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// The shape of a search result, matching the requested [`ReturnType`].
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
  Ids(Vec<String>),
  Count(u64),
  Map(BTreeMap<String, Value>),
  Array(Vec<Value>),
}

impl SearchResult {
  pub fn ids(&self) -> Option<&[String]> {
    match self {
      Self::Ids(ids) => Some(ids),
      _ => None,
    }
  }

  pub fn count(&self) -> Option<u64> {
    match self {
      Self::Count(n) => Some(*n),
      _ => None,
    }
  }

  pub fn map(&self) -> Option<&BTreeMap<String, Value>> {
    match self {
      Self::Map(m) => Some(m),
      _ => None,
    }
  }

  pub fn array(&self) -> Option<&[Value]> {
    match self {
      Self::Array(items) => Some(items),
      _ => None,
    }
  }

  /// Number of hits (the count itself for count queries).
  pub fn len(&self) -> usize {
    match self {
      Self::Ids(ids) => ids.len(),
      Self::Count(n) => *n as usize,
      Self::Map(m) => m.len(),
      Self::Array(items) => items.len(),
    }
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}
