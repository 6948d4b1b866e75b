//! Named query parameters, collected in first-use order.

use std::collections::BTreeMap;

use crate::{
  Error, Result,
  dialect::SqlDialect,
  value::{Param, Params, SqlValue},
};

/// Collects the bind parameters of one statement and resolves their
/// dialect placeholders.
///
/// Parameters keep the order they were first added in; positional dialects
/// bind them by that ordinal. The builder can be finalized repeatedly, which
/// lets one prepared statement run against many value sets (index
/// repopulation does this per document).
pub struct ParamBuilder<'a, D: SqlDialect + ?Sized> {
  dialect: &'a D,
  params:  Vec<Param>,
}

impl<'a, D: SqlDialect + ?Sized> ParamBuilder<'a, D> {
  pub fn new(dialect: &'a D) -> Self {
    Self { dialect, params: Vec::new() }
  }

  /// Register `name` with a value, assigning the next ordinal. Re-adding a
  /// name overwrites its value and keeps its original position.
  pub fn add(&mut self, name: &str, value: impl Into<SqlValue>) -> &mut Self {
    let value = value.into();
    match self.params.iter_mut().find(|p| p.name == name) {
      Some(p) => p.value = value,
      None => {
        let ordinal = self.params.len() + 1;
        self.params.push(Param { ordinal, name: name.to_string(), value });
      }
    }
    self
  }

  /// Register `name` folding text values to lower case, for comparisons
  /// against search columns.
  pub fn add_folded(
    &mut self,
    name: &str,
    value: impl Into<SqlValue>,
  ) -> &mut Self {
    self.add(name, value.into().fold())
  }

  /// The dialect placeholder for a previously added parameter.
  pub fn placeholder(&self, name: &str) -> Result<String> {
    let p = self
      .params
      .iter()
      .find(|p| p.name == name)
      .ok_or_else(|| Error::UnknownParameter(name.to_string()))?;
    Ok(self.dialect.placeholder(p.ordinal, &p.name))
  }

  /// Update the value of a previously added parameter.
  pub fn set_value(
    &mut self,
    name: &str,
    value: impl Into<SqlValue>,
  ) -> Result<()> {
    let p = self
      .params
      .iter_mut()
      .find(|p| p.name == name)
      .ok_or_else(|| Error::UnknownParameter(name.to_string()))?;
    p.value = value.into();
    Ok(())
  }

  /// Set every registered parameter from `values` by name, folding text to
  /// lower case. Names absent from the map bind NULL.
  pub fn set_values_folded(&mut self, values: &BTreeMap<String, SqlValue>) {
    for p in &mut self.params {
      p.value = match values.get(&p.name) {
        Some(v) => v.clone().fold(),
        None => SqlValue::Null,
      };
    }
  }

  /// The dialect-neutral payload for execution.
  pub fn finalize(&self) -> Params {
    Params::from(self.params.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dialect::ColumnTypes;

  struct Positional;

  impl SqlDialect for Positional {
    fn quote_ident(&self, name: &str) -> String { format!("\"{name}\"") }

    fn placeholder(&self, ordinal: usize, _name: &str) -> String {
      format!("${ordinal}")
    }

    fn pagination_clause(&self, limit: u64, offset: Option<u64>) -> String {
      match offset {
        Some(o) => format!(" LIMIT {limit} OFFSET {o}"),
        None => format!(" LIMIT {limit}"),
      }
    }

    fn column_types(&self) -> ColumnTypes {
      ColumnTypes {
        small_text:      "TEXT",
        large_text:      "TEXT",
        searchable_text: "TEXT",
        int:             "INTEGER",
        float:           "REAL",
        auto_pk:         "INTEGER PRIMARY KEY",
      }
    }
  }

  #[test]
  fn ordinals_follow_first_use() {
    let d = Positional;
    let mut b = ParamBuilder::new(&d);
    b.add("container", "user").add("id", "u1");
    assert_eq!(b.placeholder("container").unwrap(), "$1");
    assert_eq!(b.placeholder("id").unwrap(), "$2");

    // re-adding keeps the original ordinal
    b.add("container", "other");
    assert_eq!(b.placeholder("container").unwrap(), "$1");

    let params = b.finalize();
    let values: Vec<_> = params.values().cloned().collect();
    assert_eq!(values, vec![SqlValue::from("other"), SqlValue::from("u1")]);
  }

  #[test]
  fn unknown_placeholder_is_an_error() {
    let d = Positional;
    let b = ParamBuilder::new(&d);
    assert!(matches!(
      b.placeholder("nope"),
      Err(Error::UnknownParameter(name)) if name == "nope"
    ));
  }

  #[test]
  fn set_values_folded_binds_missing_names_null() {
    let d = Positional;
    let mut b = ParamBuilder::new(&d);
    b.add("email", SqlValue::Null).add("id", SqlValue::Null);

    let mut values = BTreeMap::new();
    values.insert("email".to_string(), SqlValue::from("A@X.Com"));
    b.set_values_folded(&values);

    let params = b.finalize();
    let values: Vec<_> = params.values().cloned().collect();
    assert_eq!(values, vec![SqlValue::from("a@x.com"), SqlValue::Null]);
  }

  #[test]
  fn set_value_requires_registration() {
    let d = Positional;
    let mut b = ParamBuilder::new(&d);
    assert!(b.set_value("ghost", 1i64).is_err());
  }
}
