//! Live-server tests, ignored by default. Point `SATCHEL_MSSQL_*` at a
//! disposable database and run with `--ignored`; each test resets the
//! database it connects to.

use satchel_core::{
  container::{ContainerDef, IndexDef},
  document::SetOptions,
  query::{Query, ReturnType, SearchOptions, SortKey},
};
use satchel_store::SqlStore;
use serde_json::json;

use crate::MssqlBackend;

async fn store() -> SqlStore<MssqlBackend> {
  let backend = MssqlBackend::from_env().await.expect("mssql backend");
  let store = SqlStore::connect(backend).await.expect("connect");
  store.reset().await.expect("reset");
  store
}

#[tokio::test]
#[ignore = "needs a sql server instance"]
async fn set_then_get_round_trips() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();

  let stored = s.set(SetOptions::new("notes", json!({"a": 1}))).await.unwrap();
  let id = stored["id"].as_str().unwrap();

  let fetched = s.get_one("notes", id, false, &[]).await.unwrap().unwrap();
  assert_eq!(fetched["a"], json!(1));
  assert_eq!(fetched["version"], json!(1));
}

#[tokio::test]
#[ignore = "needs a sql server instance"]
async fn sorted_pagination_uses_offset_fetch() {
  let s = store().await;
  s.set_container(
    ContainerDef::new("user").with_index(IndexDef::string("email")),
  )
  .await
  .unwrap();
  for email in ["c@x.com", "a@x.com", "b@x.com"] {
    s.set(SetOptions::new("user", json!({"email": email}))).await.unwrap();
  }

  let mut opts = SearchOptions::new(
    "user",
    Query::cmp("email", "!=", "nobody@x.com"),
  )
  .returning(ReturnType::Array);
  opts.sort = vec![SortKey::asc("email")];
  opts.limit = Some(2);
  opts.offset = Some(1);
  let result = s.search(opts).await.unwrap();
  let emails: Vec<_> = result
    .array()
    .unwrap()
    .iter()
    .map(|v| v["email"].as_str().unwrap().to_string())
    .collect();
  assert_eq!(emails, vec!["b@x.com", "c@x.com"]);
}
