//! Live-server tests, ignored by default. Point `SATCHEL_PG_*` at a
//! disposable database and run with `--ignored`; each test resets the
//! database it connects to.

use satchel_core::{
  Error,
  container::{ContainerDef, IndexDef},
  document::SetOptions,
  query::{Query, ReturnType, SearchOptions},
};
use satchel_store::SqlStore;
use serde_json::json;

use crate::PostgresBackend;

async fn store() -> SqlStore<PostgresBackend> {
  let backend = PostgresBackend::from_env().await.expect("postgres backend");
  let store = SqlStore::connect(backend).await.expect("connect");
  store.reset().await.expect("reset");
  store
}

#[tokio::test]
#[ignore = "needs a postgres server"]
async fn set_then_get_round_trips() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();

  let stored = s.set(SetOptions::new("notes", json!({"a": 1}))).await.unwrap();
  let id = stored["id"].as_str().unwrap();

  let fetched = s.get_one("notes", id, false, &[]).await.unwrap().unwrap();
  assert_eq!(fetched["a"], json!(1));
  assert_eq!(fetched["version"], json!(1));
  assert!(fetched.get("created").is_some());
}

#[tokio::test]
#[ignore = "needs a postgres server"]
async fn search_folds_case_and_respects_indexes() {
  let s = store().await;
  s.set_container(
    ContainerDef::new("user")
      .with_index(IndexDef::string("email"))
      .with_index(IndexDef::number("age")),
  )
  .await
  .unwrap();
  let stored = s
    .set(SetOptions::new("user", json!({"email": "A@X.com", "age": 30})))
    .await
    .unwrap();

  let hits = s
    .search(
      SearchOptions::new("user", Query::cmp("email", "==", "a@x.COM"))
        .returning(ReturnType::Ids),
    )
    .await
    .unwrap();
  assert_eq!(hits.ids(), Some(&[stored["id"].as_str().unwrap().to_string()][..]));

  // Numeric index columns hold NULL for absent values; a query on a
  // never-declared property still fails up front.
  let err = s
    .search(SearchOptions::new("user", Query::cmp("name", "==", "x")))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::UnindexedProperty { .. }));
}

#[tokio::test]
#[ignore = "needs a postgres server"]
async fn replay_into_a_clean_database_converges() {
  let s = store().await;
  s.set_container(
    ContainerDef::new("user").with_index(IndexDef::string("email")),
  )
  .await
  .unwrap();
  let stored =
    s.set(SetOptions::new("user", json!({"email": "a@x.com"}))).await.unwrap();
  let id = stored["id"].as_str().unwrap().to_string();
  s.set(SetOptions::new("user", json!({"email": "b@x.com", "id": id.clone()})))
    .await
    .unwrap();

  let changes = s.get_changes(Default::default()).await.unwrap();
  s.reset().await.unwrap();
  s.merge(&changes).await.unwrap();

  let doc = s.get_one("user", &id, false, &[]).await.unwrap().unwrap();
  assert_eq!(doc["email"], json!("b@x.com"));
}
