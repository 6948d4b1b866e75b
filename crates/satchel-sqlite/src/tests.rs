//! Integration tests for the engine against in-memory SQLite databases.

use satchel_core::{
  Error,
  change::{ChangeFilter, ChangeRecord, PatchOp},
  container::{ContainerDef, IndexDef},
  dialect::SqlBackend,
  document::{AuthToken, GetOptions, SetOptions},
  event::StoreEvent,
  query::{Query, QueryInput, ReturnType, SearchOptions, SortKey},
};
use satchel_store::SqlStore;
use serde_json::{Value, json};

use crate::SqliteBackend;

async fn store() -> SqlStore<SqliteBackend> {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
  let backend =
    SqliteBackend::open_in_memory().await.expect("in-memory backend");
  SqlStore::connect(backend).await.expect("connect")
}

/// A store with a `user` container indexed on `email`.
async fn user_store() -> SqlStore<SqliteBackend> {
  let s = store().await;
  s.set_container(
    ContainerDef::new("user").with_index(IndexDef::string("email")),
  )
  .await
  .unwrap();
  s
}

fn id_of(value: &Value) -> String {
  value.get("id").and_then(Value::as_str).unwrap().to_string()
}

fn ids_query(container: &str, query: impl Into<QueryInput>) -> SearchOptions {
  SearchOptions::new(container, query).returning(ReturnType::Ids)
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn set_then_get_round_trips() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();

  let stored = s.set(SetOptions::new("notes", json!({"a": 1}))).await.unwrap();
  assert_eq!(stored["a"], json!(1));
  assert_eq!(stored["version"], json!(1));
  let id = id_of(&stored);

  let fetched = s.get_one("notes", &id, false, &[]).await.unwrap().unwrap();
  assert_eq!(fetched["a"], json!(1));
  assert_eq!(fetched["id"], json!(id));
  assert_eq!(fetched["version"], json!(1));
  assert!(fetched.get("created").is_some());
  assert!(fetched.get("updated").is_some());
}

#[tokio::test]
async fn versions_increase_by_one_per_update() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();

  let v1 = s.set(SetOptions::new("notes", json!({"n": 1}))).await.unwrap();
  let id = id_of(&v1);

  let v2 = s
    .set(SetOptions::new("notes", json!({"n": 2, "id": id})))
    .await
    .unwrap();
  assert_eq!(v2["version"], json!(2));

  let v3 = s
    .set(SetOptions::new("notes", json!({"n": 3, "id": id})))
    .await
    .unwrap();
  assert_eq!(v3["version"], json!(3));
}

#[tokio::test]
async fn racing_writers_both_land() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();
  let first = s.set(SetOptions::new("notes", json!({"n": 0}))).await.unwrap();
  let id = id_of(&first);

  // Whoever loses the compare-and-swap re-reads and retries.
  let (a, b) = tokio::join!(
    s.set(SetOptions::new("notes", json!({"n": 1, "id": id.clone()}))),
    s.set(SetOptions::new("notes", json!({"n": 2, "id": id.clone()}))),
  );
  a.unwrap();
  b.unwrap();

  let current = s.get_one("notes", &id, false, &[]).await.unwrap().unwrap();
  assert_eq!(current["version"], json!(3));
}

#[tokio::test]
async fn merge_replaces_root_fields_only() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();
  let stored = s
    .set(SetOptions::new(
      "notes",
      json!({"name": "old", "nested": {"x": 1}}),
    ))
    .await
    .unwrap();
  let id = id_of(&stored);

  let mut opts =
    SetOptions::new("notes", json!({"name": "new", "id": id.clone()}));
  opts.merge = true;
  let merged = s.set(opts).await.unwrap();

  assert_eq!(merged["name"], json!("new"));
  assert_eq!(merged["nested"], json!({"x": 1}));
}

#[tokio::test]
async fn auth_token_stamps_created_by() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();

  let mut opts = SetOptions::new("notes", json!({"a": 1}));
  opts.auth_token = Some(AuthToken { id: "svc-1".to_string() });
  let stored = s.set(opts).await.unwrap();
  let id = id_of(&stored);

  let fetched = s.get_one("notes", &id, false, &[]).await.unwrap().unwrap();
  assert_eq!(fetched["created_by"], json!("svc-1"));
}

#[tokio::test]
async fn get_many_drops_invalid_ids() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();
  let a = s.set(SetOptions::new("notes", json!({"n": 1}))).await.unwrap();
  let b = s.set(SetOptions::new("notes", json!({"n": 2}))).await.unwrap();

  let docs = s
    .get(GetOptions::new("notes", vec![
      id_of(&a),
      String::new(),
      "it's-bad".to_string(),
      "x".repeat(60),
      id_of(&b),
    ]))
    .await
    .unwrap();
  assert_eq!(docs.len(), 2);
}

#[tokio::test]
async fn get_missing_returns_nothing() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();
  assert!(s.get_one("notes", "nope", false, &[]).await.unwrap().is_none());
}

#[tokio::test]
async fn del_requires_existing_document_and_container() {
  let s = user_store().await;
  let stored =
    s.set(SetOptions::new("user", json!({"email": "a@x.com"}))).await.unwrap();
  let id = id_of(&stored);

  s.del("user", &id).await.unwrap();
  assert!(matches!(
    s.del("user", &id).await,
    Err(Error::ItemNotFound { .. })
  ));
  assert!(matches!(
    s.del("ghost", "u1").await,
    Err(Error::ContainerNotFound(_))
  ));
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_matches_case_insensitively() {
  let s = user_store().await;
  let stored =
    s.set(SetOptions::new("user", json!({"email": "a@x.com"}))).await.unwrap();
  let id = id_of(&stored);

  let hits = s
    .search(ids_query("user", Query::cmp("email", "==", "A@X.com")))
    .await
    .unwrap();
  assert_eq!(hits.ids(), Some(&[id.clone()][..]));

  s.del("user", &id).await.unwrap();
  let hits = s
    .search(ids_query("user", Query::cmp("email", "==", "A@X.com")))
    .await
    .unwrap();
  assert!(hits.is_empty());
}

#[tokio::test]
async fn unindexed_property_is_rejected() {
  let s = user_store().await;
  let err = s
    .search(ids_query("user", Query::cmp("name", "==", "x")))
    .await
    .unwrap_err();
  assert!(
    matches!(err, Error::UnindexedProperty { ref prop, .. } if prop == "name")
  );
}

#[tokio::test]
async fn nested_paths_index_and_redeclaration_drops_columns() {
  let s = store().await;
  s.set_container(
    ContainerDef::new("cfg").with_index(IndexDef::string("a.b")),
  )
  .await
  .unwrap();
  let stored =
    s.set(SetOptions::new("cfg", json!({"a": {"b": "X"}}))).await.unwrap();
  let id = id_of(&stored);

  let hits = s
    .search(ids_query("cfg", Query::cmp("a.b", "==", "x")))
    .await
    .unwrap();
  assert_eq!(hits.ids(), Some(&[id][..]));

  // Redeclare with a different index: the old column disappears from both
  // the physical table and query validation.
  s.set_container(ContainerDef::new("cfg").with_index(IndexDef::string("c")))
    .await
    .unwrap();
  let columns = s.backend().list_columns("cfg_search").await.unwrap();
  assert!(columns.iter().all(|c| c.name != "a_b"));
  assert!(matches!(
    s.search(ids_query("cfg", Query::cmp("a.b", "==", "x"))).await,
    Err(Error::UnindexedProperty { .. })
  ));
}

#[tokio::test]
async fn text_queries_resolve_params() {
  let s = user_store().await;
  let stored =
    s.set(SetOptions::new("user", json!({"email": "a@x.com"}))).await.unwrap();

  let opts = ids_query("user", "email == @e").with_param("e", "A@X.com");
  let hits = s.search(opts).await.unwrap();
  assert_eq!(hits.ids(), Some(&[id_of(&stored)][..]));
}

#[tokio::test]
async fn boolean_composition_and_membership() {
  let s = store().await;
  s.set_container(
    ContainerDef::new("item")
      .with_index(IndexDef::string("status"))
      .with_index(IndexDef::number("price")),
  )
  .await
  .unwrap();
  let cheap = s
    .set(SetOptions::new("item", json!({"status": "Active", "price": 3})))
    .await
    .unwrap();
  s.set(SetOptions::new("item", json!({"status": "active", "price": 30})))
    .await
    .unwrap();
  s.set(SetOptions::new("item", json!({"status": "gone", "price": 1})))
    .await
    .unwrap();

  let hits = s
    .search(ids_query(
      "item",
      Query::And(vec![
        Query::cmp("status", "in", json!(["Active", "new"])),
        Query::cmp("price", "<", 10),
      ]),
    ))
    .await
    .unwrap();
  assert_eq!(hits.ids(), Some(&[id_of(&cheap)][..]));
}

#[tokio::test]
async fn return_types_shape_results() {
  let s = user_store().await;
  let stored =
    s.set(SetOptions::new("user", json!({"email": "a@x.com"}))).await.unwrap();
  let id = id_of(&stored);

  let count = s
    .search(
      SearchOptions::new("user", QueryInput::All).returning(ReturnType::Count),
    )
    .await
    .unwrap();
  assert_eq!(count.count(), Some(1));

  let map = s
    .search(
      SearchOptions::new("user", QueryInput::All).returning(ReturnType::Map),
    )
    .await
    .unwrap();
  let entry = &map.map().unwrap()[&id];
  assert_eq!(entry["version"], json!(1));
  // The id is the key, not repeated inside the value.
  assert!(entry.get("id").is_none());

  let array = s
    .search(
      SearchOptions::new("user", QueryInput::All).returning(ReturnType::Array),
    )
    .await
    .unwrap();
  let items = array.array().unwrap();
  assert_eq!(items.len(), 1);
  assert_eq!(items[0]["id"], json!(id));
  assert_eq!(items[0]["version"], json!(1));
}

#[tokio::test]
async fn sorted_pagination_applies_in_order() {
  let s = user_store().await;
  for email in ["c@x.com", "a@x.com", "b@x.com"] {
    s.set(SetOptions::new("user", json!({"email": email}))).await.unwrap();
  }

  let mut opts =
    SearchOptions::new("user", QueryInput::All).returning(ReturnType::Array);
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

#[tokio::test]
async fn unindexed_sort_keys_are_dropped_not_fatal() {
  let s = user_store().await;
  s.set(SetOptions::new("user", json!({"email": "a@x.com"}))).await.unwrap();

  let mut opts =
    SearchOptions::new("user", QueryInput::All).returning(ReturnType::Ids);
  opts.sort = vec![SortKey::asc("name")];
  opts.limit = Some(1);
  // No surviving sort key: the query runs unsorted and unpaginated.
  assert_eq!(s.search(opts).await.unwrap().len(), 1);
}

#[tokio::test]
async fn search_all_preserves_input_order() {
  let s = user_store().await;
  let stored =
    s.set(SetOptions::new("user", json!({"email": "a@x.com"}))).await.unwrap();

  let results = s
    .search_all(vec![
      ids_query("user", Query::cmp("email", "==", "missing@x.com")),
      ids_query("user", Query::cmp("email", "==", "a@x.com")),
    ])
    .await
    .unwrap();
  assert!(results[0].is_empty());
  assert_eq!(results[1].ids(), Some(&[id_of(&stored)][..]));
}

// ─── Pruning ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sensitive_paths_are_pruned_by_role() {
  let s = store().await;
  s.set_container(
    ContainerDef::new("user")
      .with_index(IndexDef::string("email"))
      .with_sensitive("ssn"),
  )
  .await
  .unwrap();
  let stored = s
    .set(SetOptions::new(
      "user",
      json!({"email": "a@x.com", "ssn": "000-00-0000"}),
    ))
    .await
    .unwrap();
  let id = id_of(&stored);

  let pruned = s.get_one("user", &id, true, &[]).await.unwrap().unwrap();
  assert!(pruned.get("ssn").is_none());

  let admin = s
    .get_one("user", &id, true, &["admin".to_string()])
    .await
    .unwrap()
    .unwrap();
  assert_eq!(admin["ssn"], json!("000-00-0000"));

  // Search results prune unconditionally with the caller's roles.
  let result = s
    .search(
      SearchOptions::new("user", QueryInput::All).returning(ReturnType::Array),
    )
    .await
    .unwrap();
  assert!(result.array().unwrap()[0].get("ssn").is_none());
}

// ─── Containers ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_container_is_idempotent_and_cascades() {
  let s = user_store().await;
  s.set(SetOptions::new("user", json!({"email": "a@x.com"}))).await.unwrap();

  assert!(s.delete_container("user").await.unwrap());
  assert!(!s.backend().table_exists("user").await.unwrap());
  assert!(!s.backend().table_exists("user_search").await.unwrap());
  assert!(s.get_changes(ChangeFilter::default()).await.unwrap().is_empty());

  // Deleting again is a no-op.
  assert!(!s.delete_container("user").await.unwrap());
}

#[tokio::test]
async fn recreate_drops_existing_documents() {
  let s = user_store().await;
  s.set(SetOptions::new("user", json!({"email": "a@x.com"}))).await.unwrap();

  let mut def =
    ContainerDef::new("user").with_index(IndexDef::string("email"));
  def.recreate = true;
  s.set_container(def).await.unwrap();

  let result = s
    .search(
      SearchOptions::new("user", QueryInput::All).returning(ReturnType::Count),
    )
    .await
    .unwrap();
  assert_eq!(result.count(), Some(0));
}

#[tokio::test]
async fn seeded_objects_are_covered_by_the_container_record() {
  let s = store().await;
  let mut def = ContainerDef::new("user").with_index(IndexDef::string("email"));
  def.objects = vec![
    json!({"id": "u1", "email": "a@x.com"}),
    json!({"id": "u2", "email": "b@x.com"}),
  ];
  s.set_container(def).await.unwrap();

  assert!(s.get_one("user", "u1", false, &[]).await.unwrap().is_some());

  // One container-set record, no per-document object-add records.
  let changes = s.get_changes(ChangeFilter::default()).await.unwrap();
  assert_eq!(changes.len(), 1);
  assert!(matches!(
    &changes[0],
    ChangeRecord::ContainerSet { value } if value.objects.len() == 2
  ));
}

#[tokio::test]
async fn missing_registry_row_is_healed() {
  let s = user_store().await;
  s.backend()
    .execute(
      "DELETE FROM \"schema\" WHERE \"container\" = 'user'",
      &satchel_core::value::Params::empty(),
    )
    .await
    .unwrap();

  s.set_container(
    ContainerDef::new("user").with_index(IndexDef::string("email")),
  )
  .await
  .unwrap();
  let meta = s.get_container("user").await.unwrap();
  assert_eq!(meta.indexes, vec![IndexDef::string("email")]);
}

#[tokio::test]
async fn undeclared_container_reads_as_empty() {
  let s = store().await;
  let meta = s.get_container("never").await.unwrap();
  assert_eq!(meta.name, "never");
  assert!(meta.indexes.is_empty());
}

// ─── Change log & replay ─────────────────────────────────────────────────────

#[tokio::test]
async fn updates_log_patch_operations_not_values() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();
  let stored =
    s.set(SetOptions::new("notes", json!({"name": "old"}))).await.unwrap();
  let id = id_of(&stored);
  s.set(SetOptions::new("notes", json!({"name": "new", "id": id.clone()})))
    .await
    .unwrap();

  let changes = s.get_changes(ChangeFilter::default()).await.unwrap();
  let update = changes
    .iter()
    .find_map(|c| match c {
      ChangeRecord::ObjectUpdate { changes, .. } => Some(changes),
      _ => None,
    })
    .expect("object-update record");
  assert_eq!(update, &vec![PatchOp::PropUpdate {
    prop:  "name".to_string(),
    value: json!("new"),
  }]);
}

#[tokio::test]
async fn identical_rewrite_logs_nothing() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();
  let stored =
    s.set(SetOptions::new("notes", json!({"n": 1}))).await.unwrap();
  let before = s.get_changes(ChangeFilter::default()).await.unwrap().len();

  s.set(SetOptions::new("notes", json!({"n": 1, "id": id_of(&stored)})))
    .await
    .unwrap();
  let after = s.get_changes(ChangeFilter::default()).await.unwrap().len();
  assert_eq!(before, after);
}

#[tokio::test]
async fn replay_reproduces_the_source_store() {
  let source = user_store().await;
  let a = source
    .set(SetOptions::new("user", json!({"email": "a@x.com"})))
    .await
    .unwrap();
  let b = source
    .set(SetOptions::new("user", json!({"email": "b@x.com"})))
    .await
    .unwrap();
  source
    .set(SetOptions::new(
      "user",
      json!({"email": "a2@x.com", "id": id_of(&a)}),
    ))
    .await
    .unwrap();
  source.del("user", &id_of(&b)).await.unwrap();

  let changes = source.get_changes(ChangeFilter::default()).await.unwrap();

  // Replay in two batches; convergence must not depend on batching.
  let replica = store().await;
  let (first, rest) = changes.split_at(changes.len() / 2);
  replica.merge(first).await.unwrap();
  replica.merge(rest).await.unwrap();

  let doc = replica
    .get_one("user", &id_of(&a), false, &[])
    .await
    .unwrap()
    .unwrap();
  assert_eq!(doc["email"], json!("a2@x.com"));
  assert!(
    replica.get_one("user", &id_of(&b), false, &[]).await.unwrap().is_none()
  );

  // Merged changes are not re-logged.
  let hits = replica
    .search(ids_query("user", Query::cmp("email", "==", "a2@x.com")))
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert!(replica.get_changes(ChangeFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn merge_skips_missing_targets() {
  let s = user_store().await;
  s.merge(&[
    ChangeRecord::ObjectDelete {
      container: "user".to_string(),
      id:        "ghost".to_string(),
    },
    ChangeRecord::ObjectUpdate {
      container: "user".to_string(),
      id:        "ghost".to_string(),
      changes:   vec![PatchOp::PropUpdate {
        prop:  "email".to_string(),
        value: json!("x"),
      }],
    },
    ChangeRecord::ObjectAdd {
      container: "user".to_string(),
      value:     json!({"id": "u1", "email": "a@x.com"}),
    },
  ])
  .await
  .unwrap();

  assert!(s.get_one("user", "u1", false, &[]).await.unwrap().is_some());
}

#[tokio::test]
async fn change_filters_bound_below() {
  let s = store().await;
  s.set_container(ContainerDef::new("notes")).await.unwrap();
  for n in 0..3 {
    s.set(SetOptions::new("notes", json!({"n": n}))).await.unwrap();
  }
  // container-set + three object-adds
  let all = s.get_changes(ChangeFilter::default()).await.unwrap();
  assert_eq!(all.len(), 4);

  let tail = s
    .get_changes(ChangeFilter { from_sequence: Some(3), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(tail.len(), 2);

  let future = chrono::Utc::now() + chrono::Duration::minutes(5);
  let none = s
    .get_changes(ChangeFilter { since: Some(future), ..Default::default() })
    .await
    .unwrap();
  assert!(none.is_empty());
}

// ─── Lifecycle & events ──────────────────────────────────────────────────────

#[tokio::test]
async fn events_fan_out_to_subscribers() {
  let s = user_store().await;
  let mut events = s.subscribe();

  let stored =
    s.set(SetOptions::new("user", json!({"email": "a@x.com"}))).await.unwrap();
  s.search(ids_query("user", Query::cmp("email", "==", "a@x.com")))
    .await
    .unwrap();

  let mut seen = Vec::new();
  while let Ok(event) = events.try_recv() {
    seen.push(event);
  }
  assert!(seen.iter().any(|e| matches!(
    e,
    StoreEvent::Set { container, id, version: 1 }
      if container == "user" && *id == id_of(&stored)
  )));
  assert!(
    seen
      .iter()
      .any(|e| matches!(e, StoreEvent::Search { container } if container == "user"))
  );
}

#[tokio::test]
async fn reset_wipes_user_tables() {
  let s = user_store().await;
  s.set(SetOptions::new("user", json!({"email": "a@x.com"}))).await.unwrap();

  s.reset().await.unwrap();
  assert!(!s.backend().table_exists("user").await.unwrap());
  assert!(s.backend().table_exists("schema").await.unwrap());
  assert!(s.get_changes(ChangeFilter::default()).await.unwrap().is_empty());
}
