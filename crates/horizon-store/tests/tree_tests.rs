//! Integration tests for the tree store.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{MockTransport, param, tree_backend};
use horizon_store::{
    ExpandDepth, FnHook, NetworkError, Record, Schema, StoreConfig, StoreError, TreeStore,
    TreeStoreConfig, Value,
};
use parking_lot::Mutex;
use serde_json::json;

fn config() -> TreeStoreConfig {
    StoreConfig::default().with_primary_keys(["id"]).into()
}

fn key(id: i64) -> String {
    json!({ "id": id }).to_string()
}

fn record(id: i64) -> Record {
    Record::from_json(&Schema::open(["id"]), &json!({ "id": id })).unwrap()
}

fn id_at(store: &TreeStore, path: &[usize]) -> Option<i64> {
    match store.get_at(path)?.value("id") {
        Value::Int(id) => Some(*id),
        _ => None,
    }
}

/// 1 ─┬─ 10
///    └─ 11 ── 111
/// 2
fn backend() -> MockTransport {
    let mut children = HashMap::new();
    children.insert(key(1), vec![json!({"id": 10}), json!({"id": 11, "children": true})]);
    children.insert(key(11), vec![json!({"id": 111})]);
    tree_backend(
        vec![json!({"id": 1, "children": true}), json!({"id": 2})],
        children,
    )
}

#[tokio::test]
async fn test_local_paths() {
    let data = vec![
        json!({"id": "A", "children": [{"id": "B"}, {"id": "C"}]}),
        json!({"id": "D", "children": []}),
    ];
    let store = TreeStore::local(config(), data).unwrap();
    store.load().await.unwrap();

    assert_eq!(store.get_at(&[0, 1]).unwrap().value("id"), &Value::from("C"));
    assert!(store.get_at(&[1, 0]).is_none());
    assert!(!store.has_child([1]));
}

#[tokio::test]
async fn test_lazy_expand_fetches_once() {
    let transport = backend();
    let store = TreeStore::remote(config(), transport.clone(), "/nodes").unwrap();
    store.load().await.unwrap();
    assert_eq!(store.get_count(), 2);
    assert!(store.get_at(&[0, 0]).is_none());

    let updated = Arc::new(Mutex::new(0));
    let sink = updated.clone();
    store.signals().update_children.connect(move |_| *sink.lock() += 1);

    assert!(store.expand([0]).await.unwrap());
    let request = transport.last_request().unwrap();
    assert_eq!(param(&request, "parent"), Some(key(1)));
    assert_eq!(id_at(&store, &[0, 1]), Some(11));
    assert!(store.has_child([0, 1]));

    store.collapse([0]);
    assert!(store.expand([0]).await.unwrap());
    assert_eq!(transport.requests().len(), 2);
    assert_eq!(*updated.lock(), 3);
}

#[tokio::test]
async fn test_load_children_refetches() {
    let transport = backend();
    let store = TreeStore::remote(config(), transport.clone(), "/nodes").unwrap();
    store.load().await.unwrap();
    store.expand([0]).await.unwrap();
    let old = store.node_id([0, 0]).unwrap();

    assert!(store.load_children([0]).await.unwrap());
    assert_eq!(transport.requests().len(), 3);
    assert!(store.record(old).is_none());
    assert_eq!(id_at(&store, &[0, 0]), Some(10));
}

#[tokio::test]
async fn test_remote_expand_treats_missing_key_as_expandable() {
    let store = TreeStore::remote(
        config().with_remote_expand(true),
        tree_backend(vec![json!({"id": 5})], HashMap::new()),
        "/nodes",
    )
    .unwrap();
    store.load().await.unwrap();

    assert!(store.has_child([0]));
    assert!(!store.expand([0]).await.unwrap());
    assert!(!store.has_child([0]));
    assert_eq!(store.get_children([0]), Some(Vec::new()));
}

#[tokio::test]
async fn test_expand_all_is_sequential_depth_first() {
    let transport = backend();
    let store = TreeStore::remote(config(), transport.clone(), "/nodes").unwrap();
    store.load().await.unwrap();

    assert_eq!(store.expand_all(ExpandDepth::All).await.unwrap(), 2);
    let parents: Vec<Option<String>> = transport
        .requests()
        .iter()
        .map(|request| param(request, "parent"))
        .collect();
    assert_eq!(parents, vec![None, Some(key(1)), Some(key(11))]);
    assert_eq!(id_at(&store, &[0, 1, 0]), Some(111));

    let depths: Vec<usize> = store.visible_rows().iter().map(|row| row.depth).collect();
    assert_eq!(depths, vec![0, 1, 1, 2, 0]);
}

#[tokio::test]
async fn test_load_parents_from_backend() {
    let mut children = HashMap::new();
    children.insert(key(1), vec![json!({"id": 10}), json!({"id": 11, "children": true})]);
    children.insert(key(11), vec![json!({"id": 111})]);
    let transport = MockTransport::new(move |request| {
        let records = if let Some(child) = param(request, "child") {
            assert_eq!(child, key(111));
            vec![json!({"id": 1}), json!({"id": 11})]
        } else if let Some(parent) = param(request, "parent") {
            children.get(&parent).cloned().unwrap_or_default()
        } else {
            vec![json!({"id": 1, "children": true}), json!({"id": 2})]
        };
        Ok(json!({ "records": records }))
    });
    let store = TreeStore::remote(config().with_remote_expand(true), transport, "/nodes").unwrap();
    store.load().await.unwrap();

    assert_eq!(store.load_parents(&record(111)).await.unwrap(), Some(vec![0, 1, 0]));
    assert!(store.is_expanded([0]));
    assert!(store.is_expanded([0, 1]));
    let parents = store.find_parents(&record(111)).unwrap();
    assert_eq!(parents, vec![record(1), record(11)]);

    assert_eq!(store.load_parents(&record(111)).await.unwrap(), Some(vec![0, 1, 0]));
}

#[tokio::test]
async fn test_load_parents_with_path_finder() {
    let store = TreeStore::remote(config(), backend(), "/nodes")
        .unwrap()
        .with_path_finder(FnHook(|_record: Record| async move {
            Ok::<_, StoreError>(vec![json!({"id": 1}), json!({"id": 11})])
        }));
    store.load().await.unwrap();

    assert_eq!(store.load_parents(&record(111)).await.unwrap(), Some(vec![0, 1, 0]));
    assert_eq!(store.load_parents(&record(999)).await.unwrap(), None);
}

#[tokio::test]
async fn test_load_parents_without_discovery() {
    let store = TreeStore::remote(config(), backend(), "/nodes").unwrap();
    store.load().await.unwrap();
    assert_eq!(store.load_parents(&record(111)).await.unwrap(), None);
}

#[tokio::test]
async fn test_root_paging_is_remote() {
    let transport = MockTransport::replying(json!({
        "records": [{"id": 1}, {"id": 2}],
        "total": 7
    }));
    let mut config = config();
    config.store.limit = 2;
    let store = TreeStore::remote(config, transport.clone(), "/nodes").unwrap();
    store.load().await.unwrap();
    assert_eq!(store.get_total_page(), 4);

    store.load_page(4).await.unwrap();
    assert_eq!(param(&transport.last_request().unwrap(), "start").as_deref(), Some("6"));
}

#[tokio::test]
async fn test_tree_load_failure() {
    let store = TreeStore::remote(
        config(),
        MockTransport::failing(NetworkError::Connection("refused".into())),
        "/nodes",
    )
    .unwrap();
    assert!(store.load().await.is_err());
    assert!(store.is_loaded());
    assert_eq!(store.get_count(), 0);
    assert!(store.last_error().unwrap().contains("refused"));
}

#[tokio::test]
async fn test_children_key_is_not_a_field() {
    let store = TreeStore::local(config(), vec![json!({"id": 1, "children": [{"id": 2}]})]).unwrap();
    store.load().await.unwrap();
    let root = store.get_at(&[0]).unwrap();
    assert!(root.get("children").is_none());
    assert_eq!(root.to_json(), json!({"id": 1}));
}
