//! Selection and expansion survive reloads.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{MockTransport, tree_backend};
use horizon_store::reconcile::restore_expanded_rows;
use horizon_store::{
    ExpansionState, GridBinding, SelectionFlags, SelectionMode, SelectionModel, SortDirection,
    Store, StoreConfig, TreeBinding, TreeStore, TreeStoreConfig,
};
use parking_lot::Mutex;
use serde_json::json;

fn rows(ids: &[i64]) -> serde_json::Value {
    let records: Vec<_> = ids.iter().map(|id| json!({"id": id, "name": format!("n{id}")})).collect();
    json!({ "success": true, "records": records, "total": ids.len() })
}

fn grid(transport: MockTransport) -> Arc<Store> {
    Arc::new(
        Store::remote(StoreConfig::default().with_primary_keys(["id"]), transport, "/rows").unwrap(),
    )
}

#[tokio::test]
async fn test_keepable_selection_survives_reload() {
    let store = grid(MockTransport::sequence(vec![rows(&[1, 4, 7, 9]), rows(&[7, 2, 3])]));
    let selection = Arc::new(Mutex::new(SelectionModel::new()));
    selection.lock().set_keepable(true);
    let binding = GridBinding::new(&store, selection.clone());

    store.load().await.unwrap();
    let seven = store.get_at(2).unwrap();
    selection.lock().select(&seven, SelectionFlags::SELECT);

    store.reload().await.unwrap();
    assert!(binding.is_row_selected(0));
    assert!(!binding.is_row_selected(1));
    assert!(!binding.is_row_selected(2));
    assert_eq!(selection.lock().selected_rows(), &[0]);
}

fn page(ids: &[i64], total: usize) -> serde_json::Value {
    let records: Vec<_> = ids.iter().map(|id| json!({"id": id})).collect();
    json!({ "records": records, "total": total })
}

#[tokio::test]
async fn test_keepable_selection_follows_record_to_another_page() {
    let transport = MockTransport::sequence(vec![
        page(&[7, 1], 4),
        page(&[1, 2], 4),
        page(&[7, 9], 4),
    ]);
    let store = Arc::new(
        Store::remote(
            StoreConfig::default().with_primary_keys(["id"]).with_limit(2),
            transport.clone(),
            "/rows",
        )
        .unwrap(),
    );
    let selection = Arc::new(Mutex::new(SelectionModel::new()));
    selection.lock().set_keepable(true);
    let binding = GridBinding::new(&store, selection.clone());

    store.load().await.unwrap();
    let seven = store.get_at(0).unwrap();
    selection.lock().select(&seven, SelectionFlags::SELECT);

    store.reload().await.unwrap();
    assert!(!binding.is_row_selected(0));
    assert!(!binding.is_row_selected(1));
    assert_eq!(selection.lock().dangling(), &[seven.hash()]);

    store.load_page(2).await.unwrap();
    assert_eq!(common::param(&transport.last_request().unwrap(), "start").as_deref(), Some("2"));
    assert!(binding.is_row_selected(0));
    assert_eq!(selection.lock().selected_rows(), &[0]);
    assert!(selection.lock().dangling().is_empty());
}

#[tokio::test]
async fn test_selection_is_dropped_on_reload_by_default() {
    let store = grid(MockTransport::replying(rows(&[1, 7])));
    let selection = Arc::new(Mutex::new(SelectionModel::new()));
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    selection
        .lock()
        .selection_changed
        .connect(move |(selected, deselected)| sink.lock().push((selected.len(), deselected.len())));
    let _binding = GridBinding::new(&store, selection.clone());

    store.load().await.unwrap();
    let record = store.get_at(1).unwrap();
    selection.lock().select(&record, SelectionFlags::SELECT);
    store.reload().await.unwrap();

    assert!(!selection.lock().has_selection());
    assert_eq!(*changes.lock(), vec![(0, 0), (1, 0), (0, 1)]);
}

#[tokio::test]
async fn test_selection_follows_local_sort_and_filter() {
    let data = vec![json!({"id": 1, "age": 30}), json!({"id": 2, "age": 20}), json!({"id": 3, "age": 10})];
    let store = Arc::new(Store::local(StoreConfig::default().with_primary_keys(["id"]), data).unwrap());
    let selection = Arc::new(Mutex::new(SelectionModel::new()));
    selection.lock().set_selection_mode(SelectionMode::Multi);
    let binding = GridBinding::new(&store, selection.clone());

    store.load().await.unwrap();
    let first = store.get_at(0).unwrap();
    selection.lock().select(&first, SelectionFlags::SELECT);

    store.sort("age", SortDirection::Asc).await.unwrap();
    assert!(binding.is_row_selected(2));

    store
        .set_filter("age", 25, horizon_store::FilterOperator::Lt)
        .await
        .unwrap();
    assert!(selection.lock().has_selection());
    assert_eq!(selection.lock().dangling(), &[first.hash()]);

    store.clear_filters().await.unwrap();
    assert!(binding.is_row_selected(2));
    assert!(selection.lock().dangling().is_empty());
}

#[tokio::test]
async fn test_dropping_binding_disconnects() {
    let store = grid(MockTransport::replying(rows(&[1])));
    let selection = Arc::new(Mutex::new(SelectionModel::new()));
    let binding = GridBinding::new(&store, selection.clone());
    drop(binding);

    store.load().await.unwrap();
    let record = store.get_at(0).unwrap();
    selection.lock().select(&record, SelectionFlags::SELECT);
    store.reload().await.unwrap();
    assert!(selection.lock().has_selection());
}

/// 1 ─┬─ 10
///    ├─ 11
///    └─ 12 ── 121
fn tree() -> Arc<TreeStore> {
    let mut children = HashMap::new();
    children.insert(
        json!({"id": 1}).to_string(),
        vec![json!({"id": 10}), json!({"id": 11}), json!({"id": 12, "children": true})],
    );
    children.insert(json!({"id": 12}).to_string(), vec![json!({"id": 121})]);
    let transport = tree_backend(vec![json!({"id": 1, "children": true})], children);
    let config: TreeStoreConfig = StoreConfig::default().with_primary_keys(["id"]).into();
    Arc::new(TreeStore::remote(config, transport, "/nodes").unwrap())
}

#[tokio::test]
async fn test_expansion_replay_after_reload() {
    let store = tree();
    let selection = Arc::new(Mutex::new(SelectionModel::new()));
    let binding = TreeBinding::new(&store, selection);

    store.load().await.unwrap();
    store.expand([0]).await.unwrap();
    store.expand([0, 2]).await.unwrap();

    store.reload().await.unwrap();
    assert!(!store.is_expanded([0]));
    assert_eq!(binding.expansion().len(), 2);

    assert_eq!(binding.restore().await.unwrap(), 2);
    assert!(store.is_expanded([0]));
    assert!(store.is_expanded([0, 2]));
    let grandchildren = store.get_children([0, 2]).unwrap();
    assert_eq!(grandchildren.len(), 1);
    assert_eq!(grandchildren[0].value("id"), &horizon_store::Value::Int(121));
}

#[tokio::test]
async fn test_collapsed_tree_stays_collapsed_after_reload() {
    let store = tree();
    let binding = TreeBinding::new(&store, Arc::new(Mutex::new(SelectionModel::new())));

    store.load().await.unwrap();
    store.expand([0]).await.unwrap();
    store.reload().await.unwrap();
    assert_eq!(binding.restore().await.unwrap(), 1);

    assert!(store.collapse([0]));
    store.reload().await.unwrap();
    assert!(binding.expansion().is_empty());
    assert_eq!(binding.restore().await.unwrap(), 0);
    assert!(!store.is_expanded([0]));
}

#[tokio::test]
async fn test_restore_skips_missing_nodes() {
    let store = tree();
    store.load().await.unwrap();
    store.expand([0]).await.unwrap();

    let mut state = ExpansionState::capture(&store);
    let mut gone = store.get_at(&[0, 0]).unwrap();
    gone.set("id", 99);
    state.record_expanded(1, gone);

    store.reload().await.unwrap();
    assert_eq!(restore_expanded_rows(&store, &state).await.unwrap(), 1);
    assert!(store.is_expanded([0]));
}

#[tokio::test]
async fn test_tree_selection_tracks_rendered_rows() {
    let store = tree();
    let selection = Arc::new(Mutex::new(SelectionModel::new()));
    selection.lock().set_keepable(true);
    let _binding = TreeBinding::new(&store, selection.clone());

    store.load().await.unwrap();
    store.expand([0]).await.unwrap();
    let eleven = store.get_at(&[0, 1]).unwrap();
    selection.lock().select(&eleven, SelectionFlags::SELECT);

    store.collapse([0]);
    assert!(selection.lock().selected_rows().is_empty());
    store.expand([0]).await.unwrap();
    assert_eq!(selection.lock().selected_rows(), &[2]);
}
