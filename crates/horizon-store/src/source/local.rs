//! In-memory data source.

use async_trait::async_trait;
use horizon_store_core::logging::targets;
use parking_lot::RwLock;
use serde_json::Value as Json;

use super::{CommitRequest, DataSource, LoadQuery, LoadResponse};
use crate::error::Result;

/// A data source over an in-memory array of JSON records.
///
/// Loads return the whole array; the store sorts, filters and pages locally.
/// Commits are merged back into the array so a reload sees them. A commit
/// is applied only if every patched row is found.
#[derive(Debug, Default)]
pub struct LocalSource {
    data: RwLock<Vec<Json>>,
    children_field: Option<String>,
}

impl LocalSource {
    /// Create a source over `data`.
    pub fn new(data: Vec<Json>) -> Self {
        Self {
            data: RwLock::new(data),
            children_field: None,
        }
    }

    /// Also search the nested arrays under `field` when committing.
    pub fn with_children_field(mut self, field: impl Into<String>) -> Self {
        self.children_field = Some(field.into());
        self
    }

    /// Replace the backing data. Takes effect on the next load.
    pub fn set_data(&self, data: Vec<Json>) {
        *self.data.write() = data;
    }

    /// Snapshot of the backing data.
    pub fn data(&self) -> Vec<Json> {
        self.data.read().clone()
    }
}

fn matches_origin(item: &Json, origin: &Json) -> bool {
    match (item.as_object(), origin.as_object()) {
        (Some(item), Some(origin)) => origin
            .iter()
            .all(|(key, value)| item.get(key).unwrap_or(&Json::Null) == value),
        _ => false,
    }
}

/// Index path of the first row matching `origin`, top level first.
fn locate(items: &[Json], origin: &Json, children_field: Option<&str>) -> Option<Vec<usize>> {
    let mut queue = std::collections::VecDeque::from([(Vec::new(), items)]);
    while let Some((prefix, level)) = queue.pop_front() {
        for (i, item) in level.iter().enumerate() {
            let mut path = prefix.clone();
            path.push(i);
            if matches_origin(item, origin) {
                return Some(path);
            }
            if let Some(children) = children_field
                .and_then(|field| item.get(field))
                .and_then(Json::as_array)
            {
                queue.push_back((path, children.as_slice()));
            }
        }
    }
    None
}

fn item_at_mut<'a>(
    items: &'a mut [Json],
    path: &[usize],
    children_field: Option<&str>,
) -> Option<&'a mut Json> {
    let (first, rest) = path.split_first()?;
    let mut item = items.get_mut(*first)?;
    for &i in rest {
        item = item.get_mut(children_field?)?.get_mut(i)?;
    }
    Some(item)
}

#[async_trait]
impl DataSource for LocalSource {
    fn is_remote(&self) -> bool {
        false
    }

    async fn fetch(&self, query: &LoadQuery) -> Result<LoadResponse> {
        if query.parent.is_some() || query.child.is_some() {
            // Hierarchy lives in the records themselves.
            return Ok(LoadResponse::ok(Vec::new(), Some(0)));
        }
        let records = self.data.read().clone();
        let total = records.len();
        Ok(LoadResponse::ok(records, Some(total)))
    }

    async fn commit(&self, request: &CommitRequest) -> Result<bool> {
        let children_field = self.children_field.as_deref();
        let mut data = self.data.write();
        let mut located = Vec::with_capacity(request.records.len());
        for patch in &request.records {
            let Some(path) = locate(&data, &patch.origin, children_field) else {
                tracing::warn!(target: targets::STORE, origin = %patch.origin, "no row matches commit origin");
                return Ok(false);
            };
            located.push((path, &patch.updated));
        }
        for (path, updated) in located {
            let target = item_at_mut(&mut data, &path, children_field).and_then(Json::as_object_mut);
            if let (Some(target), Some(updated)) = (target, updated.as_object()) {
                for (key, value) in updated {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RecordPatch;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_returns_everything() {
        let source = LocalSource::new(vec![json!({"id": 1}), json!({"id": 2})]);
        let response = source
            .fetch(&LoadQuery {
                page: 2,
                limit: 1,
                ..LoadQuery::default()
            })
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.records.len(), 2);
        assert_eq!(response.total, Some(2));
        assert!(!source.is_remote());
    }

    #[tokio::test]
    async fn test_commit_merges_patches() {
        let source = LocalSource::new(vec![json!({"id": 1, "name": "A"}), json!({"id": 2, "name": "B"})]);
        let ok = source
            .commit(&CommitRequest {
                records: vec![RecordPatch {
                    origin: json!({"id": 2}),
                    updated: json!({"name": "Bea"}),
                }],
                ..CommitRequest::default()
            })
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(source.data()[1], json!({"id": 2, "name": "Bea"}));
        assert_eq!(source.data()[0], json!({"id": 1, "name": "A"}));
    }

    fn patch(origin: Json, updated: Json) -> RecordPatch {
        RecordPatch { origin, updated }
    }

    #[tokio::test]
    async fn test_commit_reaches_nested_rows() {
        let source = LocalSource::new(vec![json!({"id": "A", "children": [{"id": "B", "name": "b"}]})])
            .with_children_field("children");
        let ok = source
            .commit(&CommitRequest {
                records: vec![patch(json!({"id": "B"}), json!({"name": "Bee"}))],
                ..CommitRequest::default()
            })
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(source.data()[0]["children"][0], json!({"id": "B", "name": "Bee"}));
    }

    #[tokio::test]
    async fn test_commit_with_unknown_origin_changes_nothing() {
        let source = LocalSource::new(vec![json!({"id": 1, "name": "A"}), json!({"id": 2, "name": "B"})]);
        let ok = source
            .commit(&CommitRequest {
                records: vec![
                    patch(json!({"id": 1}), json!({"name": "Ay"})),
                    patch(json!({"id": 9}), json!({"name": "Nine"})),
                ],
                ..CommitRequest::default()
            })
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(source.data()[0], json!({"id": 1, "name": "A"}));
    }
}
