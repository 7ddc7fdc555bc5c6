//! Hooks for backend-driven tree loading.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::error::Result;
use crate::model::Record;

/// Fetches the children of a node on expand.
///
/// Returns raw child records; each may carry its own children key.
#[async_trait]
pub trait RemoteExpander: Send + Sync {
    /// Fetch the children of `record`.
    async fn expand(&self, record: &Record) -> Result<Vec<Json>>;
}

/// Discovers the ancestor chain of a record that is not materialized yet.
#[async_trait]
pub trait RemotePathFinder: Send + Sync {
    /// Raw ancestor records of `record`, root first, excluding `record` itself.
    async fn find_path(&self, record: &Record) -> Result<Vec<Json>>;
}

/// Adapts an async closure into a [`RemoteExpander`] or [`RemotePathFinder`].
///
/// ```ignore
/// let store = TreeStore::local(config, data)?.with_expander(FnHook(|record: Record| async move {
///     Ok(vec![json!({"id": format!("{}-child", record.value("id"))})])
/// }));
/// ```
pub struct FnHook<F>(pub F);

#[async_trait]
impl<F, Fut> RemoteExpander for FnHook<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Json>>> + Send,
{
    async fn expand(&self, record: &Record) -> Result<Vec<Json>> {
        (self.0)(record.clone()).await
    }
}

#[async_trait]
impl<F, Fut> RemotePathFinder for FnHook<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Json>>> + Send,
{
    async fn find_path(&self, record: &Record) -> Result<Vec<Json>> {
        (self.0)(record.clone()).await
    }
}
