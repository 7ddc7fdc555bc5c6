//! The transport seam between stores and a backend.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::http::TransportRequest;

/// Sends store requests to a backend and returns the decoded JSON body.
///
/// [`HttpClient`](crate::HttpClient) is the production implementation; tests
/// and embedded backends can implement this trait directly. A transport only
/// moves bytes: interpreting `success`, `records` and `total` is the store's
/// job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the response body.
    async fn send(&self, request: TransportRequest) -> Result<Value>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: TransportRequest) -> Result<Value> {
        (**self).send(request).await
    }
}
