//! Backend data source speaking the JSON load/commit contract.

use async_trait::async_trait;
use horizon_store_core::logging::targets;
use horizon_store_net::{HttpMethod, Transport, TransportRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::{CommitRequest, DataSource, LoadQuery, LoadResponse};
use crate::error::Result;

/// Endpoints of a [`RemoteSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Load endpoint.
    pub url: String,
    /// Load method; GET sends parameters in the query string.
    pub method: HttpMethod,
    /// Commit endpoint; defaults to the load endpoint.
    pub commit_url: Option<String>,
    /// Commit method.
    pub commit_method: HttpMethod,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: HttpMethod::Get,
            commit_url: None,
            commit_method: HttpMethod::Patch,
        }
    }
}

impl RemoteConfig {
    /// Endpoints rooted at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// A [`DataSource`] backed by a [`Transport`].
///
/// Load requests carry the store's query as parameters:
/// `start`/`limit` when paged, `sorters`, `filters` and `filterMode` when the
/// store delegates them, and `parent`/`child` for tree requests. Commits send
/// `{"records": [{"origin": ..., "updated": ...}]}` plus store parameters.
pub struct RemoteSource<T> {
    transport: T,
    config: RemoteConfig,
}

impl<T: Transport> RemoteSource<T> {
    /// Create a source loading from `url`.
    pub fn new(transport: T, url: impl Into<String>) -> Self {
        Self::with_config(transport, RemoteConfig::new(url))
    }

    /// Create a source from full endpoint configuration.
    pub fn with_config(transport: T, config: RemoteConfig) -> Self {
        Self { transport, config }
    }

    /// Use POST for loads.
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.config.method = method;
        self
    }

    /// Commit to a different endpoint.
    pub fn with_commit_url(mut self, url: impl Into<String>) -> Self {
        self.config.commit_url = Some(url.into());
        self
    }

    /// Endpoint configuration.
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T> std::fmt::Debug for RemoteSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Transport> DataSource for RemoteSource<T> {
    fn is_remote(&self) -> bool {
        true
    }

    async fn fetch(&self, query: &LoadQuery) -> Result<LoadResponse> {
        let request = TransportRequest::new(self.config.method, self.config.url.clone())
            .params(query.to_params());
        let body = self.transport.send(request).await?;
        LoadResponse::from_json(body, &query.shape)
    }

    async fn commit(&self, request: &CommitRequest) -> Result<bool> {
        let url = self
            .config
            .commit_url
            .clone()
            .unwrap_or_else(|| self.config.url.clone());
        let transport_request = TransportRequest::new(self.config.commit_method, url)
            .params(request.params.clone())
            .param("records", serde_json::to_value(&request.records)?);
        let body = self.transport.send(transport_request).await?;
        let success = body.get("success").and_then(Json::as_bool) == Some(true);
        if !success {
            tracing::warn!(
                target: targets::STORE,
                message = body.get("message").and_then(Json::as_str).unwrap_or_default(),
                "backend rejected commit"
            );
        }
        Ok(success)
    }
}
