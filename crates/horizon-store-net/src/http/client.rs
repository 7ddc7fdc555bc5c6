//! HTTP client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use horizon_store_core::logging::targets;
use serde_json::Value;

use super::request::{HttpMethod, TransportRequest};
use crate::error::{NetworkError, Result};
use crate::transport::Transport;

/// Configuration for the HTTP client.
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// Base URL that relative request paths are resolved against.
    pub base_url: Option<url::Url>,
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Default user agent.
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            user_agent: Some(format!("HorizonStore/{} (Rust)", env!("CARGO_PKG_VERSION"))),
        }
    }
}

/// Authentication credentials attached to every request.
#[derive(Clone, Debug)]
pub enum Authentication {
    /// HTTP Basic authentication.
    Basic {
        /// Username.
        username: String,
        /// Password (optional).
        password: Option<String>,
    },
    /// Bearer token authentication.
    Bearer(String),
}

/// Builder for creating an HTTP client with custom configuration.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    default_headers: http::HeaderMap,
    auth: Option<Authentication>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: HttpClientConfig::default(),
            default_headers: http::HeaderMap::new(),
            auth: None,
        }
    }

    /// Set the base URL for relative request paths.
    pub fn base_url(mut self, base_url: impl AsRef<str>) -> Result<Self> {
        let mut raw = base_url.as_ref().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        self.config.base_url = Some(url::Url::parse(&raw)?);
        Ok(self)
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Disable request timeout.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Use bearer token authentication for every request.
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(Authentication::Bearer(token.into()));
        self
    }

    /// Use HTTP Basic authentication for every request.
    pub fn basic_auth(mut self, username: impl Into<String>, password: Option<&str>) -> Self {
        self.auth = Some(Authentication::Basic {
            username: username.into(),
            password: password.map(str::to_string),
        });
        self
    }

    /// Add a default header that will be sent with every request.
    pub fn default_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = http::HeaderName::from_bytes(name.as_bytes())?;
        let value = http::HeaderValue::from_str(value)?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Build the HTTP client.
    pub fn build(self) -> Result<HttpClient> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(ref ua) = self.config.user_agent {
            builder = builder.user_agent(ua);
        }
        builder = builder.default_headers(self.default_headers);

        let client = builder.build()?;

        Ok(HttpClient {
            inner: Arc::new(HttpClientInner {
                client,
                config: self.config,
                auth: self.auth,
            }),
        })
    }
}

struct HttpClientInner {
    client: reqwest::Client,
    config: HttpClientConfig,
    auth: Option<Authentication>,
}

/// A JSON-over-HTTP client implementing [`Transport`].
///
/// The client is cheaply cloneable; clones share the same connection pool
/// and configuration. GET requests carry their parameters in the query
/// string, POST and PATCH requests as a JSON object body. Every response body
/// is parsed as JSON; non-2xx statuses become [`NetworkError::HttpStatus`].
///
/// # Example
///
/// ```ignore
/// use horizon_store_net::{HttpClient, Transport, TransportRequest};
///
/// let client = HttpClient::builder()
///     .base_url("https://api.example.com/")?
///     .bearer_auth("token")
///     .build()?;
///
/// let body = client
///     .send(TransportRequest::get("users").param("limit", 20))
///     .await?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<HttpClientInner>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Get the client's configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.inner.config
    }

    /// Resolve a request URL against the configured base URL.
    pub fn resolve_url(&self, url: &str) -> Result<url::Url> {
        match url::Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.inner.config.base_url {
                Some(base) => Ok(base.join(url.trim_start_matches('/'))?),
                None => Err(NetworkError::InvalidUrl(format!(
                    "relative URL '{url}' without a base URL"
                ))),
            },
            Err(err) => Err(err.into()),
        }
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.inner.auth {
            Some(Authentication::Bearer(token)) => builder.bearer_auth(token),
            Some(Authentication::Basic { username, password }) => {
                builder.basic_auth(username, password.as_ref())
            }
            None => builder,
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.inner.config)
            .finish()
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: TransportRequest) -> Result<Value> {
        let url = self.resolve_url(&request.url)?;
        tracing::debug!(
            target: targets::HTTP,
            method = %request.method,
            url = %url,
            params = request.params.len(),
            "sending store request"
        );

        let mut builder = self
            .inner
            .client
            .request(request.method.to_reqwest(), url);
        builder = match request.method {
            HttpMethod::Get => builder.query(&request.query_pairs()),
            HttpMethod::Post | HttpMethod::Patch => builder.json(&request.params),
        };
        builder = self.apply_auth(builder);

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.ok().filter(|body| !body.is_empty());
            tracing::warn!(target: targets::HTTP, status = status.as_u16(), "store request failed");
            return Err(NetworkError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_url() {
        let client = HttpClient::builder()
            .base_url("https://api.example.com/v1")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            client.resolve_url("/users").unwrap().as_str(),
            "https://api.example.com/v1/users"
        );
        assert_eq!(
            client.resolve_url("https://other.example.com/x").unwrap().as_str(),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn test_relative_url_without_base_is_rejected() {
        let client = HttpClient::new().unwrap();
        assert!(matches!(
            client.resolve_url("users"),
            Err(NetworkError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_invalid_default_header() {
        let result = HttpClient::builder().default_header("bad header", "x");
        assert!(matches!(result, Err(NetworkError::InvalidHeader(_))));
    }
}
