//! Request types exchanged between stores and a transport.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// HTTP request methods used by the store contracts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// HTTP GET method; parameters travel in the query string.
    #[default]
    Get,
    /// HTTP POST method; parameters travel as a JSON body.
    Post,
    /// HTTP PATCH method; parameters travel as a JSON body.
    Patch,
}

impl HttpMethod {
    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Patch => reqwest::Method::PATCH,
        }
    }

    /// Returns `true` if parameters are sent in the body rather than the query string.
    pub fn has_body(self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Patch => write!(f, "PATCH"),
        }
    }
}

/// A request a store hands to its [`Transport`](crate::Transport).
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    /// The HTTP method.
    pub method: HttpMethod,
    /// Absolute URL, or a path resolved against the client's base URL.
    pub url: String,
    /// Request parameters.
    pub params: Map<String, Value>,
}

impl TransportRequest {
    /// Create a request with no parameters.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Map::new(),
        }
    }

    /// Create a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Create a POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Create a PATCH request.
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    /// Add a parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Merge a parameter map; later keys overwrite earlier ones.
    pub fn params(mut self, params: Map<String, Value>) -> Self {
        self.params.extend(params);
        self
    }

    /// Flatten the parameters into query-string pairs.
    ///
    /// String values are sent verbatim; every other value is JSON-encoded, and
    /// `null` parameters are omitted.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| {
                let encoded = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), encoded)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_pairs_encoding() {
        let request = TransportRequest::get("/users")
            .param("start", 20)
            .param("sorters", r#"{"age":"ASC"}"#)
            .param("flag", true)
            .param("skip", Value::Null);

        assert_eq!(
            request.query_pairs(),
            vec![
                ("start".to_string(), "20".to_string()),
                ("sorters".to_string(), r#"{"age":"ASC"}"#.to_string()),
                ("flag".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_params_merge_overwrites() {
        let mut extra = Map::new();
        extra.insert("limit".into(), json!(50));
        let request = TransportRequest::post("/x").param("limit", 10).params(extra);
        assert_eq!(request.params["limit"], json!(50));
        assert!(request.method.has_body());
        assert!(!HttpMethod::Get.has_body());
    }
}
