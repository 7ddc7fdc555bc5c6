//! Error types for stores.

use horizon_store_net::NetworkError;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while loading, deriving or committing store data.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The transport failed to deliver a request or response.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// The backend answered with `success: false`.
    #[error("backend reported failure: {message}")]
    Backend { message: String },

    /// The backend answered with a body that does not follow the load contract.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A raw value does not fit the declared field type.
    #[error("invalid value for field '{field}': {message}")]
    Schema { field: String, message: String },

    /// A filter named an operator the evaluator does not know.
    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),

    /// A filter value has the wrong shape for its operator.
    #[error("invalid value for '{operator}' filter on '{field}': {message}")]
    InvalidFilterValue {
        field: String,
        operator: String,
        message: String,
    },

    /// A sort direction other than `ASC` or `DESC`.
    #[error("invalid sort direction '{0}'")]
    InvalidSortDirection(String),

    /// Inconsistent store configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse failure.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A tree path or node id does not resolve against the current data.
    #[error("tree node not found")]
    NodeNotFound,
}

impl StoreError {
    /// Create a schema error.
    pub fn schema(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a filter value error.
    pub fn invalid_filter_value(
        field: impl Into<String>,
        operator: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidFilterValue {
            field: field.into(),
            operator: operator.into(),
            message: message.into(),
        }
    }
}
