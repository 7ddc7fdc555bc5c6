//! Data sources behind a store.
//!
//! A [`DataSource`] answers load queries and accepts commits. The crate ships
//! an in-memory [`LocalSource`] and a [`RemoteSource`] that speaks the JSON
//! load/commit contract over any [`Transport`](horizon_store_net::Transport).

mod local;
mod remote;

pub use local::LocalSource;
pub use remote::{RemoteConfig, RemoteSource};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::error::{Result, StoreError};
use crate::model::{FilterMode, Filters, Sorters};

/// Response keys to read records and totals from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseShape {
    /// Key of the record array.
    pub records_field: String,
    /// Key of the total count.
    pub total_field: String,
}

impl Default for ResponseShape {
    fn default() -> Self {
        Self {
            records_field: "records".to_string(),
            total_field: "total".to_string(),
        }
    }
}

/// Everything a source needs to answer one load.
///
/// Optional criteria are `Some` only when the store delegates that concern to
/// the backend; a source must not apply anything that is `None`.
#[derive(Debug, Clone, Default)]
pub struct LoadQuery {
    /// 1-based page.
    pub page: usize,
    /// Page size; `0` means unpaged.
    pub limit: usize,
    /// Declared field names, when the schema is closed.
    pub fields: Vec<String>,
    /// Backend sorting criteria.
    pub sorters: Option<Sorters>,
    /// Backend filtering criteria.
    pub filters: Option<Filters>,
    /// How backend filters combine.
    pub filter_mode: FilterMode,
    /// Store parameters.
    pub params: Map<String, Json>,
    /// Primary key of the node whose children are requested.
    pub parent: Option<Json>,
    /// Primary key of the node whose ancestor chain is requested.
    pub child: Option<Json>,
    /// Response layout.
    pub shape: ResponseShape,
}

impl LoadQuery {
    /// Offset of the first record of the page.
    pub fn start(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Encode as request parameters.
    ///
    /// Store parameters come first; only the parameters of enabled modes are
    /// present. Structured values are JSON-encoded strings.
    pub fn to_params(&self) -> Map<String, Json> {
        let mut params = self.params.clone();
        if !self.fields.is_empty() {
            params.insert("fields".into(), Json::String(Json::from(self.fields.clone()).to_string()));
        }
        if self.limit > 0 {
            params.insert("start".into(), Json::from(self.start()));
            params.insert("limit".into(), Json::from(self.limit));
        }
        if let Some(sorters) = self.sorters.as_ref().filter(|s| !s.is_empty()) {
            params.insert("sorters".into(), Json::String(sorters.to_json().to_string()));
        }
        if let Some(filters) = self.filters.as_ref().filter(|f| !f.is_empty()) {
            params.insert("filters".into(), Json::String(filters.to_json().to_string()));
            params.insert("filterMode".into(), Json::from(self.filter_mode.as_str()));
        }
        if let Some(parent) = &self.parent {
            params.insert("parent".into(), Json::String(parent.to_string()));
        }
        if let Some(child) = &self.child {
            params.insert("child".into(), Json::String(child.to_string()));
        }
        params
    }
}

/// A parsed load response.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResponse {
    /// Whether the backend reported success.
    pub success: bool,
    /// Backend message, usually set on failure.
    pub message: Option<String>,
    /// Raw record objects.
    pub records: Vec<Json>,
    /// Total matching records across all pages, if reported.
    pub total: Option<usize>,
    /// The full response body.
    pub raw: Json,
}

impl LoadResponse {
    /// A successful response carrying `records`.
    pub fn ok(records: Vec<Json>, total: Option<usize>) -> Self {
        Self {
            success: true,
            message: None,
            raw: Json::Null,
            records,
            total,
        }
    }

    /// Parse a response body.
    ///
    /// A missing `success` key counts as success. A missing record array is an
    /// empty page; a record key holding anything but an array is malformed.
    pub fn from_json(raw: Json, shape: &ResponseShape) -> Result<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| StoreError::MalformedResponse(format!("expected an object, got {raw}")))?;
        let success = object.get("success").and_then(Json::as_bool).unwrap_or(true);
        let message = object
            .get("message")
            .and_then(Json::as_str)
            .map(str::to_string);
        let records = match object.get(&shape.records_field) {
            None | Some(Json::Null) => Vec::new(),
            Some(Json::Array(items)) => items.clone(),
            Some(other) => {
                return Err(StoreError::MalformedResponse(format!(
                    "'{}' is not an array: {other}",
                    shape.records_field
                )));
            }
        };
        let total = object
            .get(&shape.total_field)
            .and_then(|t| t.as_u64().or_else(|| t.as_str().and_then(|s| s.parse().ok())))
            .map(|t| t as usize);
        Ok(Self {
            success,
            message,
            records,
            total,
            raw,
        })
    }
}

/// One record in a commit payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPatch {
    /// Committed primary-key values locating the row.
    pub origin: Json,
    /// Changed fields (every field for a full commit).
    pub updated: Json,
}

/// A commit payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitRequest {
    /// Patched records.
    pub records: Vec<RecordPatch>,
    /// Store parameters.
    pub params: Map<String, Json>,
}

/// Backend of a store.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Returns `true` if sorting, filtering and paging can be delegated.
    fn is_remote(&self) -> bool;

    /// Answer a load query.
    async fn fetch(&self, query: &LoadQuery) -> Result<LoadResponse>;

    /// Persist record changes. Returns the backend's verdict.
    async fn commit(&self, request: &CommitRequest) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Filter, FilterOperator, SortDirection};
    use serde_json::json;

    #[test]
    fn test_params_only_for_enabled_modes() {
        let query = LoadQuery {
            page: 3,
            limit: 20,
            ..LoadQuery::default()
        };
        let params = query.to_params();
        assert_eq!(params["start"], json!(40));
        assert_eq!(params["limit"], json!(20));
        assert!(!params.contains_key("sorters"));
        assert!(!params.contains_key("filters"));
        assert!(!params.contains_key("fields"));

        let unpaged = LoadQuery::default().to_params();
        assert!(!unpaged.contains_key("start"));
    }

    #[test]
    fn test_params_encoding() {
        let mut extra = Map::new();
        extra.insert("tenant".into(), json!("acme"));
        let query = LoadQuery {
            page: 1,
            limit: 0,
            fields: vec!["id".into(), "age".into()],
            sorters: Some(Sorters::single("age", SortDirection::Asc)),
            filters: Some(Filters::new().with(Filter::new("age", 30, FilterOperator::Ge).unwrap())),
            filter_mode: FilterMode::Or,
            params: extra,
            parent: Some(json!({"id": 4})),
            ..LoadQuery::default()
        };
        let params = query.to_params();
        assert_eq!(params.keys().next().map(String::as_str), Some("tenant"));
        assert_eq!(params["fields"], json!(r#"["id","age"]"#));
        assert_eq!(params["sorters"], json!(r#"{"age":"ASC"}"#));
        assert_eq!(params["filters"], json!(r#"{"age":{"value":30,"operator":">="}}"#));
        assert_eq!(params["filterMode"], json!("OR"));
        assert_eq!(params["parent"], json!(r#"{"id":4}"#));
        assert!(!params.contains_key("child"));
    }

    #[test]
    fn test_response_parsing() {
        let shape = ResponseShape {
            records_field: "rows".into(),
            total_field: "count".into(),
        };
        let response =
            LoadResponse::from_json(json!({"rows": [{"id": 1}], "count": "95"}), &shape).unwrap();
        assert!(response.success);
        assert_eq!(response.records.len(), 1);
        assert_eq!(response.total, Some(95));

        let failed = LoadResponse::from_json(
            json!({"success": false, "message": "denied"}),
            &ResponseShape::default(),
        )
        .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.message.as_deref(), Some("denied"));
        assert!(failed.records.is_empty());

        assert!(matches!(
            LoadResponse::from_json(json!({"records": 5}), &ResponseShape::default()),
            Err(StoreError::MalformedResponse(_))
        ));
        assert!(LoadResponse::from_json(json!([1]), &ResponseShape::default()).is_err());
    }
}
