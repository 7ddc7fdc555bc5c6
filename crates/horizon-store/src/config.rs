//! Store configuration.
//!
//! Configuration deserializes from JSON or TOML with camelCase keys; every
//! key is optional.
//!
//! ```toml
//! primaryKeys = ["id"]
//! limit = 20
//! remoteSort = true
//! filterMode = "OR"
//!
//! [sorters]
//! age = "ASC"
//!
//! [filters.name]
//! value = "ann"
//! operator = "like"
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::{Result, StoreError};
use crate::model::{FieldDef, FilterMode, Filters, Schema, Sorters};

/// Configuration of a flat [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Fields forming a record's identity. Empty means every field.
    pub primary_keys: Vec<String>,
    /// Declared fields. Empty means an open schema.
    pub fields: Vec<FieldDef>,
    /// Extra parameters sent with every load.
    pub params: Map<String, Json>,
    /// Initial sorters.
    pub sorters: Sorters,
    /// Delegate sorting to the backend.
    pub remote_sort: bool,
    /// Initial filters.
    pub filters: Filters,
    /// How filters combine.
    pub filter_mode: FilterMode,
    /// Delegate filtering to the backend.
    pub remote_filter: bool,
    /// Page size; `0` disables paging.
    pub limit: usize,
    /// Initial page, 1-based.
    pub page: usize,
    /// Response key holding the record array.
    pub records_field: String,
    /// Response key holding the total count.
    pub total_field: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            primary_keys: Vec::new(),
            fields: Vec::new(),
            params: Map::new(),
            sorters: Sorters::new(),
            remote_sort: false,
            filters: Filters::new(),
            filter_mode: FilterMode::And,
            remote_filter: false,
            limit: 0,
            page: 1,
            records_field: "records".to_string(),
            total_field: "total".to_string(),
        }
    }
}

impl StoreConfig {
    /// Parse from a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(StoreError::Config("page is 1-based".to_string()));
        }
        if self.records_field.is_empty() || self.total_field.is_empty() {
            return Err(StoreError::Config(
                "recordsField and totalField must not be empty".to_string(),
            ));
        }
        self.schema().map(|_| ())
    }

    /// Build the record schema.
    pub fn schema(&self) -> Result<Schema> {
        if self.fields.is_empty() {
            Ok(Schema::open(self.primary_keys.iter().cloned()))
        } else {
            Schema::new(self.fields.clone(), self.primary_keys.iter().cloned())
        }
    }

    /// Builder: set primary keys.
    pub fn with_primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Builder: enable backend sorting.
    pub fn with_remote_sort(mut self, remote: bool) -> Self {
        self.remote_sort = remote;
        self
    }

    /// Builder: enable backend filtering.
    pub fn with_remote_filter(mut self, remote: bool) -> Self {
        self.remote_filter = remote;
        self
    }

    /// Builder: set initial sorters.
    pub fn with_sorters(mut self, sorters: Sorters) -> Self {
        self.sorters = sorters;
        self
    }
}

/// Configuration of a [`TreeStore`](crate::TreeStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeStoreConfig {
    /// Settings shared with flat stores.
    #[serde(flatten)]
    pub store: StoreConfig,
    /// Key holding a node's children in raw records.
    pub children_field: String,
    /// Children are fetched from the backend on expand.
    pub remote_expand: bool,
    /// Expand every node after a filter so matches are visible.
    pub expand_on_filter: bool,
}

impl Default for TreeStoreConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            children_field: "children".to_string(),
            remote_expand: false,
            expand_on_filter: true,
        }
    }
}

impl TreeStoreConfig {
    /// Parse from a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.children_field.is_empty() {
            return Err(StoreError::Config("childrenField must not be empty".to_string()));
        }
        if self.store.fields.iter().any(|f| f.name == self.children_field) {
            return Err(StoreError::Config(format!(
                "childrenField '{}' cannot be a declared field",
                self.children_field
            )));
        }
        self.store.validate()
    }

    /// Builder: enable backend child loading.
    pub fn with_remote_expand(mut self, remote: bool) -> Self {
        self.remote_expand = remote;
        self
    }
}

impl From<StoreConfig> for TreeStoreConfig {
    fn from(store: StoreConfig) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldType, FilterOperator, SortDirection};

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.page, 1);
        assert_eq!(config.limit, 0);
        assert_eq!(config.filter_mode, FilterMode::And);
        assert_eq!(config.records_field, "records");
        assert!(config.schema().unwrap().is_open());

        let tree = TreeStoreConfig::default();
        assert!(tree.expand_on_filter);
        assert_eq!(tree.children_field, "children");
    }

    #[test]
    fn test_from_json() {
        let config = StoreConfig::from_json_str(
            r#"{
                "primaryKeys": ["id"],
                "fields": ["id", {"name": "age", "type": "int"}],
                "sorters": {"age": "DESC"},
                "filters": {"age": {"value": 18, "operator": ">="}},
                "filterMode": "OR",
                "remoteSort": true,
                "limit": 25,
                "recordsField": "rows"
            }"#,
        )
        .unwrap();
        assert_eq!(config.limit, 25);
        assert!(config.remote_sort);
        assert_eq!(config.filter_mode, FilterMode::Or);
        assert_eq!(config.records_field, "rows");
        assert_eq!(config.total_field, "total");
        assert_eq!(config.sorters, Sorters::single("age", SortDirection::Desc));
        assert_eq!(
            config.filters.get("age").unwrap().operator(),
            FilterOperator::Ge
        );
        assert_eq!(config.schema().unwrap().field("age").unwrap().ty, FieldType::Int);
    }

    #[test]
    fn test_tree_from_toml() {
        let config = TreeStoreConfig::from_toml_str(
            r#"
primaryKeys = ["id"]
limit = 10
childrenField = "items"
remoteExpand = true
expandOnFilter = false

[sorters]
name = "ASC"
"#,
        )
        .unwrap();
        assert_eq!(config.store.limit, 10);
        assert_eq!(config.children_field, "items");
        assert!(config.remote_expand);
        assert!(!config.expand_on_filter);
        assert_eq!(config.store.sorters.len(), 1);
    }

    #[test]
    fn test_rejects_bad_operator_and_page() {
        assert!(StoreConfig::from_json_str(r#"{"filters": {"a": {"value": 1, "operator": "~"}}}"#).is_err());
        assert!(matches!(
            StoreConfig::from_json_str(r#"{"page": 0}"#),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_json_str(r#"{"primaryKeys": ["id"], "fields": ["name"]}"#),
            Err(StoreError::Config(_))
        ));
    }
}
