//! Query state shared by flat and tree stores.

use serde_json::{Map, Value as Json};

use crate::config::StoreConfig;
use crate::model::{FilterMode, Filters, Schema, Sorters};
use crate::source::{LoadQuery, ResponseShape};

/// Paging, parameters and criteria of a store.
#[derive(Debug, Clone)]
pub(crate) struct QueryState {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub params: Map<String, Json>,
    pub sorters: Sorters,
    pub filters: Filters,
    pub filter_mode: FilterMode,
}

impl QueryState {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            page: config.page.max(1),
            limit: config.limit,
            total: 0,
            params: config.params.clone(),
            sorters: config.sorters.clone(),
            filters: config.filters.clone(),
            filter_mode: config.filter_mode,
        }
    }

    /// `ceil(total / limit)`, at least 1; always 1 when unpaged.
    pub fn total_pages(&self) -> usize {
        total_pages(self.total, self.limit)
    }

    pub fn build(&self, modes: &QueryModes, schema: &Schema) -> LoadQuery {
        LoadQuery {
            page: self.page,
            limit: if modes.remote_paging { self.limit } else { 0 },
            fields: schema.fields().iter().map(|f| f.name.clone()).collect(),
            sorters: modes.remote_sort.then(|| self.sorters.clone()),
            filters: modes.remote_filter.then(|| self.filters.clone()),
            filter_mode: self.filter_mode,
            params: self.params.clone(),
            parent: None,
            child: None,
            shape: modes.shape.clone(),
        }
    }
}

/// Which concerns a store delegates to its source.
#[derive(Debug, Clone)]
pub(crate) struct QueryModes {
    pub remote_sort: bool,
    pub remote_filter: bool,
    pub remote_paging: bool,
    pub shape: ResponseShape,
}

impl QueryModes {
    pub fn new(config: &StoreConfig, source_is_remote: bool) -> Self {
        Self {
            remote_sort: source_is_remote && config.remote_sort,
            remote_filter: source_is_remote && config.remote_filter,
            remote_paging: source_is_remote,
            shape: ResponseShape {
                records_field: config.records_field.clone(),
                total_field: config.total_field.clone(),
            },
        }
    }
}

/// `ceil(total / limit)`, at least 1; always 1 when `limit` is 0.
pub fn total_pages(total: usize, limit: usize) -> usize {
    if limit == 0 {
        1
    } else {
        total.div_ceil(limit).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(95, 20), 5);
        assert_eq!(total_pages(100, 20), 5);
        assert_eq!(total_pages(0, 20), 1);
        assert_eq!(total_pages(95, 0), 1);
    }

    #[test]
    fn test_local_source_never_delegates() {
        let config = StoreConfig::default()
            .with_remote_sort(true)
            .with_remote_filter(true)
            .with_limit(10);
        let modes = QueryModes::new(&config, false);
        let query = QueryState::from_config(&config).build(&modes, &Schema::default());
        assert!(query.sorters.is_none());
        assert!(query.filters.is_none());
        assert_eq!(query.limit, 0);

        let remote = QueryModes::new(&config, true);
        let query = QueryState::from_config(&config).build(&remote, &Schema::default());
        assert!(query.sorters.is_some());
        assert_eq!(query.limit, 10);
    }
}
