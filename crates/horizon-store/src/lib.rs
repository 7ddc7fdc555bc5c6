//! Horizon Store - data stores for grid and tree widgets.
//!
//! This crate binds server- or client-supplied record sets to views:
//!
//! - [`Store`]: a flat record container with paging, sorting and filtering,
//!   applied locally or delegated to a backend
//! - [`TreeStore`]: a hierarchical container with lazy child loading and
//!   path discovery
//! - [`reconcile`]: selection and expansion state that survives reloads by
//!   tracking record identity instead of position
//!
//! Stores announce their lifecycle through [`StoreSignals`]: `before_load`,
//! then `load` and `update` once data is applied.
//!
//! # Example
//!
//! ```no_run
//! use horizon_store::{SortDirection, Store, StoreConfig};
//! use serde_json::json;
//!
//! # async fn run() -> horizon_store::Result<()> {
//! let config = StoreConfig::default().with_primary_keys(["id"]).with_limit(20);
//! let store = Store::local(config, vec![json!({"id": 1, "name": "Ann"})])?;
//!
//! store.signals().update.connect(|_| println!("render"));
//! store.load().await?;
//! store.sort("name", SortDirection::Asc).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod source;
pub mod store;
pub mod tree;

pub use config::{StoreConfig, TreeStoreConfig};
pub use error::{Result, StoreError};
pub use model::{
    FieldDef, FieldType, Filter, FilterMode, FilterOperator, FilterValue, Filters, Record,
    RecordHash, RecordSet, Schema, SortDirection, Sorter, Sorters, Value,
};
pub use reconcile::{
    ExpansionState, GridBinding, SelectionFlags, SelectionMode, SelectionModel, SelectionState,
    TreeBinding,
};
pub use source::{DataSource, LocalSource, RemoteConfig, RemoteSource};
pub use store::{LoadEvent, LoadOutcome, RecordChange, Store, StoreSignals};
pub use tree::{ExpandDepth, FnHook, NodeId, RemoteExpander, RemotePathFinder, TreeRow, TreeStore, TreeTarget};

pub use horizon_store_net::{HttpClient, HttpMethod, NetworkError, Transport, TransportRequest};
