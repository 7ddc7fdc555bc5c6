//! Hierarchical record store.
//!
//! A [`TreeStore`] keeps records in an arena of nodes addressed by
//! [`NodeId`]. Views address nodes by *path*: the sequence of indices into
//! the visible child list at each level, so `[0, 1]` is the second visible
//! child of the first visible root. Paths are derived on demand and shift
//! with sorting and filtering; node ids do not.
//!
//! # Children
//!
//! The children key of a raw record (`childrenField`, default `children`)
//! decides what a node holds:
//!
//! | Value            | Meaning                                   |
//! |------------------|-------------------------------------------|
//! | array            | Children are materialized                 |
//! | `true`           | Children exist and are fetched on expand  |
//! | absent           | Leaf, or fetched on expand with `remoteExpand` |
//! | `false` / `null` | Leaf                                      |
//!
//! Unfetched children are requested from a [`RemoteExpander`] when one is
//! installed, otherwise from the data source with a `parent` parameter
//! carrying the node's primary key.

mod arena;
mod remote;

pub use arena::NodeId;
pub use remote::{FnHook, RemoteExpander, RemotePathFinder};

pub(crate) use arena::{ChildLayout, TreeData};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use horizon_store_core::logging::targets;
use horizon_store_net::Transport;
use parking_lot::RwLock;
use serde_json::{Map, Value as Json};

use crate::config::TreeStoreConfig;
use crate::error::{Result, StoreError};
use crate::model::{
    Filter, FilterMode, FilterOperator, FilterValue, Filters, Record, RecordHash, Schema,
    SortDirection, Sorters, Value,
};
use crate::source::{DataSource, LoadResponse, LocalSource, RemoteSource};
use crate::store::{
    LoadEvent, LoadOutcome, PendingCommit, QueryModes, QueryState, RecordChange, StoreSignals,
};

/// Addresses a node of a [`TreeStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum TreeTarget {
    /// Visible-index path.
    Path(Vec<usize>),
    /// Node id.
    Node(NodeId),
    /// Any materialized node with the same identity.
    Record(Record),
}

impl From<Vec<usize>> for TreeTarget {
    fn from(path: Vec<usize>) -> Self {
        Self::Path(path)
    }
}

impl From<&[usize]> for TreeTarget {
    fn from(path: &[usize]) -> Self {
        Self::Path(path.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for TreeTarget {
    fn from(path: [usize; N]) -> Self {
        Self::Path(path.to_vec())
    }
}

impl From<NodeId> for TreeTarget {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<Record> for TreeTarget {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<&Record> for TreeTarget {
    fn from(record: &Record) -> Self {
        Self::Record(record.clone())
    }
}

/// How deep [`TreeStore::expand_all`] goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandDepth {
    /// Every level.
    All,
    /// Nodes at depth `< n`; `Levels(1)` expands the roots only.
    Levels(usize),
}

impl ExpandDepth {
    fn allows(self, depth: usize) -> bool {
        match self {
            Self::All => true,
            Self::Levels(levels) => depth < levels,
        }
    }
}

impl From<bool> for ExpandDepth {
    fn from(all: bool) -> Self {
        if all { Self::All } else { Self::Levels(0) }
    }
}

impl From<usize> for ExpandDepth {
    fn from(levels: usize) -> Self {
        Self::Levels(levels)
    }
}

/// One rendered row of a tree view.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeRow {
    /// Node id.
    pub id: NodeId,
    /// Nesting depth, 0 for roots.
    pub depth: usize,
    /// The node's record.
    pub record: Record,
    /// Whether the node is expanded.
    pub expanded: bool,
    /// Whether the node has, or is expected to have, children.
    pub has_child: bool,
}

enum Relation {
    Children,
    Ancestors,
}

enum ExpandStep {
    Fetch(NodeId, Record),
    Done { id: NodeId, expanded: bool, changed: bool },
}

struct TreeState {
    query: QueryState,
    loaded: bool,
    materialized: bool,
    data: TreeData,
    response: Option<Json>,
    last_error: Option<String>,
}

impl TreeState {
    fn resolve(&self, target: &TreeTarget) -> Option<NodeId> {
        match target {
            TreeTarget::Path(path) => self.data.node_at(path),
            TreeTarget::Node(id) => self.data.contains(*id).then_some(*id),
            TreeTarget::Record(record) => self.data.find_by_hash(&record.hash()),
        }
    }

    fn root_count(&self) -> usize {
        self.data.visible_children(None).len()
    }
}

/// A hierarchical store with lazy child loading.
pub struct TreeStore {
    schema: Schema,
    modes: QueryModes,
    children_field: String,
    remote_expand: bool,
    expand_on_filter: bool,
    source: Arc<dyn DataSource>,
    expander: Option<Arc<dyn RemoteExpander>>,
    path_finder: Option<Arc<dyn RemotePathFinder>>,
    state: RwLock<TreeState>,
    generation: AtomicU64,
    signals: StoreSignals,
}

impl TreeStore {
    /// Create a tree store over `source`.
    pub fn new(config: TreeStoreConfig, source: impl DataSource + 'static) -> Result<Self> {
        Self::with_source(config, Arc::new(source))
    }

    /// Create a tree store over a shared source.
    pub fn with_source(config: TreeStoreConfig, source: Arc<dyn DataSource>) -> Result<Self> {
        config.validate()?;
        let schema = config.store.schema()?;
        let modes = QueryModes::new(&config.store, source.is_remote());
        Ok(Self {
            schema,
            modes,
            children_field: config.children_field,
            remote_expand: config.remote_expand,
            expand_on_filter: config.expand_on_filter,
            source,
            expander: None,
            path_finder: None,
            state: RwLock::new(TreeState {
                query: QueryState::from_config(&config.store),
                loaded: false,
                materialized: false,
                data: TreeData::default(),
                response: None,
                last_error: None,
            }),
            generation: AtomicU64::new(0),
            signals: StoreSignals::new(),
        })
    }

    /// Create a tree store over in-memory nested records.
    pub fn local(config: TreeStoreConfig, data: Vec<Json>) -> Result<Self> {
        let source = LocalSource::new(data).with_children_field(config.children_field.clone());
        Self::new(config, source)
    }

    /// Create a tree store loading from `url` through `transport`.
    pub fn remote<T: Transport + 'static>(
        config: TreeStoreConfig,
        transport: T,
        url: impl Into<String>,
    ) -> Result<Self> {
        Self::new(config, RemoteSource::new(transport, url))
    }

    /// Fetch children through `expander` instead of the data source.
    pub fn with_expander(mut self, expander: impl RemoteExpander + 'static) -> Self {
        self.expander = Some(Arc::new(expander));
        self
    }

    /// Discover ancestor chains through `finder` instead of the data source.
    pub fn with_path_finder(mut self, finder: impl RemotePathFinder + 'static) -> Self {
        self.path_finder = Some(Arc::new(finder));
        self
    }

    fn layout(&self) -> ChildLayout<'_> {
        ChildLayout {
            children_field: &self.children_field,
            remote_expand: self.remote_expand,
        }
    }

    /// Store signals.
    pub fn signals(&self) -> &StoreSignals {
        &self.signals
    }

    /// Record schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns `true` if the source is remote.
    pub fn is_remote(&self) -> bool {
        self.source.is_remote()
    }

    /// Returns `true` once a load attempt has completed.
    pub fn is_loaded(&self) -> bool {
        self.state.read().loaded
    }

    /// Description of the last failed load.
    pub fn last_error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }

    /// Load generation; increases with every load request.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Raw body of the last load response.
    pub fn get_response(&self) -> Option<Json> {
        self.state.read().response.clone()
    }

    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    /// Load once. When already loaded, only re-emits `load` and `update`.
    pub async fn load(&self) -> Result<LoadOutcome> {
        let already = {
            let state = self.state.read();
            state.loaded.then(|| self.event(&state))
        };
        if let Some(event) = already {
            self.signals.emit_loaded(event);
            return Ok(LoadOutcome::AlreadyLoaded);
        }
        self.fetch().await
    }

    /// Fetch the roots again. Node ids from the previous load stop resolving.
    pub async fn reload(&self) -> Result<LoadOutcome> {
        self.fetch().await
    }

    async fn fetch(&self) -> Result<LoadOutcome> {
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.write().loaded = false;
        self.signals.before_load.emit(());

        let query = self.state.read().query.build(&self.modes, &self.schema);
        tracing::debug!(target: targets::TREE, generation = token, "loading tree");
        let response = self.source.fetch(&query).await;

        if self.generation.load(Ordering::SeqCst) != token {
            tracing::debug!(target: targets::TREE, generation = token, "discarding superseded load");
            return Ok(LoadOutcome::Superseded);
        }

        match self.apply(response) {
            Ok(event) => {
                self.signals.emit_loaded(event);
                Ok(LoadOutcome::Loaded { count: event.count })
            }
            Err(err) => {
                tracing::warn!(target: targets::TREE, error = %err, "tree load failed");
                let event = self.event(&self.state.read());
                self.signals.emit_loaded(event);
                Err(err)
            }
        }
    }

    fn apply(&self, response: Result<LoadResponse>) -> Result<LoadEvent> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.loaded = true;
        let parsed = match response {
            Ok(response) => {
                state.response = Some(response.raw.clone());
                if response.success {
                    state
                        .data
                        .rebuild(&self.schema, &response.records, self.layout())
                        .map(|()| response.total)
                } else {
                    Err(StoreError::Backend {
                        message: response.message.unwrap_or_else(|| "load failed".to_string()),
                    })
                }
            }
            Err(err) => {
                state.response = None;
                Err(err)
            }
        };

        match parsed {
            Ok(total) => {
                self.sync_derivation(&state.query, &mut state.data);
                state.materialized = true;
                state.last_error = None;
                state.query.total = if self.modes.remote_paging {
                    total.unwrap_or_else(|| state.root_count())
                } else {
                    state.root_count()
                };
                Ok(self.event(state))
            }
            Err(err) => {
                state.data.clear();
                state.materialized = false;
                state.query.total = 0;
                state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn sync_derivation(&self, query: &QueryState, data: &mut TreeData) {
        if self.modes.remote_sort {
            data.assume_sorted(&query.sorters);
        } else if !data.is_sorted_by(&query.sorters) {
            data.sort(&query.sorters);
        }
        if self.modes.remote_filter {
            data.assume_filtered(&query.filters, query.filter_mode);
        } else if !data.is_filtered_by(&query.filters, query.filter_mode) {
            data.filter(&query.filters, query.filter_mode);
        }
    }

    fn event(&self, state: &TreeState) -> LoadEvent {
        LoadEvent {
            success: state.materialized && state.last_error.is_none(),
            count: state.root_count(),
            total: state.query.total,
        }
    }

    async fn rederive(&self) -> Result<LoadOutcome> {
        let count = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            if state.materialized {
                self.sync_derivation(&state.query, &mut state.data);
                if !self.modes.remote_paging {
                    state.query.total = state.root_count();
                }
                Some(state.root_count())
            } else {
                None
            }
        };
        match count {
            Some(count) => {
                self.signals.update.emit(());
                Ok(LoadOutcome::Rederived { count })
            }
            None => self.load().await,
        }
    }

    // -------------------------------------------------------------------------
    // Parameters, sorting and filtering
    // -------------------------------------------------------------------------

    /// Extra load parameters.
    pub fn params(&self) -> Map<String, Json> {
        self.state.read().query.params.clone()
    }

    /// Replace the extra load parameters.
    pub fn set_params(&self, params: Map<String, Json>) {
        self.state.write().query.params = params;
    }

    /// Set one extra load parameter.
    pub fn set_param(&self, name: impl Into<String>, value: impl Into<Json>) {
        self.state.write().query.params.insert(name.into(), value.into());
    }

    /// Current sorters.
    pub fn sorters(&self) -> Sorters {
        self.state.read().query.sorters.clone()
    }

    /// Current filters.
    pub fn filters(&self) -> Filters {
        self.state.read().query.filters.clone()
    }

    /// Sort every sibling list by a single field.
    pub async fn sort(&self, field: &str, direction: SortDirection) -> Result<LoadOutcome> {
        self.multi_sort(Sorters::single(field, direction)).await
    }

    /// Replace the sorters and apply them.
    pub async fn multi_sort(&self, sorters: Sorters) -> Result<LoadOutcome> {
        self.state.write().query.sorters = sorters;
        if self.modes.remote_sort {
            self.reload().await
        } else {
            self.rederive().await
        }
    }

    /// Set or replace the filter on `field`, reset to page 1 and apply.
    pub async fn set_filter(
        &self,
        field: &str,
        value: impl Into<FilterValue>,
        operator: FilterOperator,
    ) -> Result<LoadOutcome> {
        let filter = Filter::new(field, value, operator)?;
        {
            let mut state = self.state.write();
            state.query.filters.set(filter);
            state.query.page = 1;
        }
        self.filter().await
    }

    /// Replace every filter (and optionally the mode) and apply.
    pub async fn set_filters(
        &self,
        filters: Filters,
        mode: Option<FilterMode>,
    ) -> Result<LoadOutcome> {
        {
            let mut state = self.state.write();
            state.query.filters = filters;
            if let Some(mode) = mode {
                state.query.filter_mode = mode;
            }
            state.query.page = 1;
        }
        self.filter().await
    }

    /// Remove every filter and apply.
    pub async fn clear_filters(&self) -> Result<LoadOutcome> {
        self.set_filters(Filters::new(), None).await
    }

    /// Apply the current filters.
    ///
    /// With `expandOnFilter`, every node is expanded afterwards so matches
    /// below collapsed ancestors become reachable.
    pub async fn filter(&self) -> Result<LoadOutcome> {
        let outcome = if self.modes.remote_filter {
            self.reload().await?
        } else {
            self.rederive().await?
        };
        let filtered = !self.state.read().query.filters.is_empty();
        if self.expand_on_filter && filtered && outcome != LoadOutcome::Superseded {
            self.expand_all(ExpandDepth::All).await?;
        }
        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Paging (roots only)
    // -------------------------------------------------------------------------

    /// Current 1-based page.
    pub fn page(&self) -> usize {
        self.state.read().query.page
    }

    /// Page size of the root level.
    pub fn limit(&self) -> usize {
        self.state.read().query.limit
    }

    /// Change the page size and return to page 1.
    pub fn set_limit(&self, limit: usize) {
        let mut state = self.state.write();
        state.query.limit = limit;
        state.query.page = 1;
    }

    /// Move to `page` without fetching.
    pub fn set_page(&self, page: usize) {
        self.state.write().query.page = page.max(1);
    }

    /// Move to `page` and fetch it.
    pub async fn load_page(&self, page: usize) -> Result<LoadOutcome> {
        self.set_page(page);
        self.reload().await
    }

    /// Number of root pages: `ceil(total / limit)`, at least 1; 1 when unpaged.
    pub fn get_total_page(&self) -> usize {
        self.state.read().query.total_pages()
    }

    /// Total roots across all pages.
    pub fn get_total(&self) -> usize {
        self.state.read().query.total
    }

    /// Visible roots.
    pub fn get_count(&self) -> usize {
        self.state.read().root_count()
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Records of the visible roots.
    pub fn get_records(&self) -> Vec<Record> {
        let state = self.state.read();
        state
            .data
            .visible_children(None)
            .into_iter()
            .filter_map(|id| state.data.node(id).map(|n| n.record.clone()))
            .collect()
    }

    /// Resolve a target to a node id.
    pub fn node_id(&self, target: impl Into<TreeTarget>) -> Option<NodeId> {
        self.state.read().resolve(&target.into())
    }

    /// Record of a node.
    pub fn record(&self, id: NodeId) -> Option<Record> {
        self.state.read().data.node(id).map(|n| n.record.clone())
    }

    /// Record at `path`.
    pub fn get_at(&self, path: &[usize]) -> Option<Record> {
        let state = self.state.read();
        let id = state.data.node_at(path)?;
        state.data.node(id).map(|n| n.record.clone())
    }

    /// Replace the record at `path`, keeping its children.
    pub fn set_at(&self, path: &[usize], record: Record) -> bool {
        let replaced = {
            let mut state = self.state.write();
            match state.data.node_at(path) {
                Some(id) => state.data.replace_record(id, record).is_some(),
                None => false,
            }
        };
        if replaced {
            self.signals.update.emit(());
        }
        replaced
    }

    /// Path of a visible node.
    pub fn path_of(&self, id: NodeId) -> Option<Vec<usize>> {
        self.state.read().data.path_of(id)
    }

    /// Depth of a node, 0 for roots.
    pub fn depth_of(&self, id: NodeId) -> Option<usize> {
        let state = self.state.read();
        state.data.contains(id).then(|| state.data.depth(id))
    }

    /// Visible children of a node; `None` if they are not fetched yet.
    pub fn get_children(&self, target: impl Into<TreeTarget>) -> Option<Vec<Record>> {
        let state = self.state.read();
        let id = state.resolve(&target.into())?;
        state.data.node(id)?.children.as_ref()?;
        Some(
            state
                .data
                .visible_children(Some(id))
                .into_iter()
                .filter_map(|child| state.data.node(child).map(|n| n.record.clone()))
                .collect(),
        )
    }

    /// Whether a node has, or is expected to have, children.
    pub fn has_child(&self, target: impl Into<TreeTarget>) -> bool {
        let state = self.state.read();
        state
            .resolve(&target.into())
            .is_some_and(|id| state.data.has_child(id))
    }

    /// Whether a node is expanded.
    pub fn is_expanded(&self, target: impl Into<TreeTarget>) -> bool {
        let state = self.state.read();
        state
            .resolve(&target.into())
            .and_then(|id| state.data.node(id))
            .is_some_and(|n| n.expanded)
    }

    /// The rows a tree view renders: visible nodes in pre-order, descending
    /// only into expanded nodes.
    pub fn visible_rows(&self) -> Vec<TreeRow> {
        let state = self.state.read();
        state
            .data
            .walk(true)
            .into_iter()
            .filter_map(|(id, depth)| {
                let node = state.data.node(id)?;
                Some(TreeRow {
                    id,
                    depth,
                    record: node.record.clone(),
                    expanded: node.expanded,
                    has_child: state.data.has_child(id),
                })
            })
            .collect()
    }

    /// Rendered nodes at `depth`, in display order.
    pub fn rows_at_depth(&self, depth: usize) -> Vec<TreeRow> {
        self.visible_rows()
            .into_iter()
            .filter(|row| row.depth == depth)
            .collect()
    }

    /// First visible record, in pre-order, whose `field` equals `value`.
    pub fn find(&self, field: &str, value: impl Into<Value>) -> Option<Record> {
        let state = self.state.read();
        let id = state.data.find(field, &value.into())?;
        state.data.node(id).map(|n| n.record.clone())
    }

    /// Path of the first visible record whose `field` equals `value`.
    pub fn find_path(&self, field: &str, value: impl Into<Value>) -> Option<Vec<usize>> {
        let state = self.state.read();
        let id = state.data.find(field, &value.into())?;
        state.data.path_of(id)
    }

    /// The materialized record with the same identity as `record`.
    pub fn match_record(&self, record: &Record) -> Option<Record> {
        let state = self.state.read();
        let id = state.data.find_by_hash(&record.hash())?;
        state.data.node(id).map(|n| n.record.clone())
    }

    /// Path of the visible record with the same identity as `record`.
    pub fn match_path(&self, record: &Record) -> Option<Vec<usize>> {
        let state = self.state.read();
        let id = state.data.find_by_hash(&record.hash())?;
        state.data.path_of(id)
    }

    /// Ancestors of a materialized record, root first.
    pub fn find_parents(&self, record: &Record) -> Option<Vec<Record>> {
        let state = self.state.read();
        let id = state.data.find_by_hash(&record.hash())?;
        Some(
            state
                .data
                .ancestors(id)
                .into_iter()
                .filter_map(|a| state.data.node(a).map(|n| n.record.clone()))
                .collect(),
        )
    }

    // -------------------------------------------------------------------------
    // Expansion
    // -------------------------------------------------------------------------

    /// Expand a node, fetching its children first if they are not loaded.
    ///
    /// Returns `true` if the node is expanded afterwards; leaves stay collapsed.
    pub async fn expand(&self, target: impl Into<TreeTarget>) -> Result<bool> {
        let target = target.into();
        let step = {
            let mut state = self.state.write();
            let id = state.resolve(&target).ok_or(StoreError::NodeNotFound)?;
            let node = state.data.node(id).ok_or(StoreError::NodeNotFound)?;
            if node.children.is_none() && node.has_child_hint {
                ExpandStep::Fetch(id, node.record.clone())
            } else {
                let expanded = state.data.has_child(id);
                let changed = expanded && state.data.set_expanded(id, true);
                ExpandStep::Done {
                    id,
                    expanded,
                    changed,
                }
            }
        };
        match step {
            ExpandStep::Fetch(id, record) => self.fetch_children(id, record).await,
            ExpandStep::Done {
                id,
                expanded,
                changed,
            } => {
                if changed {
                    self.signals.update_children.emit(id);
                }
                Ok(expanded)
            }
        }
    }

    /// Fetch a node's children again, replacing any loaded ones, then expand it.
    pub async fn load_children(&self, target: impl Into<TreeTarget>) -> Result<bool> {
        let (id, record) = {
            let state = self.state.read();
            let id = state.resolve(&target.into()).ok_or(StoreError::NodeNotFound)?;
            let record = state
                .data
                .node(id)
                .map(|n| n.record.clone())
                .ok_or(StoreError::NodeNotFound)?;
            (id, record)
        };
        self.fetch_children(id, record).await
    }

    async fn fetch_children(&self, id: NodeId, record: Record) -> Result<bool> {
        let token = self.generation.load(Ordering::SeqCst);
        tracing::debug!(target: targets::TREE, node = ?id, "loading children");
        let fetched = match &self.expander {
            Some(expander) => expander.expand(&record).await,
            None => self.fetch_related(&record, Relation::Children).await,
        };
        let raw = match fetched {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(target: targets::TREE, node = ?id, error = %err, "child load failed");
                return Err(err);
            }
        };
        if self.generation.load(Ordering::SeqCst) != token {
            tracing::debug!(target: targets::TREE, node = ?id, "discarding children of a superseded load");
            return Ok(false);
        }

        let expanded = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            if !state.data.contains(id) {
                return Ok(false);
            }
            state
                .data
                .set_children(id, &self.schema, &raw, self.layout())?;
            self.sync_derivation(&state.query, &mut state.data);
            let expanded = state.data.has_child(id);
            state.data.set_expanded(id, expanded);
            expanded
        };
        self.signals.update_children.emit(id);
        Ok(expanded)
    }

    async fn fetch_related(&self, record: &Record, relation: Relation) -> Result<Vec<Json>> {
        let query = {
            let state = self.state.read();
            let mut query = state.query.build(&self.modes, &self.schema);
            query.page = 1;
            query.limit = 0;
            match relation {
                Relation::Children => query.parent = Some(record.key_json()),
                Relation::Ancestors => query.child = Some(record.key_json()),
            }
            query
        };
        let response = self.source.fetch(&query).await?;
        if !response.success {
            return Err(StoreError::Backend {
                message: response
                    .message
                    .unwrap_or_else(|| "load failed".to_string()),
            });
        }
        Ok(response.records)
    }

    /// Collapse a node. Returns `false` if it was not expanded.
    pub fn collapse(&self, target: impl Into<TreeTarget>) -> bool {
        let collapsed = {
            let mut state = self.state.write();
            match state.resolve(&target.into()) {
                Some(id) => state.data.set_expanded(id, false).then_some(id),
                None => None,
            }
        };
        match collapsed {
            Some(id) => {
                self.signals.update_children.emit(id);
                true
            }
            None => false,
        }
    }

    /// Expand nodes depth-first, one at a time, down to `depth`.
    ///
    /// A node's children are visited only after its own expansion completes.
    /// Stops early if the store reloads. Returns the number of nodes expanded.
    pub async fn expand_all(&self, depth: impl Into<ExpandDepth>) -> Result<usize> {
        let depth = depth.into();
        let token = self.generation.load(Ordering::SeqCst);
        let mut stack: Vec<(NodeId, usize)> = self
            .state
            .read()
            .data
            .visible_children(None)
            .into_iter()
            .rev()
            .map(|id| (id, 0))
            .collect();
        let mut expanded = 0;
        while let Some((id, level)) = stack.pop() {
            if self.generation.load(Ordering::SeqCst) != token {
                break;
            }
            if !depth.allows(level) {
                continue;
            }
            match self.expand(TreeTarget::Node(id)).await {
                Ok(true) => expanded += 1,
                Ok(false) | Err(StoreError::NodeNotFound) => continue,
                Err(err) => return Err(err),
            }
            let children = self.state.read().data.visible_children(Some(id));
            stack.extend(children.into_iter().rev().map(|child| (child, level + 1)));
        }
        tracing::debug!(target: targets::TREE, expanded, "expanded tree");
        Ok(expanded)
    }

    /// Reveal `record`: expand its ancestors, fetching them if needed, and
    /// return its path.
    ///
    /// A materialized record only has its ancestors expanded. Otherwise the
    /// ancestor chain (root first) comes from the [`RemotePathFinder`] or, with
    /// `remoteExpand`, from the data source with a `child` parameter; each
    /// ancestor is located among the children of the previous one and
    /// expanded. Returns `None` when the chain does not resolve.
    pub async fn load_parents(&self, record: &Record) -> Result<Option<Vec<usize>>> {
        let target = record.hash();
        let local = {
            let state = self.state.read();
            state
                .data
                .find_by_hash(&target)
                .map(|id| (id, state.data.ancestors(id)))
        };
        if let Some((id, ancestors)) = local {
            for ancestor in ancestors {
                self.expand(TreeTarget::Node(ancestor)).await?;
            }
            return Ok(self.path_of(id));
        }
        if self.path_finder.is_none() && !self.remote_expand {
            return Ok(None);
        }

        let token = self.generation.load(Ordering::SeqCst);
        let chain = match &self.path_finder {
            Some(finder) => finder.find_path(record).await?,
            None => self.fetch_related(record, Relation::Ancestors).await?,
        };
        let mut parent = None;
        for raw in &chain {
            if self.generation.load(Ordering::SeqCst) != token {
                return Ok(None);
            }
            let ancestor =
                Record::from_json_skipping(&self.schema, raw, &[self.children_field.as_str()])?;
            let hash = ancestor.hash();
            if hash == target {
                break;
            }
            let found = self.state.read().data.child_by_hash(parent, &hash);
            let Some(id) = found else {
                tracing::debug!(target: targets::TREE, ancestor = %hash, "ancestor not found");
                return Ok(None);
            };
            self.expand(TreeTarget::Node(id)).await?;
            parent = Some(id);
        }
        Ok(self.child_path(parent, &target))
    }

    fn child_path(&self, parent: Option<NodeId>, hash: &RecordHash) -> Option<Vec<usize>> {
        let state = self.state.read();
        let id = state.data.child_by_hash(parent, hash)?;
        state.data.path_of(id)
    }

    // -------------------------------------------------------------------------
    // Editing
    // -------------------------------------------------------------------------

    /// Set a field of the record at `path`.
    pub fn set_value(&self, path: &[usize], field: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let change = {
            let mut state = self.state.write();
            let Some(id) = state.data.node_at(path) else {
                return false;
            };
            let Some(node) = state.data.node_mut(id) else {
                return false;
            };
            if !node.record.set(field, value.clone()) {
                return false;
            }
            let hash = node.record.hash();
            state.data.invalidate_field(field);
            RecordChange {
                hash,
                field: field.to_string(),
                value,
            }
        };
        self.signals.emit_record_changed(change);
        true
    }

    /// Replace a node's children with raw records.
    pub fn set_children(&self, target: impl Into<TreeTarget>, raw: &[Json]) -> Result<()> {
        let id = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let id = state.resolve(&target.into()).ok_or(StoreError::NodeNotFound)?;
            state.data.set_children(id, &self.schema, raw, self.layout())?;
            self.sync_derivation(&state.query, &mut state.data);
            id
        };
        self.signals.update_children.emit(id);
        Ok(())
    }

    /// Remove a node with its descendants.
    pub fn remove(&self, target: impl Into<TreeTarget>) -> Option<Record> {
        let removed = {
            let mut state = self.state.write();
            let id = state.resolve(&target.into())?;
            state.data.remove(id)
        };
        if removed.is_some() {
            self.signals.update.emit(());
        }
        removed
    }

    /// Every record with uncommitted changes.
    pub fn get_modified_records(&self) -> Vec<Record> {
        self.state
            .read()
            .data
            .iter_all()
            .filter(|(_, n)| n.record.is_dirty())
            .map(|(_, n)| n.record.clone())
            .collect()
    }

    /// Roll back every uncommitted change.
    pub fn reject_changes(&self) {
        self.state
            .write()
            .data
            .iter_all_mut()
            .for_each(|n| n.record.reject());
        self.signals.update.emit(());
    }

    /// Send changes to the source; see [`Store::commit`](crate::Store::commit).
    pub async fn commit(&self, is_all: bool) -> Result<bool> {
        let pending = {
            let state = self.state.read();
            PendingCommit::prepare(
                state
                    .data
                    .iter_all()
                    .map(|(_, n)| &n.record)
                    .filter(|r| is_all || r.is_dirty()),
                is_all,
                &state.query.params,
                self.generation.load(Ordering::SeqCst),
            )
        };
        let Some(pending) = pending else {
            return Ok(true);
        };
        let success = match self.source.commit(&pending.request).await {
            Ok(success) => success,
            Err(err) => {
                self.signals.committed.emit(false);
                return Err(err);
            }
        };
        if success && self.generation.load(Ordering::SeqCst) == pending.generation {
            for node in self.state.write().data.iter_all_mut() {
                pending.apply(&mut node.record);
            }
        }
        self.signals.committed.emit(success);
        if success {
            self.signals.update.emit(());
        }
        Ok(success)
    }
}

impl std::fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("TreeStore")
            .field("remote", &self.modes.remote_paging)
            .field("remote_expand", &self.remote_expand)
            .field("loaded", &state.loaded)
            .field("roots", &state.root_count())
            .finish_non_exhaustive()
    }
}
