//! Flat record store.
//!
//! A [`Store`] owns a [`DataSource`], the query state (paging, parameters,
//! sorters, filters) and the currently materialized [`RecordSet`]. It keeps
//! the record set consistent with the query state:
//!
//! - With a local source, or when a concern is not delegated, sorting,
//!   filtering and paging are applied in memory
//! - With `remoteSort` / `remoteFilter`, changing criteria reloads and the
//!   response is trusted to reflect them
//!
//! # Loading
//!
//! Each fetch takes a generation number. When a newer fetch starts before an
//! older one completes, the older response is discarded
//! ([`LoadOutcome::Superseded`]). A failed load still completes: the store is
//! marked loaded with no data, [`Store::last_error`] describes the failure and
//! `load`/`update` fire so views can clear.
//!
//! # Example
//!
//! ```ignore
//! use horizon_store::{Store, StoreConfig, SortDirection};
//! use serde_json::json;
//!
//! let store = Store::local(
//!     StoreConfig::default().with_primary_keys(["id"]),
//!     vec![json!({"id": 1, "name": "A", "age": 30})],
//! )?;
//! store.load().await?;
//! store.sort("age", SortDirection::Asc).await?;
//! ```

mod query;
mod signals;

pub use signals::{LoadEvent, RecordChange, StoreSignals};

pub(crate) use query::{QueryModes, QueryState};
pub use query::total_pages;

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use horizon_store_core::logging::targets;
use horizon_store_net::Transport;
use parking_lot::RwLock;
use serde_json::{Map, Value as Json};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::model::{
    Filter, FilterMode, FilterOperator, FilterValue, Filters, Record, RecordSet, Schema,
    SortDirection, Sorters, Value, map_to_json,
};
use crate::source::{
    CommitRequest, DataSource, LoadResponse, LocalSource, RecordPatch, RemoteSource,
};

/// What a load-triggering call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A fetch completed and its records were applied.
    Loaded {
        /// Records in the current view.
        count: usize,
    },
    /// The store was already loaded; events were re-emitted without fetching.
    AlreadyLoaded,
    /// A newer fetch started while this one was in flight; its response was dropped.
    Superseded,
    /// Criteria were applied in memory without fetching.
    Rederived {
        /// Records in the current view.
        count: usize,
    },
}

struct StoreState {
    query: QueryState,
    loaded: bool,
    data: Option<RecordSet>,
    response: Option<Json>,
    last_error: Option<String>,
}

impl StoreState {
    fn len(&self) -> usize {
        self.data.as_ref().map_or(0, RecordSet::len)
    }

    /// Visible positions of the current page.
    fn window(&self, local_paging: bool) -> Range<usize> {
        let len = self.len();
        let limit = self.query.limit;
        if !local_paging || limit == 0 {
            return 0..len;
        }
        let start = self.query.page.saturating_sub(1).saturating_mul(limit).min(len);
        start..start.saturating_add(limit).min(len)
    }
}

/// A flat, pageable, sortable, filterable record store.
pub struct Store {
    schema: Schema,
    modes: QueryModes,
    source: Arc<dyn DataSource>,
    state: RwLock<StoreState>,
    generation: AtomicU64,
    signals: StoreSignals,
}

impl Store {
    /// Create a store over `source`.
    pub fn new(config: StoreConfig, source: impl DataSource + 'static) -> Result<Self> {
        Self::with_source(config, Arc::new(source))
    }

    /// Create a store over a shared source.
    pub fn with_source(config: StoreConfig, source: Arc<dyn DataSource>) -> Result<Self> {
        config.validate()?;
        let schema = config.schema()?;
        let modes = QueryModes::new(&config, source.is_remote());
        Ok(Self {
            schema,
            modes,
            source,
            state: RwLock::new(StoreState {
                query: QueryState::from_config(&config),
                loaded: false,
                data: None,
                response: None,
                last_error: None,
            }),
            generation: AtomicU64::new(0),
            signals: StoreSignals::new(),
        })
    }

    /// Create a store over in-memory records.
    pub fn local(config: StoreConfig, data: Vec<Json>) -> Result<Self> {
        Self::new(config, LocalSource::new(data))
    }

    /// Create a store loading from `url` through `transport`.
    pub fn remote<T: Transport + 'static>(
        config: StoreConfig,
        transport: T,
        url: impl Into<String>,
    ) -> Result<Self> {
        Self::new(config, RemoteSource::new(transport, url))
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

    /// Description of the last failed load, cleared by a successful one.
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

    /// Fetch again regardless of the loaded state.
    pub async fn reload(&self) -> Result<LoadOutcome> {
        self.fetch().await
    }

    async fn fetch(&self) -> Result<LoadOutcome> {
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.write().loaded = false;
        self.signals.before_load.emit(());

        let query = self.state.read().query.build(&self.modes, &self.schema);
        tracing::debug!(
            target: targets::STORE,
            generation = token,
            page = query.page,
            limit = query.limit,
            "loading store"
        );
        let response = self.source.fetch(&query).await;

        if self.generation.load(Ordering::SeqCst) != token {
            tracing::debug!(target: targets::STORE, generation = token, "discarding superseded load");
            return Ok(LoadOutcome::Superseded);
        }

        match self.apply(response) {
            Ok(event) => {
                tracing::debug!(
                    target: targets::STORE,
                    count = event.count,
                    total = event.total,
                    "store loaded"
                );
                self.signals.emit_loaded(event);
                Ok(LoadOutcome::Loaded { count: event.count })
            }
            Err(err) => {
                tracing::warn!(target: targets::STORE, error = %err, "store load failed");
                let event = self.event(&self.state.read());
                self.signals.emit_loaded(event);
                Err(err)
            }
        }
    }

    fn apply(&self, response: Result<LoadResponse>) -> Result<LoadEvent> {
        let mut state = self.state.write();
        state.loaded = true;
        let parsed = match response {
            Ok(response) => {
                state.response = Some(response.raw.clone());
                if response.success {
                    RecordSet::from_json(&self.schema, &response.records)
                        .map(|set| (set, response.total))
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
            Ok((mut set, total)) => {
                self.sync_derivation(&state.query, &mut set);
                state.query.total = if self.modes.remote_paging {
                    total.unwrap_or(set.len())
                } else {
                    set.len()
                };
                state.data = Some(set);
                state.last_error = None;
                Ok(self.event(&state))
            }
            Err(err) => {
                state.data = None;
                state.query.total = 0;
                state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Bring a record set in line with the query criteria.
    fn sync_derivation(&self, query: &QueryState, set: &mut RecordSet) {
        if self.modes.remote_sort {
            set.assume_sorted(&query.sorters);
        } else if !set.is_sorted_by(&query.sorters) {
            set.sort(&query.sorters);
        }
        if self.modes.remote_filter {
            set.assume_filtered(&query.filters, query.filter_mode);
        } else if !set.is_filtered_by(&query.filters, query.filter_mode) {
            set.filter(&query.filters, query.filter_mode);
        }
    }

    fn local_paging(&self) -> bool {
        !self.modes.remote_paging
    }

    fn event(&self, state: &StoreState) -> LoadEvent {
        LoadEvent {
            success: state.last_error.is_none() && state.data.is_some(),
            count: state.window(self.local_paging()).len(),
            total: state.query.total,
        }
    }

    /// Re-derive in memory, loading first if nothing is materialized yet.
    async fn rederive(&self) -> Result<LoadOutcome> {
        let count = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            match state.data.as_mut() {
                Some(set) => {
                    self.sync_derivation(&state.query, set);
                    if self.local_paging() {
                        state.query.total = set.len();
                    }
                    Some(state.window(self.local_paging()).len())
                }
                None => None,
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

    /// Replace the extra load parameters. Takes effect on the next fetch.
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

    /// Current filter mode.
    pub fn filter_mode(&self) -> FilterMode {
        self.state.read().query.filter_mode
    }

    /// Sort by a single field, replacing the current sorters.
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

    /// Replace every filter (and optionally the mode), reset to page 1 and apply.
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

    /// Apply the current filters: reload when remote, re-derive otherwise.
    pub async fn filter(&self) -> Result<LoadOutcome> {
        if self.modes.remote_filter {
            self.reload().await
        } else {
            self.rederive().await
        }
    }

    // -------------------------------------------------------------------------
    // Paging
    // -------------------------------------------------------------------------

    /// Current 1-based page.
    pub fn page(&self) -> usize {
        self.state.read().query.page
    }

    /// Page size; `0` means unpaged.
    pub fn limit(&self) -> usize {
        self.state.read().query.limit
    }

    /// Change the page size and return to page 1.
    pub fn set_limit(&self, limit: usize) {
        {
            let mut state = self.state.write();
            state.query.limit = limit;
            state.query.page = 1;
        }
        if self.local_paging() {
            self.signals.update.emit(());
        }
    }

    /// Move to `page` (at least 1) without fetching.
    ///
    /// Local stores re-slice immediately; remote stores need
    /// [`load_page`](Self::load_page) or [`reload`](Self::reload).
    pub fn set_page(&self, page: usize) {
        self.state.write().query.page = page.max(1);
        if self.local_paging() {
            self.signals.update.emit(());
        }
    }

    /// Move to `page` and fetch it when remote.
    pub async fn load_page(&self, page: usize) -> Result<LoadOutcome> {
        self.state.write().query.page = page.max(1);
        if self.local_paging() {
            let count = self.get_count();
            self.signals.update.emit(());
            Ok(LoadOutcome::Rederived { count })
        } else {
            self.reload().await
        }
    }

    /// Go to the next page if there is one. Returns `None` on the last page.
    pub async fn next_page(&self) -> Result<Option<LoadOutcome>> {
        let (page, pages) = {
            let state = self.state.read();
            (state.query.page, state.query.total_pages())
        };
        if page >= pages {
            return Ok(None);
        }
        self.load_page(page + 1).await.map(Some)
    }

    /// Go to the previous page if there is one. Returns `None` on page 1.
    pub async fn prev_page(&self) -> Result<Option<LoadOutcome>> {
        let page = self.page();
        if page <= 1 {
            return Ok(None);
        }
        self.load_page(page - 1).await.map(Some)
    }

    /// Number of pages: `ceil(total / limit)`, at least 1; 1 when unpaged.
    pub fn get_total_page(&self) -> usize {
        self.state.read().query.total_pages()
    }

    /// Total records across all pages.
    pub fn get_total(&self) -> usize {
        self.state.read().query.total
    }

    /// Records in the current view.
    pub fn get_count(&self) -> usize {
        self.state.read().window(self.local_paging()).len()
    }

    // -------------------------------------------------------------------------
    // Record access
    // -------------------------------------------------------------------------

    fn with_view<R>(&self, f: impl FnOnce(&RecordSet, Range<usize>) -> R) -> Option<R> {
        let state = self.state.read();
        let window = state.window(self.local_paging());
        state.data.as_ref().map(|set| f(set, window))
    }

    /// Records of the current view, in order.
    pub fn get_records(&self) -> Vec<Record> {
        self.with_view(|set, window| window.filter_map(|i| set.get(i).cloned()).collect())
            .unwrap_or_default()
    }

    /// Record at `index` of the current view.
    pub fn get_at(&self, index: usize) -> Option<Record> {
        self.with_view(|set, mut window| window.nth(index).and_then(|i| set.get(i).cloned()))
            .flatten()
    }

    /// First record in the current view whose `field` equals `value`.
    pub fn find(&self, field: &str, value: impl Into<Value>) -> Option<Record> {
        let index = self.find_index(field, value)?;
        self.get_at(index)
    }

    /// View index of the first record whose `field` equals `value`.
    pub fn find_index(&self, field: &str, value: impl Into<Value>) -> Option<usize> {
        let value = value.into();
        self.with_view(|set, window| {
            window
                .filter_map(|i| set.get(i))
                .position(|r| r.value(field).loose_eq(&value))
        })
        .flatten()
    }

    /// The record in the current view with the same identity as `record`.
    pub fn match_record(&self, record: &Record) -> Option<Record> {
        let index = self.match_index(record)?;
        self.get_at(index)
    }

    /// View index of the record with the same identity as `record`.
    pub fn match_index(&self, record: &Record) -> Option<usize> {
        let hash = record.hash();
        self.with_view(|set, window| {
            window
                .filter_map(|i| set.get(i))
                .position(|r| r.hash() == hash)
        })
        .flatten()
    }

    /// Every record with uncommitted changes, including filtered-out ones.
    pub fn get_modified_records(&self) -> Vec<Record> {
        self.state
            .read()
            .data
            .as_ref()
            .map(|set| set.modified().cloned().collect())
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Editing
    // -------------------------------------------------------------------------

    fn data_index(&self, state: &StoreState, index: usize) -> Option<usize> {
        let window = state.window(self.local_paging());
        let i = window.start.checked_add(index)?;
        (i < window.end).then_some(i)
    }

    fn refresh_total(&self, state: &mut StoreState, delta: isize) {
        if self.local_paging() {
            state.query.total = state.len();
        } else {
            state.query.total = state.query.total.saturating_add_signed(delta);
        }
    }

    /// Set a field of the record at view `index`. Returns `false` when the
    /// index is out of range or the value is unchanged.
    pub fn set_value(&self, index: usize, field: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let change = {
            let mut state = self.state.write();
            let Some(i) = self.data_index(&state, index) else {
                return false;
            };
            let Some(set) = state.data.as_mut() else {
                return false;
            };
            let Some(record) = set.get_mut(i) else {
                return false;
            };
            if !record.set(field, value.clone()) {
                return false;
            }
            let hash = record.hash();
            set.invalidate_field(field);
            RecordChange {
                hash,
                field: field.to_string(),
                value,
            }
        };
        self.signals.emit_record_changed(change);
        true
    }

    /// Replace the record at view `index`.
    pub fn set_at(&self, index: usize, record: Record) -> bool {
        let replaced = {
            let mut state = self.state.write();
            match self.data_index(&state, index) {
                Some(i) => state
                    .data
                    .as_mut()
                    .and_then(|set| set.replace(i, record))
                    .is_some(),
                None => false,
            }
        };
        if replaced {
            self.signals.update.emit(());
        }
        replaced
    }

    /// Append a record built from raw JSON.
    pub fn add(&self, raw: &Json) -> Result<()> {
        let record = Record::from_json(&self.schema, raw)?;
        {
            let mut state = self.state.write();
            state.data.get_or_insert_with(RecordSet::default).push(record);
            self.refresh_total(&mut state, 1);
        }
        self.signals.update.emit(());
        Ok(())
    }

    /// Insert a record built from raw JSON before view `index`.
    pub fn insert(&self, index: usize, raw: &Json) -> Result<()> {
        let record = Record::from_json(&self.schema, raw)?;
        {
            let mut state = self.state.write();
            let window = state.window(self.local_paging());
            let at = window.start.saturating_add(index).min(window.end);
            state.data.get_or_insert_with(RecordSet::default).insert(at, record);
            self.refresh_total(&mut state, 1);
        }
        self.signals.update.emit(());
        Ok(())
    }

    /// Remove the record at view `index`.
    pub fn remove_at(&self, index: usize) -> Option<Record> {
        let removed = {
            let mut state = self.state.write();
            let i = self.data_index(&state, index)?;
            let removed = state.data.as_mut()?.remove(i)?;
            self.refresh_total(&mut state, -1);
            removed
        };
        self.signals.update.emit(());
        Some(removed)
    }

    /// Roll back every uncommitted change.
    pub fn reject_changes(&self) {
        {
            let mut state = self.state.write();
            if let Some(set) = state.data.as_mut() {
                set.iter_all_mut().for_each(Record::reject);
            }
        }
        self.signals.update.emit(());
    }

    /// Send changes to the source.
    ///
    /// With `is_all` every record is sent with all fields; otherwise only dirty
    /// records with their changed fields. On success the sent records are
    /// committed locally. Nothing to send counts as success. A backend
    /// rejection returns `Ok(false)`; transport failures are errors.
    pub async fn commit(&self, is_all: bool) -> Result<bool> {
        let Some(pending) = self.commit_request(is_all) else {
            return Ok(true);
        };
        tracing::debug!(
            target: targets::STORE,
            records = pending.request.records.len(),
            is_all,
            "committing store changes"
        );
        let success = match self.source.commit(&pending.request).await {
            Ok(success) => success,
            Err(err) => {
                self.signals.committed.emit(false);
                return Err(err);
            }
        };
        if success && self.generation.load(Ordering::SeqCst) == pending.generation {
            let mut state = self.state.write();
            if let Some(set) = state.data.as_mut() {
                for record in set.iter_all_mut() {
                    pending.apply(record);
                }
            }
        }
        self.signals.committed.emit(success);
        if success {
            self.signals.update.emit(());
        }
        Ok(success)
    }

    fn commit_request(&self, is_all: bool) -> Option<PendingCommit> {
        let state = self.state.read();
        let set = state.data.as_ref()?;
        let records: Box<dyn Iterator<Item = &Record> + '_> = if is_all {
            Box::new(set.iter_all())
        } else {
            Box::new(set.modified())
        };
        PendingCommit::prepare(
            records,
            is_all,
            &state.query.params,
            self.generation.load(Ordering::SeqCst),
        )
    }
}

/// A commit payload together with what is needed to apply its result.
pub(crate) struct PendingCommit {
    pub request: CommitRequest,
    /// Origin of each sent record with the field values it carried.
    sent: Vec<(BTreeMap<String, Value>, BTreeMap<String, Value>)>,
    pub generation: u64,
}

impl PendingCommit {
    /// Build a payload from `records`; `None` when there is nothing to send.
    pub fn prepare<'a>(
        records: impl Iterator<Item = &'a Record>,
        is_all: bool,
        params: &Map<String, Json>,
        generation: u64,
    ) -> Option<Self> {
        let mut sent = Vec::new();
        let mut patches = Vec::new();
        for record in records {
            let origin = record.get_origin();
            let fields = if is_all {
                record.fields().clone()
            } else {
                record.get_changes()
            };
            patches.push(RecordPatch {
                origin: map_to_json(&origin),
                updated: map_to_json(&fields),
            });
            sent.push((origin, fields));
        }
        if patches.is_empty() {
            return None;
        }
        Some(Self {
            request: CommitRequest {
                records: patches,
                params: params.clone(),
            },
            sent,
            generation,
        })
    }

    /// Mark the fields sent for `record` as committed. Returns `false` if
    /// `record` was not part of this commit.
    pub fn apply(&self, record: &mut Record) -> bool {
        let origin = record.get_origin();
        match self.sent.iter().find(|(o, _)| *o == origin) {
            Some((_, fields)) => {
                record.commit_fields(fields);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Store")
            .field("remote", &self.modes.remote_paging)
            .field("loaded", &state.loaded)
            .field("page", &state.query.page)
            .field("limit", &state.query.limit)
            .field("total", &state.query.total)
            .finish_non_exhaustive()
    }
}
