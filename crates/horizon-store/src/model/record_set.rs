//! Materialized record collections.
//!
//! A [`RecordSet`] owns every record of a load and a derived *visible* order:
//! the records that pass the current filters, in the current sort order.
//! Sorting reorders the backing storage (stably); filtering only recomputes
//! which positions are visible, so clearing a filter restores hidden records
//! in sorted position.

use horizon_store_core::PerfSpan;
use serde_json::Value as Json;

use super::filter::{FilterMode, Filters};
use super::record::{Record, RecordHash};
use super::schema::Schema;
use super::sorter::Sorters;
use super::value::Value;
use crate::error::Result;

/// Records with derived sort and filter state.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<Record>,
    visible: Vec<usize>,
    sorters: Option<Sorters>,
    filters: Option<Filters>,
    filter_mode: FilterMode,
    sort_stale: bool,
    filter_stale: bool,
}

impl RecordSet {
    /// Wrap records with no derivation applied.
    pub fn new(records: Vec<Record>) -> Self {
        let visible = (0..records.len()).collect();
        Self {
            records,
            visible,
            ..Self::default()
        }
    }

    /// Build records from raw JSON objects.
    pub fn from_json(schema: &Schema, raw: &[Json]) -> Result<Self> {
        let records = raw
            .iter()
            .map(|item| Record::from_json(schema, item))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(records))
    }

    /// Sort by `sorters` and re-derive visibility.
    pub fn sort(&mut self, sorters: &Sorters) {
        let _span = PerfSpan::new("record_set.sort");
        if sorters.is_empty() {
            self.sorters = None;
            self.sort_stale = false;
            return;
        }
        self.records.sort_by(|a, b| sorters.compare(a, b));
        self.sorters = Some(sorters.clone());
        self.sort_stale = false;
        self.refresh_visible();
    }

    /// Filter by `filters` combined with `mode`.
    pub fn filter(&mut self, filters: &Filters, mode: FilterMode) {
        let _span = PerfSpan::new("record_set.filter");
        self.filters = (!filters.is_empty()).then(|| filters.clone());
        self.filter_mode = mode;
        self.filter_stale = false;
        self.refresh_visible();
    }

    /// Record that the backend already sorted the data.
    pub fn assume_sorted(&mut self, sorters: &Sorters) {
        self.sorters = (!sorters.is_empty()).then(|| sorters.clone());
        self.sort_stale = false;
    }

    /// Record that the backend already filtered the data.
    pub fn assume_filtered(&mut self, filters: &Filters, mode: FilterMode) {
        self.filters = (!filters.is_empty()).then(|| filters.clone());
        self.filter_mode = mode;
        self.filter_stale = false;
    }

    /// Mark the sort and filter claims that read `field` as stale.
    ///
    /// Called after an edit: the current order and visibility stay as they
    /// are until the next [`sort`](Self::sort) or [`filter`](Self::filter).
    pub fn invalidate_field(&mut self, field: &str) {
        if self.sorters.as_ref().is_some_and(|s| s.references(field)) {
            self.sort_stale = true;
        }
        if self.filters.as_ref().is_some_and(|f| f.references(field)) {
            self.filter_stale = true;
        }
    }

    /// Returns `true` if the materialized order already reflects `sorters`.
    pub fn is_sorted_by(&self, sorters: &Sorters) -> bool {
        if self.sort_stale {
            return false;
        }
        match &self.sorters {
            Some(current) => current == sorters,
            None => sorters.is_empty(),
        }
    }

    /// Returns `true` if the visible set already reflects `filters` and `mode`.
    pub fn is_filtered_by(&self, filters: &Filters, mode: FilterMode) -> bool {
        if self.filter_stale {
            return false;
        }
        match &self.filters {
            Some(current) => current == filters && self.filter_mode == mode,
            None => filters.is_empty(),
        }
    }

    /// Sorters reflected in the current order.
    pub fn sorters(&self) -> Option<&Sorters> {
        self.sorters.as_ref()
    }

    /// Filters reflected in the visible set.
    pub fn filters(&self) -> Option<&Filters> {
        self.filters.as_ref()
    }

    fn refresh_visible(&mut self) {
        self.visible = match &self.filters {
            Some(filters) => self
                .records
                .iter()
                .enumerate()
                .filter(|(_, r)| filters.matches(r, self.filter_mode))
                .map(|(i, _)| i)
                .collect(),
            None => (0..self.records.len()).collect(),
        };
    }

    /// Number of visible records.
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// Returns `true` if no record is visible.
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Number of records including hidden ones.
    pub fn total_len(&self) -> usize {
        self.records.len()
    }

    /// Visible records in order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.visible.iter().map(|&i| &self.records[i])
    }

    /// Every record, hidden ones included, in storage order.
    pub fn iter_all(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub(crate) fn iter_all_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.records.iter_mut()
    }

    /// Visible record at `index`.
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.visible.get(index).map(|&i| &self.records[i])
    }

    /// Mutable visible record at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        let i = *self.visible.get(index)?;
        self.records.get_mut(i)
    }

    /// Replace the visible record at `index`.
    ///
    /// The new record takes the old one's position; the set no longer claims
    /// to be sorted since the order is now caller-defined.
    pub fn replace(&mut self, index: usize, record: Record) -> Option<Record> {
        let i = *self.visible.get(index)?;
        self.sorters = None;
        self.filter_stale |= self.filters.is_some();
        Some(std::mem::replace(&mut self.records[i], record))
    }

    /// Insert before the visible record at `index` (append when `index == len()`).
    pub fn insert(&mut self, index: usize, record: Record) {
        let at = self
            .visible
            .get(index)
            .copied()
            .unwrap_or(self.records.len());
        self.records.insert(at, record);
        self.sorters = None;
        self.refresh_visible();
    }

    /// Append a record.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
        self.sorters = None;
        self.refresh_visible();
    }

    /// Remove the visible record at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Record> {
        let i = *self.visible.get(index)?;
        let removed = self.records.remove(i);
        self.refresh_visible();
        Some(removed)
    }

    /// First visible record whose `field` equals `value`.
    pub fn find(&self, field: &str, value: &Value) -> Option<&Record> {
        self.find_index(field, value).and_then(|i| self.get(i))
    }

    /// Visible index of the first record whose `field` equals `value`.
    pub fn find_index(&self, field: &str, value: &Value) -> Option<usize> {
        self.iter().position(|r| r.value(field).loose_eq(value))
    }

    /// Visible index of the record with identity `hash`.
    pub fn position_of(&self, hash: &RecordHash) -> Option<usize> {
        self.iter().position(|r| &r.hash() == hash)
    }

    /// Records with uncommitted changes, hidden ones included.
    pub fn modified(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.is_dirty())
    }
}
