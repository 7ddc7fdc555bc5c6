//! Selection state keyed by record identity.
//!
//! A selection remembers *which records* are selected, not which rows. After
//! a reload, sort or filter the view asks [`reconcile_selection`] where those
//! records ended up; the answer depends only on the previous state and the
//! new records.
//!
//! # Example
//!
//! ```ignore
//! use horizon_store::reconcile::{SelectionFlags, SelectionMode, SelectionModel};
//!
//! let mut selection = SelectionModel::new();
//! selection.set_selection_mode(SelectionMode::Multi);
//! selection.select(&record, SelectionFlags::SELECT);
//!
//! store.reload().await?;
//! selection.reconcile(&store.get_records());
//! assert!(selection.is_row_selected_in(row, &store.get_records()));
//! ```

use std::collections::HashMap;

use horizon_store_core::Signal;
use horizon_store_core::logging::targets;

use crate::model::{Record, RecordHash};

/// Selected records in selection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    entries: Vec<(RecordHash, Record)>,
}

impl SelectionState {
    /// Create an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of selected records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if a record with identity `hash` is selected.
    pub fn contains(&self, hash: &RecordHash) -> bool {
        self.entries.iter().any(|(h, _)| h == hash)
    }

    /// Add `record`. Returns `false` if it was already selected.
    pub fn insert(&mut self, record: Record) -> bool {
        let hash = record.hash();
        if self.contains(&hash) {
            return false;
        }
        self.entries.push((hash, record));
        true
    }

    /// Remove the record with identity `hash`.
    pub fn remove(&mut self, hash: &RecordHash) -> Option<Record> {
        let position = self.entries.iter().position(|(h, _)| h == hash)?;
        Some(self.entries.remove(position).1)
    }

    /// Remove everything, returning the removed identities.
    pub fn clear(&mut self) -> Vec<RecordHash> {
        self.entries.drain(..).map(|(hash, _)| hash).collect()
    }

    /// Selected identities in selection order.
    pub fn hashes(&self) -> impl Iterator<Item = &RecordHash> {
        self.entries.iter().map(|(hash, _)| hash)
    }

    /// Selected records in selection order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().map(|(_, record)| record)
    }

    /// The most recently selected record.
    pub fn last(&self) -> Option<&Record> {
        self.entries.last().map(|(_, record)| record)
    }
}

/// Result of matching a selection against a new record list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionReconciliation {
    /// The selection with matched entries refreshed to the new records.
    pub state: SelectionState,
    /// Rows of the new list holding a selected record, ascending.
    pub selected_rows: Vec<usize>,
    /// Selected identities absent from the new list.
    pub dangling: Vec<RecordHash>,
}

impl SelectionReconciliation {
    /// The selection without its dangling entries.
    pub fn prune_dangling(mut self) -> SelectionState {
        self.state
            .entries
            .retain(|(hash, _)| !self.dangling.contains(hash));
        self.state
    }
}

/// Locate every selected record in `records` by identity.
///
/// Entries that match are refreshed to the new record instance; entries that
/// do not match are kept and reported as dangling. When several rows share an
/// identity the first one wins.
pub fn reconcile_selection(previous: &SelectionState, records: &[Record]) -> SelectionReconciliation {
    let mut first_row: HashMap<RecordHash, usize> = HashMap::with_capacity(records.len());
    for (row, record) in records.iter().enumerate() {
        first_row.entry(record.hash()).or_insert(row);
    }

    let mut state = SelectionState::new();
    let mut selected_rows = Vec::new();
    let mut dangling = Vec::new();
    for (hash, record) in &previous.entries {
        match first_row.get(hash) {
            Some(&row) => {
                selected_rows.push(row);
                state.entries.push((hash.clone(), records[row].clone()));
            }
            None => {
                dangling.push(hash.clone());
                state.entries.push((hash.clone(), record.clone()));
            }
        }
    }
    selected_rows.sort_unstable();

    SelectionReconciliation {
        state,
        selected_rows,
        dangling,
    }
}

/// Selection behavior mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Nothing can be selected.
    NoSelection,
    /// At most one record is selected (default).
    #[default]
    Single,
    /// Any number of records can be selected.
    Multi,
}

/// Flags controlling a selection operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionFlags {
    /// Clear existing selection before applying the operation.
    pub clear: bool,
    /// Select the record.
    pub select: bool,
    /// Deselect the record.
    pub deselect: bool,
    /// Toggle the record.
    pub toggle: bool,
}

impl SelectionFlags {
    /// No operation.
    pub const NONE: Self = Self::empty();

    /// Clear existing selection.
    pub const CLEAR: Self = Self {
        clear: true,
        ..Self::empty()
    };

    /// Select the record.
    pub const SELECT: Self = Self {
        select: true,
        ..Self::empty()
    };

    /// Deselect the record.
    pub const DESELECT: Self = Self {
        deselect: true,
        ..Self::empty()
    };

    /// Toggle selection of the record.
    pub const TOGGLE: Self = Self {
        toggle: true,
        ..Self::empty()
    };

    /// Clear existing selection and select the record.
    pub const CLEAR_AND_SELECT: Self = Self {
        clear: true,
        select: true,
        ..Self::empty()
    };

    const fn empty() -> Self {
        Self {
            clear: false,
            select: false,
            deselect: false,
            toggle: false,
        }
    }
}

/// Manages the selection of a grid or tree view.
///
/// # Signals
///
/// - `selection_changed`: emitted with `(selected, deselected)` identities.
///   A reload that drops a non-keepable selection emits it even when nothing
///   was selected.
pub struct SelectionModel {
    mode: SelectionMode,
    keepable: bool,
    state: SelectionState,
    selected_rows: Vec<usize>,
    dangling: Vec<RecordHash>,

    /// Emitted when selection changes. Args: (selected, deselected)
    pub selection_changed: Signal<(Vec<RecordHash>, Vec<RecordHash>)>,
}

impl Default for SelectionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionModel {
    /// Create a single-selection model that is cleared on reload.
    pub fn new() -> Self {
        Self {
            mode: SelectionMode::default(),
            keepable: false,
            state: SelectionState::new(),
            selected_rows: Vec::new(),
            dangling: Vec::new(),
            selection_changed: Signal::new(),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub fn selection_mode(&self) -> SelectionMode {
        self.mode
    }

    /// Sets the selection mode. Existing selection is kept.
    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        self.mode = mode;
    }

    /// Whether the selection survives a reload.
    pub fn is_keepable(&self) -> bool {
        self.keepable
    }

    pub fn set_keepable(&mut self, keepable: bool) {
        self.keepable = keepable;
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The current selection.
    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Checks if the record with identity `hash` is selected.
    pub fn is_selected(&self, hash: &RecordHash) -> bool {
        self.state.contains(hash)
    }

    /// Checks if the record at `row` of `records` is selected.
    pub fn is_row_selected_in(&self, row: usize, records: &[Record]) -> bool {
        records
            .get(row)
            .is_some_and(|record| self.state.contains(&record.hash()))
    }

    /// Checks if `row` held a selected record at the last reconciliation.
    pub fn is_row_selected(&self, row: usize) -> bool {
        self.selected_rows.binary_search(&row).is_ok()
    }

    /// Rows holding a selected record at the last reconciliation, ascending.
    pub fn selected_rows(&self) -> &[usize] {
        &self.selected_rows
    }

    /// Selected identities missing from the last reconciled records.
    pub fn dangling(&self) -> &[RecordHash] {
        &self.dangling
    }

    pub fn has_selection(&self) -> bool {
        !self.state.is_empty()
    }

    pub fn selected_count(&self) -> usize {
        self.state.len()
    }

    /// Selected records in selection order.
    pub fn selected_records(&self) -> Vec<Record> {
        self.state.records().cloned().collect()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Performs a selection operation on `record`.
    pub fn select(&mut self, record: &Record, flags: SelectionFlags) {
        if self.mode == SelectionMode::NoSelection {
            return;
        }

        let mut newly_selected = Vec::new();
        let mut newly_deselected = Vec::new();

        if flags.clear && !self.state.is_empty() {
            newly_deselected = self.state.clear();
        }

        let hash = record.hash();
        let was_selected = self.state.contains(&hash);
        if (flags.toggle && was_selected) || (flags.deselect && !flags.toggle && was_selected) {
            self.state.remove(&hash);
            if !newly_deselected.contains(&hash) {
                newly_deselected.push(hash);
            }
        } else if (flags.toggle || flags.select) && !was_selected {
            self.state.insert(record.clone());
            newly_selected.push(hash);
        }

        // Single mode keeps the most recent selection.
        if self.mode == SelectionMode::Single && self.state.len() > 1 {
            let keep = self.state.entries.pop();
            for (removed, _) in self.state.entries.drain(..) {
                if !newly_deselected.contains(&removed) {
                    newly_deselected.push(removed);
                }
            }
            self.state.entries.extend(keep);
        }

        newly_deselected.retain(|hash| !self.state.contains(hash));
        newly_selected.retain(|hash| !newly_deselected.contains(hash));

        if !newly_selected.is_empty() || !newly_deselected.is_empty() {
            self.selection_changed.emit((newly_selected, newly_deselected));
        }
    }

    /// Deselect `record`.
    pub fn deselect(&mut self, record: &Record) {
        self.select(record, SelectionFlags::DESELECT);
    }

    /// Toggle `record`.
    pub fn toggle(&mut self, record: &Record) {
        self.select(record, SelectionFlags::TOGGLE);
    }

    /// Select every record (multi mode only).
    pub fn select_all(&mut self, records: &[Record]) {
        if self.mode != SelectionMode::Multi {
            return;
        }
        let newly_selected: Vec<RecordHash> = records
            .iter()
            .filter(|record| self.state.insert((*record).clone()))
            .map(Record::hash)
            .collect();
        if !newly_selected.is_empty() {
            self.selection_changed.emit((newly_selected, Vec::new()));
        }
    }

    /// Clears all selection.
    pub fn clear_selection(&mut self) {
        if self.state.is_empty() {
            return;
        }
        let deselected = self.state.clear();
        self.selected_rows.clear();
        self.dangling.clear();
        self.selection_changed.emit((Vec::new(), deselected));
    }

    /// Reacts to a store's `before_load`.
    ///
    /// Unless keepable, the selection is dropped and a change is emitted even
    /// if it was already empty, so views always reset their selected rows.
    pub fn on_before_load(&mut self) {
        if self.keepable {
            return;
        }
        let deselected = self.state.clear();
        self.selected_rows.clear();
        self.dangling.clear();
        tracing::trace!(target: targets::RECONCILE, dropped = deselected.len(), "selection reset by load");
        self.selection_changed.emit((Vec::new(), deselected));
    }

    /// Re-locate the selection in `records`, typically after a store `update`.
    ///
    /// Returns the dangling identities; they stay selected until
    /// [`prune_dangling`](Self::prune_dangling) or an explicit change.
    pub fn reconcile(&mut self, records: &[Record]) -> &[RecordHash] {
        let SelectionReconciliation {
            state,
            selected_rows,
            dangling,
        } = reconcile_selection(&self.state, records);
        tracing::debug!(
            target: targets::RECONCILE,
            selected = selected_rows.len(),
            dangling = dangling.len(),
            "selection reconciled"
        );
        self.state = state;
        self.selected_rows = selected_rows;
        self.dangling = dangling;
        &self.dangling
    }

    /// Drop selected records that were missing at the last reconciliation.
    pub fn prune_dangling(&mut self) {
        if self.dangling.is_empty() {
            return;
        }
        let pruned = std::mem::take(&mut self.dangling);
        for hash in &pruned {
            self.state.remove(hash);
        }
        self.selection_changed.emit((Vec::new(), pruned));
    }
}

impl std::fmt::Debug for SelectionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionModel")
            .field("mode", &self.mode)
            .field("keepable", &self.keepable)
            .field("selected", &self.state.len())
            .field("selected_rows", &self.selected_rows)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Schema;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn record(id: i64, name: &str) -> Record {
        Record::from_json(&Schema::open(["id"]), &json!({"id": id, "name": name})).unwrap()
    }

    #[test]
    fn test_reconcile_follows_identity() {
        let mut state = SelectionState::new();
        state.insert(record(7, "old"));

        let records = vec![record(1, "a"), record(3, "c"), record(7, "new")];
        let result = reconcile_selection(&state, &records);

        assert_eq!(result.selected_rows, vec![2]);
        assert!(result.dangling.is_empty());
        assert_eq!(result.state.last().unwrap().value("name").display_text(), "new");
    }

    #[test]
    fn test_reconcile_keeps_dangling() {
        let mut state = SelectionState::new();
        state.insert(record(7, "a"));
        state.insert(record(9, "b"));

        let result = reconcile_selection(&state, &[record(9, "b")]);
        assert_eq!(result.selected_rows, vec![0]);
        assert_eq!(result.dangling, vec![record(7, "a").hash()]);
        assert_eq!(result.state.len(), 2);

        let pruned = result.prune_dangling();
        assert_eq!(pruned.len(), 1);
        assert!(pruned.contains(&record(9, "b").hash()));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut state = SelectionState::new();
        state.insert(record(2, "b"));
        let records = vec![record(2, "b"), record(1, "a")];

        let once = reconcile_selection(&state, &records);
        let twice = reconcile_selection(&once.state, &records);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_single_mode_keeps_latest() {
        let mut model = SelectionModel::new();
        model.select(&record(1, "a"), SelectionFlags::SELECT);
        model.select(&record(2, "b"), SelectionFlags::SELECT);

        assert_eq!(model.selected_count(), 1);
        assert!(model.is_selected(&record(2, "b").hash()));
    }

    #[test]
    fn test_multi_toggle_and_select_all() {
        let mut model = SelectionModel::new();
        model.set_selection_mode(SelectionMode::Multi);
        let records = vec![record(1, "a"), record(2, "b"), record(3, "c")];

        model.toggle(&records[0]);
        model.toggle(&records[1]);
        model.toggle(&records[0]);
        assert_eq!(model.selected_count(), 1);

        model.select_all(&records);
        assert_eq!(model.selected_count(), 3);
        model.reconcile(&records);
        assert_eq!(model.selected_rows(), &[0, 1, 2]);
    }

    #[test]
    fn test_no_selection_mode() {
        let mut model = SelectionModel::new();
        model.set_selection_mode(SelectionMode::NoSelection);
        model.select(&record(1, "a"), SelectionFlags::SELECT);
        assert!(!model.has_selection());
    }

    #[test]
    fn test_before_load_clears_unless_keepable() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut model = SelectionModel::new();
        let sink = events.clone();
        model.selection_changed.connect(move |(selected, deselected)| {
            sink.lock().push((selected.len(), deselected.len()));
        });

        model.on_before_load();
        model.select(&record(1, "a"), SelectionFlags::SELECT);
        model.on_before_load();
        assert!(!model.has_selection());
        assert_eq!(*events.lock(), vec![(0, 0), (1, 0), (0, 1)]);

        model.set_keepable(true);
        model.select(&record(1, "a"), SelectionFlags::SELECT);
        model.on_before_load();
        assert!(model.has_selection());
    }

    #[test]
    fn test_prune_dangling_emits_deselection() {
        let mut model = SelectionModel::new();
        model.select(&record(1, "a"), SelectionFlags::SELECT);
        assert_eq!(model.reconcile(&[record(2, "b")]).len(), 1);
        assert!(model.has_selection());

        model.prune_dangling();
        assert!(!model.has_selection());
        assert!(model.dangling().is_empty());
    }
}
