//! Store change notification.

use horizon_store_core::Signal;

use crate::model::{RecordHash, Value};
use crate::tree::NodeId;

/// Outcome of a completed load attempt, carried by [`StoreSignals::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadEvent {
    /// Whether the load produced data.
    pub success: bool,
    /// Records in the current view.
    pub count: usize,
    /// Total records across all pages.
    pub total: usize,
}

/// A field edit made through the store, carried by [`StoreSignals::record_changed`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    /// Identity of the edited record after the edit.
    pub hash: RecordHash,
    /// Edited field.
    pub field: String,
    /// New value.
    pub value: Value,
}

/// Signals emitted by [`Store`](crate::Store) and [`TreeStore`](crate::TreeStore).
///
/// Stores emit after releasing their internal locks, so slots may call back
/// into the store.
///
/// # Emission order
///
/// - A load emits `before_load`, then `load` and `update` once the
///   response has been applied (or the failure recorded)
/// - Local sorting, filtering, paging and structural edits emit `update`
/// - Field edits emit `record_changed`, then `update`
/// - Tree expand and collapse emit `update_children` for the affected node
pub struct StoreSignals {
    /// Emitted before a fetch starts. Non-keepable selections clear here.
    pub before_load: Signal<()>,

    /// Emitted when a load attempt completes, successfully or not.
    pub load: Signal<LoadEvent>,

    /// Emitted whenever the visible records change.
    pub update: Signal<()>,

    /// Emitted when a tree node's children change or it is expanded or collapsed.
    pub update_children: Signal<NodeId>,

    /// Emitted when a field is edited through the store.
    pub record_changed: Signal<RecordChange>,

    /// Emitted after a commit with the backend's verdict.
    pub committed: Signal<bool>,
}

impl Default for StoreSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreSignals {
    /// Creates a new set of store signals.
    pub fn new() -> Self {
        Self {
            before_load: Signal::new(),
            load: Signal::new(),
            update: Signal::new(),
            update_children: Signal::new(),
            record_changed: Signal::new(),
            committed: Signal::new(),
        }
    }

    /// Emit `load` followed by `update`.
    pub fn emit_loaded(&self, event: LoadEvent) {
        self.load.emit(event);
        self.update.emit(());
    }

    /// Emit `record_changed` followed by `update`.
    pub fn emit_record_changed(&self, change: RecordChange) {
        self.record_changed.emit(change);
        self.update.emit(());
    }

    /// Block or unblock every signal.
    pub fn set_blocked(&self, blocked: bool) {
        self.before_load.set_blocked(blocked);
        self.load.set_blocked(blocked);
        self.update.set_blocked(blocked);
        self.update_children.set_blocked(blocked);
        self.record_changed.set_blocked(blocked);
        self.committed.set_blocked(blocked);
    }
}

impl std::fmt::Debug for StoreSignals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSignals").finish_non_exhaustive()
    }
}
