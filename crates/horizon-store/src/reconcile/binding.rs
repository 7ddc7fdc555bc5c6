//! Wiring between store signals and view state.
//!
//! A binding holds a [`Weak`] reference to its store so the store's signal
//! slots never keep the store alive. Dropping the binding disconnects it.

use std::sync::{Arc, Weak};

use horizon_store_core::ConnectionId;
use horizon_store_core::logging::targets;
use parking_lot::Mutex;

use super::expansion::{ExpansionState, restore_expanded_rows};
use super::selection::SelectionModel;
use crate::error::Result;
use crate::model::Record;
use crate::store::Store;
use crate::tree::TreeStore;

/// Keeps a [`SelectionModel`] in step with a flat [`Store`].
///
/// On `before_load` the selection is reset unless keepable; on `update` it
/// is reconciled against the store's current records.
pub struct GridBinding {
    store: Weak<Store>,
    selection: Arc<Mutex<SelectionModel>>,
    before_load: ConnectionId,
    update: ConnectionId,
}

impl GridBinding {
    pub fn new(store: &Arc<Store>, selection: Arc<Mutex<SelectionModel>>) -> Self {
        let before_load = {
            let selection = selection.clone();
            store
                .signals()
                .before_load
                .connect(move |_| selection.lock().on_before_load())
        };
        let update = {
            let selection = selection.clone();
            let weak = Arc::downgrade(store);
            store.signals().update.connect(move |_| {
                if let Some(store) = weak.upgrade() {
                    selection.lock().reconcile(&store.get_records());
                }
            })
        };
        Self {
            store: Arc::downgrade(store),
            selection,
            before_load,
            update,
        }
    }

    pub fn selection(&self) -> &Arc<Mutex<SelectionModel>> {
        &self.selection
    }

    /// Checks if the record rendered at `row` is selected.
    pub fn is_row_selected(&self, row: usize) -> bool {
        self.selection.lock().is_row_selected(row)
    }
}

impl Drop for GridBinding {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.signals().before_load.disconnect(self.before_load);
            store.signals().update.disconnect(self.update);
        }
    }
}

/// Keeps selection and expansion state in step with a [`TreeStore`].
///
/// Before a load, the expanded rows are captured, replacing any earlier
/// snapshot even when nothing is expanded; call
/// [`restore`](Self::restore) once the load completes to replay them. The
/// selection is reconciled against the rendered rows on `update` and
/// `update_children`.
pub struct TreeBinding {
    store: Weak<TreeStore>,
    selection: Arc<Mutex<SelectionModel>>,
    expansion: Arc<Mutex<ExpansionState>>,
    connections: [ConnectionId; 3],
}

fn rendered_records(store: &TreeStore) -> Vec<Record> {
    store.visible_rows().into_iter().map(|row| row.record).collect()
}

impl TreeBinding {
    pub fn new(store: &Arc<TreeStore>, selection: Arc<Mutex<SelectionModel>>) -> Self {
        let expansion = Arc::new(Mutex::new(ExpansionState::new()));
        let signals = store.signals();

        let before_load = {
            let selection = selection.clone();
            let expansion = expansion.clone();
            let weak = Arc::downgrade(store);
            signals.before_load.connect(move |_| {
                selection.lock().on_before_load();
                if let Some(store) = weak.upgrade() {
                    *expansion.lock() = ExpansionState::capture(&store);
                }
            })
        };
        let update = {
            let selection = selection.clone();
            let weak = Arc::downgrade(store);
            signals.update.connect(move |_| {
                if let Some(store) = weak.upgrade() {
                    selection.lock().reconcile(&rendered_records(&store));
                }
            })
        };
        let update_children = {
            let selection = selection.clone();
            let weak = Arc::downgrade(store);
            signals.update_children.connect(move |_| {
                if let Some(store) = weak.upgrade() {
                    selection.lock().reconcile(&rendered_records(&store));
                }
            })
        };

        Self {
            store: Arc::downgrade(store),
            selection,
            expansion,
            connections: [before_load, update, update_children],
        }
    }

    pub fn selection(&self) -> &Arc<Mutex<SelectionModel>> {
        &self.selection
    }

    /// Expansion state captured before the last load.
    pub fn expansion(&self) -> ExpansionState {
        self.expansion.lock().clone()
    }

    /// Replay the captured expansion state. Returns the number of nodes expanded.
    pub async fn restore(&self) -> Result<usize> {
        let Some(store) = self.store.upgrade() else {
            return Ok(0);
        };
        let state = self.expansion.lock().clone();
        if state.is_empty() {
            return Ok(0);
        }
        let restored = restore_expanded_rows(&store, &state).await?;
        tracing::debug!(target: targets::RECONCILE, restored, "expansion restored");
        Ok(restored)
    }
}

impl Drop for TreeBinding {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            let signals = store.signals();
            let [before_load, update, update_children] = self.connections;
            signals.before_load.disconnect(before_load);
            signals.update.disconnect(update);
            signals.update_children.disconnect(update_children);
        }
    }
}
