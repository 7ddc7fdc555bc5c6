//! Tree expansion state keyed by depth and record identity.
//!
//! Expanded nodes are remembered per depth so they can be re-expanded after
//! a reload, one level at a time: a node at depth 1 can only be found once
//! its parent at depth 0 has been expanded and its children materialized.

use std::collections::BTreeMap;

use horizon_store_core::logging::targets;

use crate::error::{Result, StoreError};
use crate::model::{Record, RecordHash};
use crate::tree::{NodeId, TreeRow, TreeStore, TreeTarget};

/// Expanded records per tree depth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpansionState {
    levels: BTreeMap<usize, Vec<(RecordHash, Record)>>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the expanded rows currently rendered by `store`.
    pub fn capture(store: &TreeStore) -> Self {
        let mut state = Self::new();
        for TreeRow {
            depth,
            record,
            expanded,
            ..
        } in store.visible_rows()
        {
            if expanded {
                state.record_expanded(depth, record);
            }
        }
        state
    }

    /// Remember that `record` is expanded at `depth`.
    pub fn record_expanded(&mut self, depth: usize, record: Record) {
        let hash = record.hash();
        let level = self.levels.entry(depth).or_default();
        match level.iter_mut().find(|(h, _)| *h == hash) {
            Some(entry) => entry.1 = record,
            None => level.push((hash, record)),
        }
    }

    /// Forget `record` at `depth`. Returns `false` if it was not tracked.
    pub fn record_collapsed(&mut self, depth: usize, record: &Record) -> bool {
        let hash = record.hash();
        let Some(level) = self.levels.get_mut(&depth) else {
            return false;
        };
        let before = level.len();
        level.retain(|(h, _)| *h != hash);
        let removed = level.len() != before;
        if level.is_empty() {
            self.levels.remove(&depth);
        }
        removed
    }

    pub fn is_expanded(&self, depth: usize, hash: &RecordHash) -> bool {
        self.levels
            .get(&depth)
            .is_some_and(|level| level.iter().any(|(h, _)| h == hash))
    }

    /// Tracked depths, ascending.
    pub fn depths(&self) -> impl Iterator<Item = usize> + '_ {
        self.levels.keys().copied()
    }

    /// Records tracked at `depth` in the order they were expanded.
    pub fn at_depth(&self, depth: usize) -> &[(RecordHash, Record)] {
        self.levels.get(&depth).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }
}

/// Pick the nodes at `depth` that should be re-expanded.
///
/// `candidates` are the nodes currently rendered at `depth`; the result keeps
/// their order, so replay follows data order rather than expansion order.
pub fn plan_expansion_replay(
    state: &ExpansionState,
    depth: usize,
    candidates: &[(NodeId, Record)],
) -> Vec<NodeId> {
    candidates
        .iter()
        .filter(|(_, record)| state.is_expanded(depth, &record.hash()))
        .map(|(id, _)| *id)
        .collect()
}

/// Re-expand the nodes of `state` in `store`, shallowest level first.
///
/// Each level waits for every expansion of the previous one, so children
/// fetched remotely are present before the next level is matched. Nodes that
/// vanished meanwhile are skipped. Returns the number of nodes expanded.
pub async fn restore_expanded_rows(store: &TreeStore, state: &ExpansionState) -> Result<usize> {
    let mut restored = 0;
    for depth in state.depths() {
        let candidates: Vec<(NodeId, Record)> = store
            .rows_at_depth(depth)
            .into_iter()
            .map(|row| (row.id, row.record))
            .collect();
        let plan = plan_expansion_replay(state, depth, &candidates);
        tracing::debug!(
            target: targets::RECONCILE,
            depth,
            tracked = state.at_depth(depth).len(),
            matched = plan.len(),
            "replaying expansion"
        );
        for id in plan {
            match store.expand(TreeTarget::Node(id)).await {
                Ok(true) => restored += 1,
                Ok(false) | Err(StoreError::NodeNotFound) => {}
                Err(err) => return Err(err),
            }
        }
    }
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Schema;
    use serde_json::json;
    use slotmap::SlotMap;

    fn record(id: &str) -> Record {
        Record::from_json(&Schema::open(["id"]), &json!({"id": id})).unwrap()
    }

    #[test]
    fn test_record_and_collapse() {
        let mut state = ExpansionState::new();
        state.record_expanded(0, record("A"));
        state.record_expanded(0, record("A"));
        state.record_expanded(1, record("B"));
        assert_eq!(state.len(), 2);
        assert_eq!(state.depths().collect::<Vec<_>>(), vec![0, 1]);

        assert!(state.record_collapsed(1, &record("B")));
        assert!(!state.record_collapsed(1, &record("B")));
        assert_eq!(state.depths().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_plan_follows_candidate_order() {
        let mut ids: SlotMap<NodeId, ()> = SlotMap::with_key();
        let (a, b, c) = (ids.insert(()), ids.insert(()), ids.insert(()));

        let mut state = ExpansionState::new();
        state.record_expanded(0, record("C"));
        state.record_expanded(0, record("A"));
        state.record_expanded(1, record("B"));

        let candidates = vec![(a, record("A")), (b, record("B")), (c, record("C"))];
        assert_eq!(plan_expansion_replay(&state, 0, &candidates), vec![a, c]);
        assert_eq!(plan_expansion_replay(&state, 1, &candidates), vec![b]);
        assert!(plan_expansion_replay(&state, 2, &candidates).is_empty());
    }
}
