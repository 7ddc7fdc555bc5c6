//! Arena storage for tree records.
//!
//! Nodes live in a [`SlotMap`] and refer to each other by [`NodeId`]. Paths
//! are never stored: a node's path is derived from its position among the
//! *visible* children of each ancestor. The arena is reused across loads, so
//! ids from an earlier load never resolve to nodes of a later one.

use serde_json::Value as Json;
use slotmap::{SlotMap, new_key_type};

use crate::error::Result;
use crate::model::{FilterMode, Filters, Record, RecordHash, Schema, Sorters, Value};

new_key_type! {
    /// Stable identifier of a tree node.
    ///
    /// Valid until the node is removed or the store reloads.
    pub struct NodeId;
}

/// How raw records describe their children.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChildLayout<'a> {
    pub children_field: &'a str,
    pub remote_expand: bool,
}

/// Interpretation of a raw record's children key.
enum RawChildren<'a> {
    /// Children are present.
    Materialized(&'a [Json]),
    /// Children exist on the backend (`true`).
    Unfetched,
    /// No children.
    Leaf,
}

impl<'a> RawChildren<'a> {
    fn classify(raw: Option<&'a Json>, remote_expand: bool) -> Self {
        match raw {
            Some(Json::Array(items)) => Self::Materialized(items),
            Some(Json::Bool(true)) => Self::Unfetched,
            Some(Json::Number(n)) if n.as_f64().is_some_and(|f| f != 0.0) => Self::Unfetched,
            None if remote_expand => Self::Unfetched,
            _ => Self::Leaf,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TreeNode {
    pub record: Record,
    pub parent: Option<NodeId>,
    /// `None` until children are fetched.
    pub children: Option<Vec<NodeId>>,
    /// Whether unfetched children are expected.
    pub has_child_hint: bool,
    pub expanded: bool,
    pub visible: bool,
}

/// Tree records with derived sort and filter state.
#[derive(Debug, Default)]
pub(crate) struct TreeData {
    nodes: SlotMap<NodeId, TreeNode>,
    roots: Vec<NodeId>,
    sorters: Option<Sorters>,
    filters: Option<Filters>,
    filter_mode: FilterMode,
    sort_stale: bool,
    filter_stale: bool,
}

impl TreeData {
    /// Drop every node. Existing ids stop resolving.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.sorters = None;
        self.filters = None;
        self.sort_stale = false;
        self.filter_stale = false;
    }

    /// Replace all nodes with a freshly built forest.
    pub fn rebuild(&mut self, schema: &Schema, raw: &[Json], layout: ChildLayout<'_>) -> Result<()> {
        self.clear();
        match self.insert_all(schema, raw, None, layout) {
            Ok(roots) => {
                self.roots = roots;
                Ok(())
            }
            Err(err) => {
                self.clear();
                Err(err)
            }
        }
    }

    /// Replace the children of `id` with a fetched list.
    ///
    /// Derivation claims are dropped so the caller re-applies sort and filter
    /// to the new nodes.
    pub fn set_children(
        &mut self,
        id: NodeId,
        schema: &Schema,
        raw: &[Json],
        layout: ChildLayout<'_>,
    ) -> Result<()> {
        let new_children = self.insert_all(schema, raw, Some(id), layout)?;
        let Some(node) = self.nodes.get_mut(id) else {
            for child in new_children {
                self.remove_subtree(child);
            }
            return Ok(());
        };
        let has_children = !new_children.is_empty();
        let old = node.children.replace(new_children);
        node.has_child_hint = has_children;
        for child in old.into_iter().flatten() {
            self.remove_subtree(child);
        }
        self.sorters = None;
        self.filters = None;
        Ok(())
    }

    fn insert_all(
        &mut self,
        schema: &Schema,
        raw: &[Json],
        parent: Option<NodeId>,
        layout: ChildLayout<'_>,
    ) -> Result<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(raw.len());
        for item in raw {
            match self.insert(schema, item, parent, layout) {
                Ok(id) => ids.push(id),
                Err(err) => {
                    for id in ids {
                        self.remove_subtree(id);
                    }
                    return Err(err);
                }
            }
        }
        Ok(ids)
    }

    fn insert(
        &mut self,
        schema: &Schema,
        raw: &Json,
        parent: Option<NodeId>,
        layout: ChildLayout<'_>,
    ) -> Result<NodeId> {
        let record = Record::from_json_skipping(schema, raw, &[layout.children_field])?;
        let children = RawChildren::classify(raw.get(layout.children_field), layout.remote_expand);
        let id = self.nodes.insert(TreeNode {
            record,
            parent,
            children: None,
            has_child_hint: matches!(children, RawChildren::Unfetched),
            expanded: false,
            visible: true,
        });
        if let RawChildren::Materialized(items) = children {
            match self.insert_all(schema, items, Some(id), layout) {
                Ok(ids) => {
                    self.nodes[id].has_child_hint = !ids.is_empty();
                    self.nodes[id].children = Some(ids);
                }
                Err(err) => {
                    self.nodes.remove(id);
                    return Err(err);
                }
            }
        }
        Ok(id)
    }

    fn remove_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children.into_iter().flatten());
            }
        }
    }

    /// Detach and drop `id` with its descendants.
    pub fn remove(&mut self, id: NodeId) -> Option<Record> {
        let parent = self.nodes.get(id)?.parent;
        match parent {
            Some(parent) => {
                if let Some(children) = self.nodes.get_mut(parent).and_then(|n| n.children.as_mut()) {
                    children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
        let record = self.nodes.get(id).map(|n| n.record.clone());
        self.remove_subtree(id);
        record
    }

    /// Replace the record of `id`, keeping its children.
    ///
    /// The sibling order becomes caller-defined.
    pub fn replace_record(&mut self, id: NodeId, record: Record) -> Option<Record> {
        let node = self.nodes.get_mut(id)?;
        self.sorters = None;
        self.filter_stale |= self.filters.is_some();
        Some(std::mem::replace(&mut node.record, record))
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Materialized children of `parent` (roots for `None`).
    fn children_of(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            None => &self.roots,
            Some(id) => self
                .nodes
                .get(id)
                .and_then(|n| n.children.as_deref())
                .unwrap_or(&[]),
        }
    }

    fn is_visible(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.visible)
    }

    /// Visible children of `parent` in order.
    pub fn visible_children(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        self.children_of(parent)
            .iter()
            .copied()
            .filter(|id| self.is_visible(*id))
            .collect()
    }

    /// Resolve a path of visible child indices.
    pub fn node_at(&self, path: &[usize]) -> Option<NodeId> {
        let mut current = None;
        for &index in path {
            let next = self
                .children_of(current)
                .iter()
                .copied()
                .filter(|id| self.is_visible(*id))
                .nth(index)?;
            current = Some(next);
        }
        current
    }

    /// Path of a visible node.
    pub fn path_of(&self, id: NodeId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = id;
        loop {
            let node = self.nodes.get(current)?;
            if !node.visible {
                return None;
            }
            let position = self
                .children_of(node.parent)
                .iter()
                .copied()
                .filter(|sibling| self.is_visible(*sibling))
                .position(|sibling| sibling == current)?;
            path.push(position);
            match node.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        path.reverse();
        Some(path)
    }

    /// Ancestors of `id`, root first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.nodes.get(parent).and_then(|n| n.parent);
        }
        chain.reverse();
        chain
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).len()
    }

    /// Whether `id` has, or is expected to have, children.
    pub fn has_child(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| match &n.children {
            Some(children) => !children.is_empty(),
            None => n.has_child_hint,
        })
    }

    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) if node.expanded != expanded => {
                node.expanded = expanded;
                true
            }
            _ => false,
        }
    }

    /// Visible nodes in pre-order with their depth.
    ///
    /// With `expanded_only`, descends only into expanded nodes: the rows a
    /// tree view renders.
    pub fn walk(&self, expanded_only: bool) -> Vec<(NodeId, usize)> {
        let mut out = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = self
            .visible_children(None)
            .into_iter()
            .rev()
            .map(|id| (id, 0))
            .collect();
        while let Some((id, depth)) = stack.pop() {
            out.push((id, depth));
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if expanded_only && !node.expanded {
                continue;
            }
            stack.extend(
                self.visible_children(Some(id))
                    .into_iter()
                    .rev()
                    .map(|child| (child, depth + 1)),
            );
        }
        out
    }

    /// Every node, hidden ones included, in arena order.
    pub fn iter_all(&self) -> impl Iterator<Item = (NodeId, &TreeNode)> {
        self.nodes.iter()
    }

    pub fn iter_all_mut(&mut self) -> impl Iterator<Item = &mut TreeNode> {
        self.nodes.values_mut()
    }

    /// Any materialized node with identity `hash`.
    pub fn find_by_hash(&self, hash: &RecordHash) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, n)| &n.record.hash() == hash)
            .map(|(id, _)| id)
    }

    /// Visible child of `parent` with identity `hash`.
    pub fn child_by_hash(&self, parent: Option<NodeId>, hash: &RecordHash) -> Option<NodeId> {
        self.children_of(parent)
            .iter()
            .copied()
            .filter(|id| self.is_visible(*id))
            .find(|id| self.nodes.get(*id).is_some_and(|n| &n.record.hash() == hash))
    }

    /// First visible node, in pre-order, whose `field` equals `value`.
    pub fn find(&self, field: &str, value: &Value) -> Option<NodeId> {
        self.walk(false)
            .into_iter()
            .map(|(id, _)| id)
            .find(|id| self.nodes.get(*id).is_some_and(|n| n.record.value(field).loose_eq(value)))
    }

    // -------------------------------------------------------------------------
    // Derivation
    // -------------------------------------------------------------------------

    /// Sort every sibling list independently.
    pub fn sort(&mut self, sorters: &Sorters) {
        let _span = horizon_store_core::PerfSpan::new("tree.sort");
        self.sort_stale = false;
        if sorters.is_empty() {
            self.sorters = None;
            return;
        }
        let nodes = &self.nodes;
        self.roots
            .sort_by(|a, b| sorters.compare(&nodes[*a].record, &nodes[*b].record));
        let parents: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.children.as_ref().is_some_and(|c| c.len() > 1))
            .map(|(id, _)| id)
            .collect();
        for parent in parents {
            let Some(mut children) = self.nodes[parent].children.take() else {
                continue;
            };
            children.sort_by(|a, b| sorters.compare(&self.nodes[*a].record, &self.nodes[*b].record));
            self.nodes[parent].children = Some(children);
        }
        self.sorters = Some(sorters.clone());
    }

    /// Hide nodes that neither match nor have a matching descendant.
    pub fn filter(&mut self, filters: &Filters, mode: FilterMode) {
        let _span = horizon_store_core::PerfSpan::new("tree.filter");
        self.filters = (!filters.is_empty()).then(|| filters.clone());
        self.filter_mode = mode;
        self.filter_stale = false;
        self.mark_visible();
    }

    /// Settle visibility bottom-up: children before their parent.
    fn mark_visible(&mut self) {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = self.roots.clone();
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(children) = self.nodes.get(id).and_then(|n| n.children.as_ref()) {
                stack.extend(children.iter().copied());
            }
        }
        for id in order.into_iter().rev() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let descendant_visible = node
                .children
                .iter()
                .flatten()
                .any(|child| self.nodes.get(*child).is_some_and(|c| c.visible));
            let own = self
                .filters
                .as_ref()
                .is_none_or(|f| f.matches(&node.record, self.filter_mode));
            if let Some(node) = self.nodes.get_mut(id) {
                node.visible = own || descendant_visible;
            }
        }
    }

    pub fn assume_sorted(&mut self, sorters: &Sorters) {
        self.sorters = (!sorters.is_empty()).then(|| sorters.clone());
        self.sort_stale = false;
    }

    pub fn assume_filtered(&mut self, filters: &Filters, mode: FilterMode) {
        self.filters = (!filters.is_empty()).then(|| filters.clone());
        self.filter_mode = mode;
        self.filter_stale = false;
    }

    /// Mark the sort and filter claims that read `field` as stale.
    pub fn invalidate_field(&mut self, field: &str) {
        if self.sorters.as_ref().is_some_and(|s| s.references(field)) {
            self.sort_stale = true;
        }
        if self.filters.as_ref().is_some_and(|f| f.references(field)) {
            self.filter_stale = true;
        }
    }

    pub fn is_sorted_by(&self, sorters: &Sorters) -> bool {
        if self.sort_stale {
            return false;
        }
        match &self.sorters {
            Some(current) => current == sorters,
            None => sorters.is_empty(),
        }
    }

    pub fn is_filtered_by(&self, filters: &Filters, mode: FilterMode) -> bool {
        if self.filter_stale {
            return false;
        }
        match &self.filters {
            Some(current) => current == filters && self.filter_mode == mode,
            None => filters.is_empty() && self.nodes.values().all(|n| n.visible),
        }
    }
}
