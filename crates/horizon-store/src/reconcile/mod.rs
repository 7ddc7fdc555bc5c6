//! Selection and expansion persistence across data refreshes.
//!
//! State is keyed by [`RecordHash`](crate::RecordHash), never by row or path,
//! so it survives reloads, sorts and filters as long as an equal record is
//! still present. The reconciliation steps are pure functions; the
//! [`GridBinding`] and [`TreeBinding`] types drive them from store signals.

mod binding;
mod expansion;
mod selection;

pub use binding::{GridBinding, TreeBinding};
pub use expansion::{ExpansionState, plan_expansion_replay, restore_expanded_rows};
pub use selection::{
    SelectionFlags, SelectionMode, SelectionModel, SelectionReconciliation, SelectionState,
    reconcile_selection,
};
