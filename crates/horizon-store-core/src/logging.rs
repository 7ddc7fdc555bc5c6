//! Logging facilities for Horizon Store.
//!
//! Horizon Store uses the `tracing` crate for instrumentation. Library code
//! never installs a subscriber; to see logs, install one in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_store=debug")
//!     .init();
//! ```
//!
//! Every event is emitted under one of the [`targets`] below so subsystems can
//! be filtered independently.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Signal emission.
    pub const SIGNAL: &str = "horizon_store_core::signal";
    /// Performance spans.
    pub const PERF: &str = "horizon_store::perf";
    /// Flat store lifecycle (load, sort, filter, commit).
    pub const STORE: &str = "horizon_store::store";
    /// Tree store lifecycle (expand, child loading, path discovery).
    pub const TREE: &str = "horizon_store::tree";
    /// Selection and expansion reconciliation.
    pub const RECONCILE: &str = "horizon_store::reconcile";
    /// HTTP transport.
    pub const HTTP: &str = "horizon_store_net::http";
}

/// A performance tracing span guard.
///
/// Wraps a synchronous, CPU-bound section (an in-memory sort or filter pass)
/// in an `info`-level span under [`targets::PERF`]. The span stays entered
/// until the guard is dropped, so it must not be held across an `.await`.
///
/// # Example
///
/// ```
/// use horizon_store_core::logging::PerfSpan;
///
/// {
///     let _span = PerfSpan::new("sort");
///     // ... work ...
/// }
/// ```
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create and enter a new performance span.
    pub fn new(operation: &'static str) -> Self {
        let span = tracing::info_span!(target: "horizon_store::perf", "perf", operation);
        Self {
            _span: span.entered(),
        }
    }
}

impl std::fmt::Debug for PerfSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerfSpan").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_span_enters_and_drops() {
        let _span = PerfSpan::new("test_operation");
    }

    #[test]
    fn test_targets_are_namespaced() {
        for target in [
            targets::SIGNAL,
            targets::PERF,
            targets::STORE,
            targets::TREE,
            targets::RECONCILE,
            targets::HTTP,
        ] {
            assert!(target.starts_with("horizon_store"));
        }
    }
}
