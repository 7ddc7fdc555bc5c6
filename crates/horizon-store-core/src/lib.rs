//! Core systems for Horizon Store.
//!
//! This crate provides the foundational pieces shared by the store crates:
//!
//! - **Signal/Slot System**: Type-safe change notification used by stores to
//!   announce `beforeLoad`, `load`, `update` and record edits
//! - **Logging**: `tracing` target names and a performance span guard
//!
//! # Signal/Slot Example
//!
//! ```
//! use horizon_store_core::Signal;
//!
//! let update = Signal::<()>::new();
//! let conn_id = update.connect(|_| println!("store updated"));
//!
//! update.emit(());
//! update.disconnect(conn_id);
//! ```

pub mod logging;
pub mod signal;

pub use logging::PerfSpan;
pub use signal::{ConnectionId, Signal};
