//! Record data model.
//!
//! - [`Value`]: a typed cell with a total order
//! - [`Schema`]: turns raw JSON objects into typed fields
//! - [`Record`]: one row with dirty tracking and a stable [`RecordHash`]
//! - [`RecordSet`]: the records of a load with derived sort and filter state
//! - [`Sorters`] / [`Filters`]: criteria and their wire formats

mod filter;
mod record;
mod record_set;
mod schema;
mod sorter;
mod value;

pub use filter::{Filter, FilterMode, FilterOperator, FilterValue, Filters};
pub use record::{Record, RecordHash};
pub(crate) use record::map_to_json;
pub use record_set::RecordSet;
pub use schema::{FieldDef, FieldType, Schema};
pub use sorter::{SortDirection, Sorter, Sorters};
pub use value::{DATE_FORMAT, Value, parse_date};
