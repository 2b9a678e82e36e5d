//! Base query builder.
//!
//! Structured select/insert/update/delete statements shared by the relation
//! engine and the executors. Rows are JSON maps keyed by column name.

pub mod mutation;
pub mod predicate;
pub mod render;
pub mod select;

pub use mutation::{DeleteStatement, InsertStatement, UpdateStatement};
pub use predicate::{ColumnRef, CompareOp, Operand, Predicate};
pub use select::{Join, Order, Projection, SelectQuery};

pub use serde_json::Value;

/// A result row, keyed by column name (or select alias)
pub type Row = serde_json::Map<String, Value>;
