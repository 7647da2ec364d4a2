//! Tributary Table - Tables with nested indexes and incremental aggregation.
//!
//! A table stores rows of one row type under a tree of indexes. The shape of
//! the tree is described once by a `TableType`, then any number of tables
//! are created from it:
//!
//! - `IndexType`: Hashed, ordered, user-sorted and FIFO indexes, nestable
//!   into groups (a FIFO index is always a leaf)
//! - `TableType`: A row type plus the index tree, compiled by `initialize()`
//! - `Table`: The live rows, with `insert`/`remove` and ordered navigation
//! - `RowHandle`: A row prepared for one table
//! - `AggregatorType` / `Aggregator`: Per-group derived rows, maintained by
//!   hooks the table calls around each mutation
//!
//! Every change is reported as rowops on the table's `<name>.out` label,
//! enqueued in the table's unit.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use tributary_core::{DataType, RowTypeBuilder, Value};
//! use tributary_sched::{EnqMode, Unit};
//! use tributary_table::{IndexType, Table, TableType};
//!
//! let unit = Unit::new("u");
//! let rt = RowTypeBuilder::new()
//!     .add_field("id", DataType::Int32).unwrap()
//!     .add_field("name", DataType::String).unwrap()
//!     .build().unwrap();
//!
//! let mut tt = TableType::new(rt.clone())
//!     .add_subindex("fifo", IndexType::fifo_limited(2, false, false));
//! assert!(tt.initialize());
//! let table = Table::new(&Rc::new(tt), &unit, EnqMode::Call, "t").unwrap();
//!
//! for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
//!     let row = rt.make_row(vec![Value::Int32(id), Value::String(name.into())]).unwrap();
//!     table.insert_row(row).unwrap();
//! }
//! assert_eq!(table.size(), 2);
//! let first = table.begin().unwrap();
//! assert_eq!(first.row().get_field(0), Some(&Value::Int32(2)));
//! ```

#![no_std]

extern crate alloc;

pub mod aggregator;
mod group;
mod handle;
mod index;
pub mod index_type;
pub mod key;
mod state;
pub mod table;
pub mod table_type;

pub use aggregator::{AggOp, Aggregator, AggregatorContext, AggregatorType, BasicAggregatorType, SummaryAggregatorType};
pub use handle::{HandleId, RowHandle};
pub use index_type::{IndexId, IndexType};
pub use key::{KeyField, Order, SortCondition};
pub use table::Table;
pub use table_type::TableType;
