//! Schema module for tributary rows.
//!
//! A row type is an ordered list of named, typed fields. Row types are shared
//! by reference and compared structurally: labels, tables and aggregators all
//! check that the rows they receive were built for a compatible type.

mod field;
mod row_type;

pub use field::Field;
pub use row_type::{RowType, RowTypeBuilder, RowTypeRef};
