//! Tributary Core - Row types, rows and diagnostics for the tributary engine.
//!
//! This crate provides the foundational types shared by the scheduler and the
//! table engine:
//!
//! - `DataType`: Supported field types (Int32, Int64, Float64, String, Bytes)
//! - `Value`: Runtime values that can be stored in a row field
//! - `RowType`: An ordered set of named, typed fields
//! - `Row`: An immutable, reference-counted record of a `RowType`
//! - `Errors`: The hierarchical diagnostic tree used for definition errors
//! - `Error`: Error types for runtime operations
//!
//! # Example
//!
//! ```rust
//! use tributary_core::{DataType, Value};
//! use tributary_core::schema::RowTypeBuilder;
//!
//! let rt = RowTypeBuilder::new()
//!     .add_field("id", DataType::Int64)
//!     .unwrap()
//!     .add_field("name", DataType::String)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let row = rt.make_row(vec![Value::Int64(1), Value::String("Alice".into())]).unwrap();
//!
//! assert_eq!(row.get_field(1), Some(&Value::String("Alice".into())));
//! assert_eq!(rt.field_index("name"), Some(1));
//! ```

#![no_std]

extern crate alloc;

mod error;
mod errors;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use errors::Errors;
pub use row::Row;
pub use schema::{Field, RowType, RowTypeBuilder, RowTypeRef};
pub use types::DataType;
pub use value::Value;
