//! Tributary Sched - The single-threaded rowop scheduler.
//!
//! Every change flowing through the engine is a `Rowop`: a row, an opcode
//! telling whether it is an insert or a delete, and the `Label` that should
//! handle it. Labels belong to a `Unit`, which owns a stack of pending-rowop
//! frames and decides when each rowop runs.
//!
//! # Core Concepts
//!
//! - `Opcode`: Bitmask classifying a rowop as insert and/or delete
//! - `Rowop` / `Tray`: One event, and an ordered batch of events
//! - `Label`: A schema-bound handler that can be chained to other labels
//! - `Unit`: The scheduler with `schedule`, `fork` and `call` entry points
//! - `Gadget`: A label plus an enqueueing mode, used by tables to emit output
//! - `UnitTracer`: Hook observing every step of label execution
//!
//! # Example
//!
//! ```rust
//! use tributary_core::{DataType, Value};
//! use tributary_core::schema::RowTypeBuilder;
//! use tributary_sched::{Label, Opcode, Unit};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let unit = Unit::new("u");
//! let rt = RowTypeBuilder::new().add_field("a", DataType::Int32).unwrap().build().unwrap();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! let lb = Label::new(&unit, rt.clone(), "lb", move |_: &Label, rop: &tributary_sched::Rowop| {
//!     sink.borrow_mut().push(rop.opcode());
//!     Ok(())
//! });
//!
//! let row = rt.make_row(vec![Value::Int32(1)]).unwrap();
//! unit.schedule(lb.make_rowop(Opcode::INSERT, row).unwrap()).unwrap();
//! assert!(seen.borrow().is_empty());
//! unit.drain().unwrap();
//! assert_eq!(*seen.borrow(), vec![Opcode::INSERT]);
//! ```

#![no_std]

extern crate alloc;

pub mod gadget;
pub mod label;
pub mod opcode;
pub mod rowop;
pub mod tracer;
pub mod unit;

pub use gadget::{EnqMode, Gadget};
pub use label::{Label, LabelHandler, LabelId};
pub use opcode::Opcode;
pub use rowop::{Rowop, Tray};
pub use tracer::{StringNameTracer, TraceWhen, UnitTracer};
pub use unit::{Unit, UnitConfig};
