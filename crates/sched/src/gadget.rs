//! Gadgets.
//!
//! A gadget is an output point of some stateful element, like a table: a
//! label together with the mode its rowops are enqueued with. The label of a
//! gadget has no handler; everything interested in the output chains to it.

use crate::label::Label;
use crate::opcode::Opcode;
use crate::rowop::{Rowop, Tray};
use crate::unit::Unit;
use alloc::string::String;
use tributary_core::{Result, Row, RowTypeRef};

/// How a rowop is handed to the unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EnqMode {
    /// Append to the outermost frame.
    Schedule,
    /// Append to the innermost frame.
    Fork,
    /// Execute right away.
    #[default]
    Call,
    /// Drop.
    Ignore,
}

impl EnqMode {
    /// Returns the mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnqMode::Schedule => "schedule",
            EnqMode::Fork => "fork",
            EnqMode::Call => "call",
            EnqMode::Ignore => "ignore",
        }
    }
}

/// A label with an enqueueing mode.
#[derive(Clone, Debug)]
pub struct Gadget {
    unit: Unit,
    label: Label,
    mode: EnqMode,
}

impl Gadget {
    /// Creates a gadget with a fresh handler-less label.
    pub fn new(unit: &Unit, row_type: RowTypeRef, name: impl Into<String>, mode: EnqMode) -> Self {
        Self {
            unit: unit.clone(),
            label: Label::dummy(unit, row_type, name),
            mode,
        }
    }

    /// Returns the unit.
    #[inline]
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Returns the output label.
    #[inline]
    pub fn label(&self) -> &Label {
        &self.label
    }

    /// Returns the enqueueing mode.
    #[inline]
    pub fn mode(&self) -> EnqMode {
        self.mode
    }

    /// Changes the enqueueing mode.
    pub fn set_mode(&mut self, mode: EnqMode) {
        self.mode = mode;
    }

    /// Sends a row through the gadget.
    ///
    /// If `copy` is given, the rowop is also appended to it, even when the
    /// mode is `Ignore`.
    pub fn send(&self, opcode: Opcode, row: Row, copy: Option<&mut Tray>) -> Result<()> {
        if self.mode == EnqMode::Ignore && copy.is_none() {
            return Ok(());
        }
        let rowop = self.label.make_rowop(opcode, row)?;
        if let Some(copy) = copy {
            copy.push(rowop.clone());
        }
        self.unit.enqueue(self.mode, rowop)
    }

    /// Appends a rowop for this gadget to `dest` without enqueueing it.
    pub fn send_delayed(&self, dest: &mut Tray, opcode: Opcode, row: Row) -> Result<()> {
        dest.push(self.label.make_rowop(opcode, row)?);
        Ok(())
    }

    /// Enqueues a whole tray with this gadget's mode.
    pub fn enqueue_tray(&self, tray: Tray) -> Result<()> {
        self.unit.enqueue_tray(self.mode, tray)
    }

    /// Builds a rowop for this gadget.
    pub fn make_rowop(&self, opcode: Opcode, row: Row) -> Result<Rowop> {
        self.label.make_rowop(opcode, row)
    }
}
