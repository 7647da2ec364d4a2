//! Execution tracing.
//!
//! A unit can carry one tracer, which is told about every step of every label
//! execution. `StringNameTracer` records readable lines and is the usual tool
//! for checking scheduling order in tests.

use crate::label::Label;
use crate::rowop::Rowop;
use crate::unit::Unit;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

/// The point of label execution being reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraceWhen {
    /// Before the label's handler runs.
    Before,
    /// After the handler, before draining what it forked.
    BeforeDrain,
    /// After the forked rowops were drained.
    AfterDrain,
    /// Before executing the chained labels.
    BeforeChained,
    /// After all chained labels ran.
    AfterChained,
    /// When the label is completely done.
    After,
}

impl TraceWhen {
    /// Returns the short name used in trace lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceWhen::Before => "before",
            TraceWhen::BeforeDrain => "drain",
            TraceWhen::AfterDrain => "after-drain",
            TraceWhen::BeforeChained => "before-chained",
            TraceWhen::AfterChained => "after-chained",
            TraceWhen::After => "after",
        }
    }
}

/// Observer of label execution.
pub trait UnitTracer {
    /// Called at each `when` point. `from` is the label this one was chained
    /// from, if it runs as part of a chain.
    fn execute(&self, unit: &Unit, label: &Label, from: Option<&Label>, rowop: &Rowop, when: TraceWhen);
}

/// Records one line per traced step, naming the labels.
///
/// A non-verbose tracer records only `Before`.
pub struct StringNameTracer {
    verbose: bool,
    buffer: RefCell<Vec<String>>,
}

impl StringNameTracer {
    /// Creates a tracer.
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            buffer: RefCell::new(Vec::new()),
        }
    }

    /// Returns the recorded lines.
    pub fn lines(&self) -> Vec<String> {
        self.buffer.borrow().clone()
    }

    /// Returns the recorded lines joined with newlines.
    pub fn print(&self) -> String {
        let mut out = String::new();
        for line in self.buffer.borrow().iter() {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Discards the recorded lines.
    pub fn clear_buffer(&self) {
        self.buffer.borrow_mut().clear();
    }
}

impl UnitTracer for StringNameTracer {
    fn execute(&self, unit: &Unit, label: &Label, from: Option<&Label>, rowop: &Rowop, when: TraceWhen) {
        if !self.verbose && when != TraceWhen::Before {
            return;
        }
        let line = match from {
            Some(from) => format!(
                "unit '{}' {} label '{}' (chain '{}') op {}",
                unit.name(),
                when.as_str(),
                label.name(),
                from.name(),
                rowop.opcode()
            ),
            None => format!(
                "unit '{}' {} label '{}' op {}",
                unit.name(),
                when.as_str(),
                label.name(),
                rowop.opcode()
            ),
        };
        self.buffer.borrow_mut().push(line);
    }
}
