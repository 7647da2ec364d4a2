//! The scheduler.
//!
//! A `Unit` keeps an explicit stack of frames, each a FIFO queue of rowops.
//! The bottom (outermost) frame is never popped.
//!
//! - `schedule` appends to the outermost frame: the rowop runs once the
//!   whole current call stack has finished and the outer loop gets to it.
//! - `fork` appends to the innermost frame: the rowop runs after the label
//!   currently executing, before control returns to whoever called it.
//! - `call` executes the rowop right away in a frame of its own and returns
//!   only when everything it forked, recursively, is done.
//!
//! Every rowop taken from a queue runs in a freshly pushed frame, so what it
//! forks is kept apart from its still-queued siblings. A label's execution
//! is: handler, drain the frame, then each chained label with the same rowop.
//!
//! Nothing is held borrowed while a label runs, so handlers may freely call
//! back into the unit.

use crate::label::{Label, LabelId, LabelInner};
use crate::rowop::{Rowop, Tray};
use crate::tracer::{TraceWhen, UnitTracer};
use crate::gadget::EnqMode;
use alloc::collections::VecDeque;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use hashbrown::HashMap;
use tracing::{trace, warn};
use tributary_core::{Error, Result};

/// Limits and policies of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitConfig {
    /// Maximal number of frames, the outermost included. `None` is unlimited.
    /// Every executed rowop needs a frame above the outermost one, so values
    /// below 2 are raised to 2.
    pub max_stack_depth: Option<usize>,
    /// How many times one label may be active at once. `None` is unlimited.
    pub max_recursion_depth: Option<usize>,
    /// Refuse chains that close a cycle instead of warning about them.
    pub reject_chain_cycles: bool,
}

impl UnitConfig {
    /// Smallest stack depth a unit can run with.
    pub const MIN_STACK_DEPTH: usize = 2;

    fn normalized(mut self) -> Self {
        if let Some(depth) = self.max_stack_depth.filter(|&d| d < Self::MIN_STACK_DEPTH) {
            warn!(depth, min = Self::MIN_STACK_DEPTH, "max stack depth too small, raised");
            self.max_stack_depth = Some(Self::MIN_STACK_DEPTH);
        }
        self
    }
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: None,
            max_recursion_depth: Some(1),
            reject_chain_cycles: false,
        }
    }
}

pub(crate) struct UnitInner {
    name: String,
    frames: RefCell<Vec<VecDeque<Rowop>>>,
    config: Cell<UnitConfig>,
    tracer: RefCell<Option<Rc<dyn UnitTracer>>>,
    active: RefCell<HashMap<LabelId, usize>>,
    labels: RefCell<Vec<Weak<LabelInner>>>,
}

/// The single-threaded rowop scheduler.
///
/// `Unit` is a cheap handle: clones refer to the same scheduler.
#[derive(Clone)]
pub struct Unit {
    pub(crate) inner: Rc<UnitInner>,
}

impl Unit {
    /// Creates a unit with the default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, UnitConfig::default())
    }

    /// Creates a unit with the given configuration.
    pub fn with_config(name: impl Into<String>, config: UnitConfig) -> Self {
        Self {
            inner: Rc::new(UnitInner {
                name: name.into(),
                frames: RefCell::new(vec![VecDeque::new()]),
                config: Cell::new(config.normalized()),
                tracer: RefCell::new(None),
                active: RefCell::new(HashMap::new()),
                labels: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Returns the unit name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the configuration.
    pub fn config(&self) -> UnitConfig {
        self.inner.config.get()
    }

    /// Replaces the configuration.
    pub fn set_config(&self, config: UnitConfig) {
        self.inner.config.set(config.normalized());
    }

    /// Installs or removes the tracer.
    pub fn set_tracer(&self, tracer: Option<Rc<dyn UnitTracer>>) {
        *self.inner.tracer.borrow_mut() = tracer;
    }

    /// Returns the current tracer.
    pub fn tracer(&self) -> Option<Rc<dyn UnitTracer>> {
        self.inner.tracer.borrow().clone()
    }

    /// Returns the number of frames, the outermost included.
    pub fn stack_depth(&self) -> usize {
        self.inner.frames.borrow().len()
    }

    /// Returns true if no rowop is queued in any frame.
    pub fn is_empty(&self) -> bool {
        self.inner.frames.borrow().iter().all(|f| f.is_empty())
    }

    /// Returns true if both handles refer to the same unit.
    pub fn ptr_eq(&self, other: &Unit) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn register_label(&self, label: &Label) {
        let mut labels = self.inner.labels.borrow_mut();
        labels.retain(|w| w.strong_count() > 0);
        labels.push(label.downgrade());
    }

    /// Clears every label of this unit and drops all queued rowops.
    ///
    /// This breaks the reference cycles created by chaining labels in loops;
    /// the labels are unusable afterwards.
    pub fn clear_labels(&self) {
        let labels: Vec<Weak<LabelInner>> = core::mem::take(&mut *self.inner.labels.borrow_mut());
        for weak in &labels {
            if let Some(label) = Label::upgrade(weak) {
                label.clear();
            }
        }
        let mut frames = self.inner.frames.borrow_mut();
        frames.truncate(1);
        frames[0].clear();
    }

    fn check(&self, rowop: &Rowop) -> Result<()> {
        let label = rowop.label();
        if !label.belongs_to(&self.inner) {
            return Err(Error::WrongUnit {
                label: label.name().into(),
                label_unit: label.unit_name().into(),
                unit: self.name().into(),
            });
        }
        Ok(())
    }

    /// Queues a rowop in the outermost frame.
    pub fn schedule(&self, rowop: Rowop) -> Result<()> {
        self.check(&rowop)?;
        self.inner.frames.borrow_mut()[0].push_back(rowop);
        Ok(())
    }

    /// Queues a rowop in the innermost frame.
    pub fn fork(&self, rowop: Rowop) -> Result<()> {
        self.check(&rowop)?;
        let mut frames = self.inner.frames.borrow_mut();
        // the stack always has at least the outermost frame
        if let Some(frame) = frames.last_mut() {
            frame.push_back(rowop);
        }
        Ok(())
    }

    /// Executes a rowop now, returning when all its effects are done.
    pub fn call(&self, rowop: Rowop) -> Result<()> {
        self.check(&rowop)?;
        // reuse the innermost frame when it is empty, but never the outermost
        let pushed = {
            let frames = self.inner.frames.borrow();
            frames.len() == 1 || frames.last().map_or(false, |f| !f.is_empty())
        };
        if pushed {
            self.push_frame()?;
        }
        let result = self.execute_label(rowop.label(), &rowop, None);
        if pushed {
            self.pop_frame();
        } else if result.is_err() {
            if let Some(frame) = self.inner.frames.borrow_mut().last_mut() {
                frame.clear();
            }
        }
        result
    }

    /// Dispatches a rowop according to `mode`.
    pub fn enqueue(&self, mode: EnqMode, rowop: Rowop) -> Result<()> {
        match mode {
            EnqMode::Schedule => self.schedule(rowop),
            EnqMode::Fork => self.fork(rowop),
            EnqMode::Call => self.call(rowop),
            EnqMode::Ignore => Ok(()),
        }
    }

    /// Schedules every rowop of the tray, in order.
    pub fn schedule_tray(&self, tray: Tray) -> Result<()> {
        self.enqueue_tray(EnqMode::Schedule, tray)
    }

    /// Forks every rowop of the tray, in order.
    pub fn fork_tray(&self, tray: Tray) -> Result<()> {
        self.enqueue_tray(EnqMode::Fork, tray)
    }

    /// Calls every rowop of the tray, in order.
    pub fn call_tray(&self, tray: Tray) -> Result<()> {
        self.enqueue_tray(EnqMode::Call, tray)
    }

    /// Dispatches every rowop of the tray according to `mode`.
    ///
    /// All rowops are checked before any is enqueued.
    pub fn enqueue_tray(&self, mode: EnqMode, tray: Tray) -> Result<()> {
        for rowop in &tray {
            self.check(rowop)?;
        }
        for rowop in tray {
            self.enqueue(mode, rowop)?;
        }
        Ok(())
    }

    /// Executes the next rowop of the outermost frame.
    ///
    /// Returns false if there was nothing to do.
    pub fn call_next(&self) -> Result<bool> {
        let next = self.inner.frames.borrow_mut()[0].pop_front();
        match next {
            Some(rowop) => {
                self.run_in_frame(&rowop)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs the outer loop until the outermost frame is empty.
    pub fn drain(&self) -> Result<()> {
        while self.call_next()? {}
        Ok(())
    }

    fn push_frame(&self) -> Result<()> {
        let mut frames = self.inner.frames.borrow_mut();
        if let Some(max) = self.config().max_stack_depth {
            if frames.len() >= max {
                return Err(Error::StackOverflow {
                    unit: self.name().into(),
                    depth: max,
                });
            }
        }
        frames.push(VecDeque::new());
        trace!(unit = self.name(), depth = frames.len(), "push frame");
        Ok(())
    }

    fn pop_frame(&self) {
        let mut frames = self.inner.frames.borrow_mut();
        if frames.len() > 1 {
            frames.pop();
            trace!(unit = self.name(), depth = frames.len(), "pop frame");
        }
    }

    fn run_in_frame(&self, rowop: &Rowop) -> Result<()> {
        self.push_frame()?;
        let result = self.execute_label(rowop.label(), rowop, None);
        self.pop_frame();
        result
    }

    /// Drains the innermost frame, each rowop in a frame of its own.
    fn drain_frame(&self) -> Result<()> {
        loop {
            let next = self
                .inner
                .frames
                .borrow_mut()
                .last_mut()
                .and_then(|f| f.pop_front());
            match next {
                Some(rowop) => self.run_in_frame(&rowop)?,
                None => return Ok(()),
            }
        }
    }

    fn enter_label(&self, label: &Label) -> Result<()> {
        let mut active = self.inner.active.borrow_mut();
        let depth = active.entry(label.id()).or_insert(0);
        *depth += 1;
        if let Some(max) = self.config().max_recursion_depth {
            if *depth > max {
                *depth -= 1;
                return Err(Error::RecursionLimit {
                    label: label.name().into(),
                    depth: max,
                });
            }
        }
        Ok(())
    }

    fn leave_label(&self, label: &Label) {
        let mut active = self.inner.active.borrow_mut();
        if let Some(depth) = active.get_mut(&label.id()) {
            *depth -= 1;
            if *depth == 0 {
                active.remove(&label.id());
            }
        }
    }

    fn trace_step(&self, label: &Label, from: Option<&Label>, rowop: &Rowop, when: TraceWhen) {
        let tracer = self.inner.tracer.borrow().clone();
        if let Some(tracer) = tracer {
            tracer.execute(self, label, from, rowop, when);
        }
    }

    fn execute_label(&self, label: &Label, rowop: &Rowop, from: Option<&Label>) -> Result<()> {
        if label.is_cleared() {
            return Ok(());
        }
        self.enter_label(label)?;
        let result = self.execute_label_steps(label, rowop, from);
        self.leave_label(label);
        result
    }

    fn execute_label_steps(&self, label: &Label, rowop: &Rowop, from: Option<&Label>) -> Result<()> {
        trace!(
            unit = self.name(),
            label = label.name(),
            opcode = rowop.opcode().bits(),
            "execute"
        );
        self.trace_step(label, from, rowop, TraceWhen::Before);

        if let Some(handler) = label.handler() {
            handler.execute(label, rowop)?;
        }

        self.trace_step(label, from, rowop, TraceWhen::BeforeDrain);
        self.drain_frame()?;
        self.trace_step(label, from, rowop, TraceWhen::AfterDrain);

        let chain = label.chained();
        if !chain.is_empty() {
            self.trace_step(label, from, rowop, TraceWhen::BeforeChained);
            for next in &chain {
                self.execute_label(next, rowop, Some(label))?;
            }
            self.trace_step(label, from, rowop, TraceWhen::AfterChained);
        }

        self.trace_step(label, from, rowop, TraceWhen::After);
        Ok(())
    }
}

impl core::fmt::Debug for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Unit({})", self.inner.name)
    }
}
