//! Labels.
//!
//! A label is a named handler bound to one row type and one unit. Labels can
//! be chained: after a label's own handler runs (and the rowops it forked are
//! drained), every chained label is executed with the same rowop, depth
//! first, in the order they were chained.
//!
//! Chains are strong references, so a cycle of chained labels is also a
//! reference cycle. `Unit::clear_labels` breaks all of them.

use crate::opcode::Opcode;
use crate::rowop::Rowop;
use crate::unit::{Unit, UnitInner};
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use hashbrown::HashSet;
use tracing::warn;
use tributary_core::{Error, Result, Row, RowTypeRef};

/// Unique identifier of a label.
pub type LabelId = u64;

static NEXT_LABEL_ID: AtomicU64 = AtomicU64::new(1);

fn next_label_id() -> LabelId {
    NEXT_LABEL_ID.fetch_add(1, Ordering::Relaxed)
}

/// User logic executed by a label.
pub trait LabelHandler {
    /// Handles one rowop. `label` is the label being executed, which differs
    /// from `rowop.label()` when the label runs as part of a chain.
    fn execute(&self, label: &Label, rowop: &Rowop) -> Result<()>;
}

impl<F> LabelHandler for F
where
    F: Fn(&Label, &Rowop) -> Result<()>,
{
    fn execute(&self, label: &Label, rowop: &Rowop) -> Result<()> {
        self(label, rowop)
    }
}

pub(crate) struct LabelInner {
    id: LabelId,
    name: String,
    row_type: RowTypeRef,
    unit: Weak<UnitInner>,
    unit_name: String,
    handler: RefCell<Option<Rc<dyn LabelHandler>>>,
    chain: RefCell<Vec<Label>>,
    cleared: Cell<bool>,
}

/// A schema-bound, chainable rowop handler.
#[derive(Clone)]
pub struct Label {
    inner: Rc<LabelInner>,
}

impl Label {
    /// Creates a label executing `handler`.
    pub fn new<H>(unit: &Unit, row_type: RowTypeRef, name: impl Into<String>, handler: H) -> Self
    where
        H: LabelHandler + 'static,
    {
        Self::build(unit, row_type, name.into(), Some(Rc::new(handler)))
    }

    /// Creates a label with no logic of its own, only forwarding to its chain.
    pub fn dummy(unit: &Unit, row_type: RowTypeRef, name: impl Into<String>) -> Self {
        Self::build(unit, row_type, name.into(), None)
    }

    fn build(
        unit: &Unit,
        row_type: RowTypeRef,
        name: String,
        handler: Option<Rc<dyn LabelHandler>>,
    ) -> Self {
        let label = Self {
            inner: Rc::new(LabelInner {
                id: next_label_id(),
                name,
                row_type,
                unit: Rc::downgrade(&unit.inner),
                unit_name: unit.name().into(),
                handler: RefCell::new(handler),
                chain: RefCell::new(Vec::new()),
                cleared: Cell::new(false),
            }),
        };
        unit.register_label(&label);
        label
    }

    /// Returns the label id.
    #[inline]
    pub fn id(&self) -> LabelId {
        self.inner.id
    }

    /// Returns the label name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the row type.
    #[inline]
    pub fn row_type(&self) -> &RowTypeRef {
        &self.inner.row_type
    }

    /// Returns the owning unit, if it is still alive.
    pub fn unit(&self) -> Option<Unit> {
        self.inner.unit.upgrade().map(|inner| Unit { inner })
    }

    /// Returns the name of the owning unit.
    #[inline]
    pub fn unit_name(&self) -> &str {
        &self.inner.unit_name
    }

    pub(crate) fn belongs_to(&self, unit: &Rc<UnitInner>) -> bool {
        core::ptr::eq(self.inner.unit.as_ptr(), Rc::as_ptr(unit))
    }

    /// Returns true once the label has been cleared.
    #[inline]
    pub fn is_cleared(&self) -> bool {
        self.inner.cleared.get()
    }

    pub(crate) fn downgrade(&self) -> Weak<LabelInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<LabelInner>) -> Option<Label> {
        weak.upgrade().map(|inner| Label { inner })
    }

    pub(crate) fn handler(&self) -> Option<Rc<dyn LabelHandler>> {
        self.inner.handler.borrow().clone()
    }

    /// Builds a rowop for this label.
    pub fn make_rowop(&self, opcode: Opcode, row: Row) -> Result<Rowop> {
        if self.is_cleared() {
            return Err(Error::LabelCleared {
                label: self.name().into(),
            });
        }
        Rowop::new(self, opcode, row)
    }

    /// Chains `other` after this label.
    ///
    /// Both labels must have equal row types and belong to the same unit.
    /// A chain that closes a cycle is accepted with a warning unless the
    /// unit is configured to reject cycles.
    pub fn chain(&self, other: &Label) -> Result<()> {
        if self.is_cleared() {
            return Err(Error::LabelCleared {
                label: self.name().into(),
            });
        }
        if other.is_cleared() {
            return Err(Error::LabelCleared {
                label: other.name().into(),
            });
        }
        if !core::ptr::eq(self.inner.unit.as_ptr(), other.inner.unit.as_ptr()) {
            return Err(Error::WrongUnit {
                label: other.name().into(),
                label_unit: other.unit_name().into(),
                unit: self.unit_name().into(),
            });
        }
        if !self.row_type().equals(other.row_type()) {
            return Err(Error::ChainTypeMismatch {
                from: self.name().into(),
                to: other.name().into(),
            });
        }
        if other.reaches(self) {
            let reject = self
                .unit()
                .map(|u| u.config().reject_chain_cycles)
                .unwrap_or(false);
            if reject {
                return Err(Error::ChainCycle {
                    from: self.name().into(),
                    to: other.name().into(),
                });
            }
            warn!(from = self.name(), to = other.name(), "label chain creates a cycle");
        }
        self.inner.chain.borrow_mut().push(other.clone());
        Ok(())
    }

    /// Returns the labels chained after this one, in chaining order.
    pub fn chained(&self) -> Vec<Label> {
        self.inner.chain.borrow().clone()
    }

    /// Returns true if anything is chained to this label.
    pub fn has_chained(&self) -> bool {
        !self.inner.chain.borrow().is_empty()
    }

    /// Removes every chained label.
    pub fn clear_chained(&self) {
        self.inner.chain.borrow_mut().clear();
    }

    /// Returns true if `target` is this label or is reachable through chains.
    pub fn reaches(&self, target: &Label) -> bool {
        let mut visited: HashSet<LabelId> = HashSet::new();
        let mut stack: Vec<Label> = Vec::new();
        stack.push(self.clone());
        while let Some(label) = stack.pop() {
            if label.id() == target.id() {
                return true;
            }
            if !visited.insert(label.id()) {
                continue;
            }
            stack.extend(label.inner.chain.borrow().iter().cloned());
        }
        false
    }

    /// Drops the handler and the chain. A cleared label ignores rowops.
    pub fn clear(&self) {
        self.inner.cleared.set(true);
        self.inner.handler.borrow_mut().take();
        self.inner.chain.borrow_mut().clear();
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Label {}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({})", self.inner.name)
    }
}
