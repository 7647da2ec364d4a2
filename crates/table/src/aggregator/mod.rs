//! Aggregators.
//!
//! An aggregator type is attached to an index type. The table then keeps one
//! aggregator per group of the parent index, and calls it at fixed points of
//! every mutation of that group:
//!
//! - `BeforeMod`, once per modified group, before anything changes. The
//!   opcode is DELETE: the last result is about to become stale.
//! - `AfterDelete`, once per row leaving the group, after it left.
//! - `AfterInsert`, once per row entering the group, after it entered.
//! - `Collapse`, when the group became empty and is about to be destroyed.
//!
//! For `AfterDelete` and `AfterInsert` the opcode is INSERT when this is the
//! last change of the group in the current mutation, NOP otherwise. An
//! aggregator that only produces results on INSERT thus emits exactly one
//! new result per mutation.
//!
//! Results go through the context into a tray, which the table enqueues
//! after its own output.

mod basic;
mod summary;

pub use basic::BasicAggregatorType;
pub use summary::SummaryAggregatorType;

use crate::group::GroupId;
use crate::index_type::{IndexId, IndexTree};
use crate::state::TableState;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use tributary_core::{Errors, Result, Row, RowTypeRef};
use tributary_sched::{Gadget, Label, Opcode, Tray};

/// The point of a mutation an aggregator is called at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggOp {
    /// The group is about to change.
    BeforeMod,
    /// A row left the group.
    AfterDelete,
    /// A row entered the group.
    AfterInsert,
    /// The group is about to be destroyed.
    Collapse,
}

impl AggOp {
    /// Returns the operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AggOp::BeforeMod => "before-mod",
            AggOp::AfterDelete => "after-delete",
            AggOp::AfterInsert => "after-insert",
            AggOp::Collapse => "collapse",
        }
    }
}

impl fmt::Display for AggOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of an aggregation, shared by all its per-group instances.
pub trait AggregatorType {
    /// Name of the aggregator; its result label is `<table>.<name>`.
    fn name(&self) -> &str;

    /// Row type of the results.
    fn result_type(&self) -> &RowTypeRef;

    /// Creates the state for a new group.
    fn make_aggregator(&self) -> Box<dyn Aggregator>;

    /// Validates the aggregator against the table's row type.
    fn check(&self, _row_type: &RowTypeRef, _errors: &mut Errors) {}
}

/// Per-group aggregation state.
pub trait Aggregator {
    /// Handles one hook. `row` is the row that left or entered the group,
    /// `None` for `BeforeMod` and `Collapse`.
    fn handle(&mut self, ctx: &mut AggregatorContext<'_>, op: AggOp, opcode: Opcode, row: Option<&Row>) -> Result<()>;

    /// Returns false to keep the group alive although it became empty.
    fn allow_collapse(&self, _ctx: &AggregatorContext<'_>) -> bool {
        true
    }
}

/// What an aggregator sees of its group during a hook.
pub struct AggregatorContext<'a> {
    state: &'a TableState,
    tree: &'a IndexTree,
    group: GroupId,
    index: IndexId,
    gadget: &'a Gadget,
    dest: &'a mut Tray,
}

impl<'a> AggregatorContext<'a> {
    pub(crate) fn new(
        state: &'a TableState,
        tree: &'a IndexTree,
        group: GroupId,
        index: IndexId,
        gadget: &'a Gadget,
        dest: &'a mut Tray,
    ) -> Self {
        Self {
            state,
            tree,
            group,
            index,
            gadget,
            dest,
        }
    }

    /// Number of rows in the group.
    pub fn group_size(&self) -> usize {
        self.state.groups.get(&self.group).map_or(0, |g| g.rows)
    }

    /// A row carrying the group's key, `None` for the table-wide group.
    ///
    /// This is the row that created the group. It is only a source for the
    /// key fields: it stays here after it left the table, and is never
    /// replaced by a newer row of the group. Use `first()` or `rows()` for
    /// the current contents.
    pub fn group_row(&self) -> Option<&Row> {
        self.state.groups.get(&self.group).and_then(|g| g.row.as_ref())
    }

    /// Returns true if the parent index still maps the group's key to it.
    #[cfg(test)]
    pub(crate) fn in_parent_index(&self) -> bool {
        let Some(gh) = self.state.groups.get(&self.group) else {
            return false;
        };
        let (Some(parent), Some(key)) = (gh.parent, gh.key.as_ref()) else {
            return false;
        };
        let node = self.tree.node(gh.node);
        self.state.index_in(parent, node).and_then(|i| i.group_for(key)) == Some(self.group)
    }

    /// The index the aggregator is attached to.
    pub fn index(&self) -> IndexId {
        self.index
    }

    /// Rows of the group, in the order of the aggregated index.
    pub fn rows(&self) -> Vec<Row> {
        let path = self.tree.node(self.index).group_path();
        self.state
            .rows_along(self.tree, path, self.group)
            .into_iter()
            .filter_map(|h| self.state.row(h).cloned())
            .collect()
    }

    /// First row of the group in the order of the aggregated index.
    pub fn first(&self) -> Option<Row> {
        let path = self.tree.node(self.index).group_path();
        let h = self.state.first_along(self.tree, path, self.group)?;
        self.state.row(h).cloned()
    }

    /// Last row of the group in the order of the aggregated index.
    pub fn last(&self) -> Option<Row> {
        let path = self.tree.node(self.index).group_path();
        let h = self.state.last_along(self.tree, path, self.group)?;
        self.state.row(h).cloned()
    }

    /// Row type of the results.
    pub fn result_type(&self) -> &RowTypeRef {
        self.gadget.label().row_type()
    }

    /// The result label.
    pub fn label(&self) -> &Label {
        self.gadget.label()
    }

    /// Queues a result, to be sent after the table's own output.
    pub fn send(&mut self, opcode: Opcode, row: Row) -> Result<()> {
        self.gadget.send_delayed(self.dest, opcode, row)
    }
}
