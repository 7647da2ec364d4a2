//! Tables.
//!
//! A table holds rows of one table type and is the only writer of its
//! indexes. Every mutation runs the same protocol, with the state borrowed
//! only until the output is ready:
//!
//! 1. the replacement policy picks the rows the new one replaces, or vetoes;
//! 2. `BeforeMod` runs on every pre-existing group about to change;
//! 3. the replaced rows are unlinked and the new row linked;
//! 4. `AfterDelete` and `AfterInsert` run per row and group;
//! 5. emptied groups collapse, deepest first, unless an aggregator vetoes;
//! 6. the table sends DELETE per replaced row and INSERT for the new one
//!    through `<name>.out`, then the aggregator results.
//!
//! Nothing is sent while the state is borrowed, so a label chained to the
//! output may feed rows back into the same table.

use crate::aggregator::{AggOp, AggregatorContext};
use crate::group::GroupId;
use crate::handle::{HandleId, RowHandle, Section};
use crate::index_type::{IndexId, IndexNode, IndexTree};
use crate::state::TableState;
use crate::table_type::TableType;
use alloc::format;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::cmp::Reverse;
use core::fmt;
use core::mem;
use core::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};
use tributary_core::{Error, Result, Row};
use tributary_sched::{EnqMode, Gadget, Label, Opcode, Rowop, Tray, Unit};

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

struct TableInner {
    id: u64,
    name: String,
    ttype: Rc<TableType>,
    unit: Unit,
    state: RefCell<TableState>,
    input: Label,
    out: Gadget,
    dump: Gadget,
    agg_gadgets: Vec<Gadget>,
}

/// The row being inserted, once the policy accepted it.
struct NewRow {
    id: HandleId,
    row: Row,
    sections: Vec<Section>,
    created: Vec<GroupId>,
}

/// What a mutation produced while the state was borrowed.
#[derive(Default)]
struct Outcome {
    deleted: Vec<Row>,
    aggregated: Tray,
    error: Option<Error>,
}

impl Outcome {
    fn fail(&mut self, err: Error) {
        warn!(error = %err, "aggregator failed");
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

/// A table of rows with nested indexes and aggregators.
///
/// `Table` is a cheap handle; clones refer to the same table.
#[derive(Clone)]
pub struct Table {
    inner: Rc<TableInner>,
}

impl Table {
    /// Creates a table of an initialized table type.
    ///
    /// The table gets the labels `<name>.in`, `<name>.out`, `<name>.dump`
    /// and `<name>.<aggregator>` per aggregator. Output is enqueued with
    /// `mode`.
    pub fn new(ttype: &Rc<TableType>, unit: &Unit, mode: EnqMode, name: impl Into<String>) -> Result<Self> {
        if !ttype.is_initialized() {
            return Err(Error::NotInitialized);
        }
        if ttype.errors().has_error() {
            return Err(Error::definition(ttype.errors().clone()));
        }
        let name = name.into();
        let rt = ttype.row_type().clone();
        let inner = Rc::new_cyclic(|weak: &Weak<TableInner>| {
            let weak = weak.clone();
            let input = Label::new(unit, rt.clone(), format!("{}.in", name), move |_: &Label, rop: &Rowop| {
                let Some(inner) = weak.upgrade() else {
                    return Ok(());
                };
                let table = Table { inner };
                if rop.is_insert() {
                    table.insert_row(rop.row().clone())?;
                } else if rop.is_delete() {
                    table.delete_row(rop.row())?;
                }
                Ok(())
            });
            let agg_gadgets = ttype
                .aggregator_slots()
                .iter()
                .map(|slot| {
                    let rt = slot.agg_type.result_type().clone();
                    Gadget::new(unit, rt, format!("{}.{}", name, slot.name), mode)
                })
                .collect();
            TableInner {
                id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
                state: RefCell::new(TableState::new(ttype)),
                ttype: ttype.clone(),
                unit: unit.clone(),
                input,
                out: Gadget::new(unit, rt.clone(), format!("{}.out", name), mode),
                dump: Gadget::new(unit, rt.clone(), format!("{}.dump", name), mode),
                agg_gadgets,
                name,
            }
        });
        debug!(table = %inner.name, unit = %unit.name(), mode = inner.out.mode().as_str(), "created table");
        Ok(Self { inner })
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the table type.
    #[inline]
    pub fn table_type(&self) -> &Rc<TableType> {
        &self.inner.ttype
    }

    /// Returns the unit the table's labels belong to.
    #[inline]
    pub fn unit(&self) -> &Unit {
        &self.inner.unit
    }

    /// The label feeding rows into the table.
    #[inline]
    pub fn input_label(&self) -> &Label {
        &self.inner.input
    }

    /// The label the table reports its changes on.
    #[inline]
    pub fn output_label(&self) -> &Label {
        self.inner.out.label()
    }

    /// The label `dump_all` sends to.
    #[inline]
    pub fn dump_label(&self) -> &Label {
        self.inner.dump.label()
    }

    /// The result label of an aggregator.
    pub fn aggregator_label(&self, name: &str) -> Option<&Label> {
        self.inner
            .ttype
            .aggregator_slots()
            .iter()
            .position(|slot| slot.name == name)
            .map(|i| self.inner.agg_gadgets[i].label())
    }

    /// Number of rows in the table.
    pub fn size(&self) -> usize {
        self.inner.state.borrow().size()
    }

    /// Returns true if the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Wraps a row for insertion into this table.
    pub fn make_row_handle(&self, row: Row) -> Result<RowHandle> {
        if !row.row_type().equals(self.inner.ttype.row_type()) {
            return Err(Error::row_type(format!(
                "the row does not match the row type of table '{}'",
                self.name()
            )));
        }
        Ok(RowHandle::new(self.inner.id, row))
    }

    /// Returns true if the handle's row is in the table.
    pub fn contains(&self, rh: &RowHandle) -> bool {
        self.check_handle(rh);
        self.inner.state.borrow().contains(rh.id)
    }

    /// Inserts a row, replacing the rows the indexes require.
    ///
    /// Returns false if the handle is already in the table or an index
    /// vetoed the insertion.
    pub fn insert(&self, rh: &RowHandle) -> Result<bool> {
        self.insert_handle(rh, None)
    }

    /// Like `insert`, also appending every rowop produced to `copy`.
    pub fn insert_with_copy(&self, rh: &RowHandle, copy: &mut Tray) -> Result<bool> {
        self.insert_handle(rh, Some(copy))
    }

    /// Wraps and inserts a row.
    pub fn insert_row(&self, row: Row) -> Result<bool> {
        let rh = self.make_row_handle(row)?;
        self.insert(&rh)
    }

    /// Removes a row. Returns false if it was not in the table.
    pub fn remove(&self, rh: &RowHandle) -> Result<bool> {
        self.remove_handle(rh, None)
    }

    /// Like `remove`, also appending every rowop produced to `copy`.
    pub fn remove_with_copy(&self, rh: &RowHandle, copy: &mut Tray) -> Result<bool> {
        self.remove_handle(rh, Some(copy))
    }

    /// Removes the row found by `row`'s key in the default index.
    pub fn delete_row(&self, row: &Row) -> Result<bool> {
        let leaf = self.inner.ttype.tree().default_leaf();
        match self.find(leaf, row) {
            Some(rh) => self.remove(&rh),
            None => Ok(false),
        }
    }

    /// Removes every row, in the default order.
    pub fn clear(&self) -> Result<()> {
        let handles: Vec<HandleId> = {
            let state = self.inner.state.borrow();
            let tree = self.inner.ttype.tree();
            state.rows_along(tree, &tree.node(IndexTree::ROOT).nav_path, state.root)
        };
        for h in handles {
            let row = self.inner.state.borrow().row(h).cloned();
            if let Some(row) = row {
                self.remove(&RowHandle::with_id(h, self.inner.id, row))?;
            }
        }
        Ok(())
    }

    /// Collapses the emptied groups the given rows were, or would be, in.
    ///
    /// Mutations already collapse what they empty, so this only has work to
    /// do when an aggregator vetoed before. Returns false if a group stays
    /// because of a veto.
    pub fn collapse(&self, handles: &[RowHandle]) -> Result<bool> {
        let mut outcome = Outcome::default();
        let collapsed = {
            let mut state = self.inner.state.borrow_mut();
            let tt = &*self.inner.ttype;
            let mut groups = Vec::new();
            for rh in handles {
                self.check_handle(rh);
                if state.contains(rh.id) {
                    groups.extend(state.groups_of(rh.id));
                } else {
                    let sections = TableState::make_sections(tt, &rh.row);
                    groups.extend(state.groups_by_key(tt, &sections));
                }
            }
            self.collapse_groups(&mut state, groups, &mut outcome)
        };
        self.emit_aggregated(outcome.aggregated, None)?;
        match outcome.error {
            Some(err) => Err(err),
            None => Ok(collapsed),
        }
    }

    /// Sends every row in the default order to `<name>.dump`.
    pub fn dump_all(&self, opcode: Opcode) -> Result<()> {
        self.dump_all_idx(IndexTree::ROOT, opcode)
    }

    /// Sends every row in the order of `idx` to `<name>.dump`.
    pub fn dump_all_idx(&self, idx: IndexId, opcode: Opcode) -> Result<()> {
        let rows: Vec<Row> = {
            let state = self.inner.state.borrow();
            let tree = self.inner.ttype.tree();
            let Some(node) = tree.nodes().get(idx.0) else {
                return Ok(());
            };
            state
                .rows_along(tree, &node.nav_path, state.root)
                .into_iter()
                .filter_map(|h| state.row(h).cloned())
                .collect()
        };
        for row in rows {
            self.inner.dump.send(opcode, row, None)?;
        }
        Ok(())
    }

    /// Finds a row with the key of `row` in `idx`.
    ///
    /// For a non-leaf index this is the first row of the matching group.
    pub fn find(&self, idx: IndexId, row: &Row) -> Option<RowHandle> {
        let state = self.inner.state.borrow();
        let tree = self.inner.ttype.tree();
        tree.nodes().get(idx.0)?;
        let h = state.find(tree, idx, row)?;
        self.handle_of(&state, h)
    }

    /// Finds the group of the non-leaf index `idx` with the key of `row`,
    /// and returns the number of rows in it.
    pub fn find_group(&self, idx: IndexId, row: &Row) -> Option<usize> {
        let state = self.inner.state.borrow();
        let tree = self.inner.ttype.tree();
        tree.nodes().get(idx.0)?;
        let g = state.find_group(tree, idx, row)?;
        state.groups.get(&g).map(|gh| gh.rows)
    }

    /// Number of groups of the non-leaf index `idx`.
    pub fn group_count(&self, idx: IndexId) -> usize {
        self.inner.state.borrow().group_count(idx)
    }

    /// First row in the default order.
    pub fn begin(&self) -> Option<RowHandle> {
        self.begin_idx(IndexTree::ROOT)
    }

    /// Row after `rh` in the default order.
    pub fn next(&self, rh: &RowHandle) -> Option<RowHandle> {
        self.next_idx(IndexTree::ROOT, rh)
    }

    /// First row in the order of `idx`.
    pub fn begin_idx(&self, idx: IndexId) -> Option<RowHandle> {
        let state = self.inner.state.borrow();
        let tree = self.inner.ttype.tree();
        let node = tree.nodes().get(idx.0)?;
        let h = state.first_along(tree, &node.nav_path, state.root)?;
        self.handle_of(&state, h)
    }

    /// Last row in the order of `idx`.
    pub fn last_idx(&self, idx: IndexId) -> Option<RowHandle> {
        let state = self.inner.state.borrow();
        let tree = self.inner.ttype.tree();
        let node = tree.nodes().get(idx.0)?;
        let h = state.last_along(tree, &node.nav_path, state.root)?;
        self.handle_of(&state, h)
    }

    /// Row after `rh` in the order of `idx`. `None` at the end, or if `rh`
    /// is not in the table.
    pub fn next_idx(&self, idx: IndexId, rh: &RowHandle) -> Option<RowHandle> {
        self.check_handle(rh);
        let state = self.inner.state.borrow();
        let tree = self.inner.ttype.tree();
        let node = tree.nodes().get(idx.0)?;
        if !state.contains(rh.id) {
            return None;
        }
        let h = state.next_along(tree, &node.nav_path, state.root, rh.id)?;
        self.handle_of(&state, h)
    }

    /// First row, in the order of `idx`, of the group `rh` is in.
    ///
    /// The group is the one of `idx`'s parent that holds the `idx` index
    /// `rh` belongs to. `rh` need not be in the table; its key finds the
    /// group.
    pub fn first_of_group_idx(&self, idx: IndexId, rh: &RowHandle) -> Option<RowHandle> {
        let state = self.inner.state.borrow();
        let tree = self.inner.ttype.tree();
        let (node, g) = self.group_of(&state, idx, rh)?;
        let h = state.first_along(tree, node.group_path(), g)?;
        self.handle_of(&state, h)
    }

    /// Last row, in the order of `idx`, of the group `rh` is in.
    pub fn last_of_group_idx(&self, idx: IndexId, rh: &RowHandle) -> Option<RowHandle> {
        let state = self.inner.state.borrow();
        let tree = self.inner.ttype.tree();
        let (node, g) = self.group_of(&state, idx, rh)?;
        let h = state.last_along(tree, node.group_path(), g)?;
        self.handle_of(&state, h)
    }

    /// First row, in the order of `idx`, of the group following the one
    /// `rh` is in.
    pub fn next_group_idx(&self, idx: IndexId, rh: &RowHandle) -> Option<RowHandle> {
        let state = self.inner.state.borrow();
        let tree = self.inner.ttype.tree();
        let (node, g) = self.group_of(&state, idx, rh)?;
        let last = state.last_along(tree, node.group_path(), g)?;
        let h = state.next_along(tree, &node.nav_path, state.root, last)?;
        self.handle_of(&state, h)
    }

    /// Number of rows in the group `rh` is in, at the parent of `idx`.
    pub fn group_size_idx(&self, idx: IndexId, rh: &RowHandle) -> usize {
        let state = self.inner.state.borrow();
        self.group_of(&state, idx, rh)
            .and_then(|(_, g)| state.groups.get(&g))
            .map_or(0, |gh| gh.rows)
    }

    fn check_handle(&self, rh: &RowHandle) {
        assert_eq!(
            rh.table_id,
            self.inner.id,
            "row handle {} does not belong to table '{}'",
            rh.id,
            self.inner.name
        );
    }

    fn handle_of(&self, state: &TableState, h: HandleId) -> Option<RowHandle> {
        let row = state.row(h)?.clone();
        Some(RowHandle::with_id(h, self.inner.id, row))
    }

    fn group_of<'t>(&'t self, state: &TableState, idx: IndexId, rh: &RowHandle) -> Option<(&'t IndexNode, GroupId)> {
        self.check_handle(rh);
        let tree = self.inner.ttype.tree();
        let node = tree.nodes().get(idx.0)?;
        let parent = node.parent?;
        let g = if state.contains(rh.id) {
            state.group_at(rh.id, parent)?
        } else {
            state.resolve_parent_group(tree, idx, &rh.row)?
        };
        Some((node, g))
    }

    fn insert_handle(&self, rh: &RowHandle, mut copy: Option<&mut Tray>) -> Result<bool> {
        self.check_handle(rh);
        let mut outcome = Outcome::default();
        {
            let mut state = self.inner.state.borrow_mut();
            let tt = &*self.inner.ttype;
            if state.contains(rh.id) {
                return Ok(false);
            }
            let sections = TableState::make_sections(tt, &rh.row);
            let mut replaced = Vec::new();
            let mut created = Vec::new();
            if !state.replacement_policy(tt, &sections, &rh.row, &mut replaced, &mut created) {
                state.discard_groups(tt, &created);
                debug!(table = %self.inner.name, row = %rh.row, "insertion vetoed");
                return Ok(false);
            }
            trace!(table = %self.inner.name, handle = rh.id, replaced = replaced.len(), "insert");
            let new = NewRow {
                id: rh.id,
                row: rh.row.clone(),
                sections,
                created,
            };
            self.apply(&mut state, &replaced, Some(new), &mut outcome);
        }
        for row in outcome.deleted {
            self.inner.out.send(Opcode::DELETE, row, copy.as_deref_mut())?;
        }
        self.inner.out.send(Opcode::INSERT, rh.row.clone(), copy.as_deref_mut())?;
        self.emit_aggregated(outcome.aggregated, copy)?;
        match outcome.error {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }

    fn remove_handle(&self, rh: &RowHandle, mut copy: Option<&mut Tray>) -> Result<bool> {
        self.check_handle(rh);
        let mut outcome = Outcome::default();
        {
            let mut state = self.inner.state.borrow_mut();
            if !state.contains(rh.id) {
                return Ok(false);
            }
            trace!(table = %self.inner.name, handle = rh.id, "remove");
            self.apply(&mut state, &[rh.id], None, &mut outcome);
        }
        for row in outcome.deleted {
            self.inner.out.send(Opcode::DELETE, row, copy.as_deref_mut())?;
        }
        self.emit_aggregated(outcome.aggregated, copy)?;
        match outcome.error {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }

    /// Runs the hooks, unlinking, linking and collapsing of one mutation.
    fn apply(&self, state: &mut TableState, replaced: &[HandleId], new: Option<NewRow>, outcome: &mut Outcome) {
        let tt = &*self.inner.ttype;
        let hooks = tt.has_aggregators();

        let old_groups: Vec<Vec<GroupId>> = replaced.iter().map(|&h| state.groups_of(h)).collect();
        if hooks {
            let (incoming, created) = match &new {
                Some(new) => (state.groups_by_key(tt, &new.sections), new.created.as_slice()),
                None => (Vec::new(), &[][..]),
            };
            let mut touched: Vec<GroupId> = Vec::new();
            for &g in old_groups.iter().flatten().chain(incoming.iter()) {
                if !created.contains(&g) && !touched.contains(&g) {
                    touched.push(g);
                }
            }
            for g in touched {
                self.run_hook(state, g, AggOp::BeforeMod, Opcode::DELETE, None, outcome);
            }
        }

        let mut removed: Vec<(Row, Vec<GroupId>)> = Vec::with_capacity(replaced.len());
        for (&h, groups) in replaced.iter().zip(old_groups) {
            if let Some(slot) = state.unlink_row(tt, h) {
                removed.push((slot.row, groups));
            }
        }
        let inserted = match new {
            Some(new) => {
                state.link_row(tt, new.id, new.row.clone(), new.sections);
                Some((new.row, state.groups_of(new.id)))
            }
            None => None,
        };

        if hooks {
            let receiving: &[GroupId] = inserted.as_ref().map_or(&[][..], |(_, groups)| groups.as_slice());
            for (i, (row, groups)) in removed.iter().enumerate() {
                for &g in groups {
                    let later = removed[i + 1..].iter().any(|(_, gs)| gs.contains(&g));
                    let opcode = if later || receiving.contains(&g) {
                        Opcode::NOP
                    } else {
                        Opcode::INSERT
                    };
                    self.run_hook(state, g, AggOp::AfterDelete, opcode, Some(row), outcome);
                }
            }
            if let Some((row, groups)) = &inserted {
                for &g in groups {
                    self.run_hook(state, g, AggOp::AfterInsert, Opcode::INSERT, Some(row), outcome);
                }
            }
        }

        let emptied: Vec<GroupId> = removed.iter().flat_map(|(_, gs)| gs.iter().copied()).collect();
        self.collapse_groups(state, emptied, outcome);
        outcome.deleted = removed.into_iter().map(|(row, _)| row).collect();
    }

    /// Destroys the empty groups among `groups`, deepest first. Returns
    /// false if an aggregator kept one.
    fn collapse_groups(&self, state: &mut TableState, mut groups: Vec<GroupId>, outcome: &mut Outcome) -> bool {
        let tt = &*self.inner.ttype;
        let tree = tt.tree();
        let root = state.root;
        groups.retain(|&g| g != root && state.groups.contains_key(&g));
        groups.sort_by_key(|g| {
            let level = state.groups.get(g).map_or(0, |gh| tree.node(gh.node).level);
            (Reverse(level), *g)
        });
        groups.dedup();

        let mut collapsed = true;
        for g in groups {
            if !state.groups.get(&g).is_some_and(|gh| gh.is_empty()) {
                continue;
            }
            if !self.collapse_allowed(state, g, &mut outcome.aggregated) {
                debug!(table = %self.inner.name, group = g, "collapse vetoed");
                collapsed = false;
                continue;
            }
            self.run_hook(state, g, AggOp::Collapse, Opcode::NOP, None, outcome);
            state.detach_group(tt, g);
        }
        collapsed
    }

    fn collapse_allowed(&self, state: &TableState, g: GroupId, dest: &mut Tray) -> bool {
        let tt = &*self.inner.ttype;
        let tree = tt.tree();
        let Some(gh) = state.groups.get(&g) else {
            return true;
        };
        let slots = &tree.node(gh.node).layout.aggregators;
        gh.aggregators.iter().zip(slots).all(|(agg, &slot)| {
            let index = tt.aggregator_slot(slot).node;
            let ctx = AggregatorContext::new(state, tree, g, index, &self.inner.agg_gadgets[slot], dest);
            agg.allow_collapse(&ctx)
        })
    }

    fn run_hook(
        &self,
        state: &mut TableState,
        g: GroupId,
        op: AggOp,
        opcode: Opcode,
        row: Option<&Row>,
        outcome: &mut Outcome,
    ) {
        let tt = &*self.inner.ttype;
        let tree = tt.tree();
        let Some(gh) = state.groups.get_mut(&g) else {
            return;
        };
        if gh.aggregators.is_empty() {
            return;
        }
        let node = gh.node;
        let mut aggregators = mem::take(&mut gh.aggregators);
        let slots = &tree.node(node).layout.aggregators;
        for (agg, &slot) in aggregators.iter_mut().zip(slots) {
            let index = tt.aggregator_slot(slot).node;
            let gadget = &self.inner.agg_gadgets[slot];
            let mut ctx = AggregatorContext::new(state, tree, g, index, gadget, &mut outcome.aggregated);
            let result = agg.handle(&mut ctx, op, opcode, row);
            if let Err(err) = result {
                outcome.fail(err);
            }
        }
        if let Some(gh) = state.groups.get_mut(&g) {
            gh.aggregators = aggregators;
        }
    }

    fn emit_aggregated(&self, tray: Tray, copy: Option<&mut Tray>) -> Result<()> {
        if tray.is_empty() {
            return Ok(());
        }
        if let Some(copy) = copy {
            for rowop in &tray {
                copy.push(rowop.clone());
            }
        }
        self.inner.unit.enqueue_tray(self.inner.out.mode(), tray)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table({})", self.inner.name)
    }
}
