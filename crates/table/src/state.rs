//! Index tree state of one table.
//!
//! `TableState` owns the rows in the table (as slots keyed by handle id) and
//! every group. Indexes never own rows or groups; they hold ids into these
//! two maps. This module has the structural operations: creating and
//! discarding groups, linking a row into every index and unlinking it, the
//! replacement policy, and ordered navigation. The hook-driven protocol on
//! top of them lives in `table.rs`.

use crate::group::{GroupHandle, GroupId};
use crate::handle::{HandleId, HandleSlot, Section, Slots};
use crate::index::{Entry, Index};
use crate::index_type::{IndexId, IndexNode, IndexTree, NodeKind};
use crate::key::IndexKey;
use crate::table_type::TableType;
use alloc::vec;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use tracing::trace;
use tributary_core::Row;

/// Rows picked for replacement, in the order they were picked.
#[derive(Default)]
struct Victims {
    order: Vec<HandleId>,
    seen: HashSet<HandleId>,
}

impl Victims {
    fn push(&mut self, h: HandleId) {
        if self.seen.insert(h) {
            self.order.push(h);
        }
    }
}

pub(crate) struct TableState {
    pub(crate) slots: Slots,
    pub(crate) groups: HashMap<GroupId, GroupHandle>,
    pub(crate) root: GroupId,
    next_group: GroupId,
}

impl TableState {
    pub(crate) fn new(tt: &TableType) -> Self {
        let mut state = Self {
            slots: Slots::new(),
            groups: HashMap::new(),
            root: 0,
            next_group: 0,
        };
        state.root = state.alloc_group(tt, IndexTree::ROOT, None, None, None);
        state
    }

    /// Number of rows in the table.
    pub(crate) fn size(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn contains(&self, h: HandleId) -> bool {
        self.slots.contains_key(&h)
    }

    pub(crate) fn row(&self, h: HandleId) -> Option<&Row> {
        self.slots.get(&h).map(|s| &s.row)
    }

    pub(crate) fn alloc_group(
        &mut self,
        tt: &TableType,
        node: IndexId,
        parent: Option<GroupId>,
        key: Option<IndexKey>,
        row: Option<Row>,
    ) -> GroupId {
        let id = self.next_group;
        self.next_group += 1;
        let tree = tt.tree();
        let layout = &tree.node(node).layout;
        let indexes = layout
            .nested
            .iter()
            .map(|&n| Index::new(&tree.node(n).kind))
            .collect();
        let aggregators = layout
            .aggregators
            .iter()
            .map(|&a| tt.aggregator_slot(a).agg_type.make_aggregator())
            .collect();
        self.groups.insert(
            id,
            GroupHandle {
                node,
                parent,
                key,
                row,
                rows: 0,
                indexes,
                aggregators,
            },
        );
        trace!(group = id, index = node.as_usize(), "create group");
        id
    }

    /// Removes a group from its parent's index and drops it.
    pub(crate) fn detach_group(&mut self, tt: &TableType, g: GroupId) {
        let Some(gh) = self.groups.remove(&g) else {
            return;
        };
        if let (Some(parent), Some(key)) = (gh.parent, gh.key.as_ref()) {
            let position = tt.tree().node(gh.node).position;
            if let Some(index) = self.groups.get_mut(&parent).and_then(|p| p.indexes.get_mut(position)) {
                index.remove_entry(key);
            }
        }
        trace!(group = g, "drop group");
    }

    /// Drops groups created by a vetoed insertion, newest first.
    pub(crate) fn discard_groups(&mut self, tt: &TableType, created: &[GroupId]) {
        for &g in created.iter().rev() {
            self.detach_group(tt, g);
        }
    }

    #[inline]
    pub(crate) fn index_in(&self, g: GroupId, node: &IndexNode) -> Option<&Index> {
        self.groups.get(&g)?.indexes.get(node.position)
    }

    #[inline]
    fn index_mut(&mut self, g: GroupId, node: &IndexNode) -> Option<&mut Index> {
        self.groups.get_mut(&g)?.indexes.get_mut(node.position)
    }

    /// The group of row `h` at a non-leaf node, or the root group.
    pub(crate) fn group_at(&self, h: HandleId, node: IndexId) -> Option<GroupId> {
        if node == IndexTree::ROOT {
            return Some(self.root);
        }
        self.slots.get(&h)?.sections.get(node.0)?.group()
    }

    /// Every group row `h` is in, the root first, then in index order.
    pub(crate) fn groups_of(&self, h: HandleId) -> Vec<GroupId> {
        let mut out = vec![self.root];
        if let Some(slot) = self.slots.get(&h) {
            out.extend(slot.sections.iter().filter_map(Section::group));
        }
        out
    }

    /// The existing groups a row with these sections would be in.
    pub(crate) fn groups_by_key(&self, tt: &TableType, sections: &[Section]) -> Vec<GroupId> {
        let nodes = tt.tree().nodes();
        let mut at: Vec<Option<GroupId>> = vec![None; nodes.len()];
        at[0] = Some(self.root);
        let mut out = vec![self.root];
        for node in nodes.iter().skip(1).filter(|n| !n.is_leaf()) {
            let Some(parent) = node.parent.and_then(|p| at[p.0]) else {
                continue;
            };
            let Some(key) = sections.get(node.id.0).and_then(Section::key) else {
                continue;
            };
            if let Some(g) = self.index_in(parent, node).and_then(|i| i.group_for(key)) {
                at[node.id.0] = Some(g);
                out.push(g);
            }
        }
        out
    }

    /// Computes the sections of a row about to be inserted.
    pub(crate) fn make_sections(tt: &TableType, row: &Row) -> Vec<Section> {
        tt.tree()
            .nodes()
            .iter()
            .map(|node| match &node.kind {
                NodeKind::Root => Section::Root,
                NodeKind::Keyed(spec) => Section::Keyed {
                    key: spec.key_of(row),
                    group: None,
                },
                NodeKind::Fifo { .. } => Section::Fifo {
                    prev: None,
                    next: None,
                },
            })
            .collect()
    }

    /// Decides which rows the insertion of `row` replaces.
    ///
    /// Unique keys are checked first over the whole tree, creating the
    /// missing groups on the way, then the FIFO limits. A non-jumping FIFO
    /// only evicts when no other index has picked a victim yet, so a key
    /// replacement anywhere in the tree never comes with a second eviction.
    /// Returns false on a veto; the groups created so far are left in
    /// `created`.
    pub(crate) fn replacement_policy(
        &mut self,
        tt: &TableType,
        sections: &[Section],
        row: &Row,
        replaced: &mut Vec<HandleId>,
        created: &mut Vec<GroupId>,
    ) -> bool {
        let root = self.root;
        let mut victims = Victims::default();
        if !self.policy_keyed(tt, root, sections, row, &mut victims, created) {
            return false;
        }
        self.policy_fifo(tt, root, sections, &mut victims);
        replaced.extend(victims.order);
        true
    }

    fn policy_keyed(
        &mut self,
        tt: &TableType,
        g: GroupId,
        sections: &[Section],
        row: &Row,
        victims: &mut Victims,
        created: &mut Vec<GroupId>,
    ) -> bool {
        let tree = tt.tree();
        let Some(node) = self.groups.get(&g).map(|gh| gh.node) else {
            return true;
        };
        for &child in &tree.node(node).children {
            let cn = tree.node(child);
            let NodeKind::Keyed(spec) = &cn.kind else {
                continue;
            };
            if !spec.allows(row) {
                return false;
            }
            let Some(key) = sections[child.0].key() else {
                continue;
            };
            let entry = self.index_in(g, cn).and_then(|i| i.get(key));
            if cn.is_leaf() {
                if let Some(Entry::Row(h)) = entry {
                    victims.push(h);
                }
                continue;
            }
            let sub = match entry {
                Some(Entry::Group(sub)) => sub,
                _ => {
                    let sub = self.alloc_group(tt, child, Some(g), Some(key.clone()), Some(row.clone()));
                    if let Some(index) = self.index_mut(g, cn) {
                        index.insert_entry(key.clone(), Entry::Group(sub));
                    }
                    created.push(sub);
                    sub
                }
            };
            if !self.policy_keyed(tt, sub, sections, row, victims, created) {
                return false;
            }
        }
        true
    }

    fn policy_fifo(&self, tt: &TableType, g: GroupId, sections: &[Section], victims: &mut Victims) {
        let tree = tt.tree();
        let Some(node) = self.groups.get(&g).map(|gh| gh.node) else {
            return;
        };
        for &child in &tree.node(node).children {
            let cn = tree.node(child);
            let Some(index) = self.index_in(g, cn) else {
                continue;
            };
            match (&cn.kind, index) {
                (NodeKind::Keyed(_), _) if !cn.is_leaf() => {
                    let sub = sections[child.0].key().and_then(|k| index.group_for(k));
                    if let Some(sub) = sub {
                        self.policy_fifo(tt, sub, sections, victims);
                    }
                }
                (
                    NodeKind::Fifo {
                        limit: Some(limit),
                        jumping,
                        ..
                    },
                    Index::Fifo(list),
                ) => {
                    if list.len() < *limit {
                        continue;
                    }
                    // Every row of group `g` is in this list.
                    let leaving = victims.order.iter().filter(|&&h| self.group_at(h, node) == Some(g)).count();
                    if list.len() - leaving < *limit {
                        continue;
                    }
                    if *jumping {
                        for h in list.oldest_first(&self.slots, child) {
                            victims.push(h);
                        }
                    } else if victims.order.is_empty() {
                        if let Some(h) = list.head() {
                            victims.push(h);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Puts a row into every index. All its groups must exist or are created.
    pub(crate) fn link_row(&mut self, tt: &TableType, h: HandleId, row: Row, sections: Vec<Section>) {
        self.slots.insert(
            h,
            HandleSlot {
                row: row.clone(),
                sections,
            },
        );
        let root = self.root;
        if let Some(gh) = self.groups.get_mut(&root) {
            gh.rows += 1;
        }
        for node in tt.tree().nodes().iter().skip(1) {
            let Some(g) = node.parent.and_then(|p| self.group_at(h, p)) else {
                continue;
            };
            match &node.kind {
                NodeKind::Keyed(_) => {
                    let Some(key) = self.slots.get(&h).and_then(|s| s.sections[node.id.0].key()).cloned() else {
                        continue;
                    };
                    if node.is_leaf() {
                        if let Some(index) = self.index_mut(g, node) {
                            index.insert_entry(key, Entry::Row(h));
                        }
                        continue;
                    }
                    let sub = match self.index_in(g, node).and_then(|i| i.group_for(&key)) {
                        Some(sub) => sub,
                        None => {
                            let sub = self.alloc_group(tt, node.id, Some(g), Some(key.clone()), Some(row.clone()));
                            if let Some(index) = self.index_mut(g, node) {
                                index.insert_entry(key, Entry::Group(sub));
                            }
                            sub
                        }
                    };
                    if let Some(Section::Keyed { group, .. }) =
                        self.slots.get_mut(&h).and_then(|s| s.sections.get_mut(node.id.0))
                    {
                        *group = Some(sub);
                    }
                    if let Some(gh) = self.groups.get_mut(&sub) {
                        gh.rows += 1;
                    }
                }
                NodeKind::Fifo { .. } => {
                    let TableState { slots, groups, .. } = self;
                    if let Some(Index::Fifo(list)) = groups.get_mut(&g).and_then(|gh| gh.indexes.get_mut(node.position)) {
                        list.push_back(slots, node.id, h);
                    }
                }
                NodeKind::Root => {}
            }
        }
    }

    /// Takes a row out of every index and drops its slot. Groups stay, even
    /// when emptied; collapsing them is a separate step.
    pub(crate) fn unlink_row(&mut self, tt: &TableType, h: HandleId) -> Option<HandleSlot> {
        if !self.contains(h) {
            return None;
        }
        for node in tt.tree().nodes().iter().skip(1) {
            let Some(g) = node.parent.and_then(|p| self.group_at(h, p)) else {
                continue;
            };
            match &node.kind {
                NodeKind::Keyed(_) if node.is_leaf() => {
                    let TableState { slots, groups, .. } = self;
                    let key = slots.get(&h).and_then(|s| s.sections[node.id.0].key());
                    let index = groups.get_mut(&g).and_then(|gh| gh.indexes.get_mut(node.position));
                    if let (Some(key), Some(index)) = (key, index) {
                        index.remove_entry(key);
                    }
                }
                NodeKind::Keyed(_) => {
                    let sub = self.group_at(h, node.id);
                    if let Some(gh) = sub.and_then(|s| self.groups.get_mut(&s)) {
                        gh.rows = gh.rows.saturating_sub(1);
                    }
                }
                NodeKind::Fifo { .. } => {
                    let TableState { slots, groups, .. } = self;
                    if let Some(Index::Fifo(list)) = groups.get_mut(&g).and_then(|gh| gh.indexes.get_mut(node.position)) {
                        list.unlink(slots, node.id, h);
                    }
                }
                NodeKind::Root => {}
            }
        }
        let root = self.root;
        if let Some(gh) = self.groups.get_mut(&root) {
            gh.rows = gh.rows.saturating_sub(1);
        }
        self.slots.remove(&h)
    }

    /// First row under group `g` in the order given by `path`.
    pub(crate) fn first_along(&self, tree: &IndexTree, path: &[IndexId], g: GroupId) -> Option<HandleId> {
        let (&head, rest) = path.split_first()?;
        let node = tree.node(head);
        let index = self.index_in(g, node)?;
        if rest.is_empty() {
            return index.first_row(node.is_reverse());
        }
        index.groups().find_map(|sub| self.first_along(tree, rest, sub))
    }

    /// Last row under group `g` in the order given by `path`.
    pub(crate) fn last_along(&self, tree: &IndexTree, path: &[IndexId], g: GroupId) -> Option<HandleId> {
        let (&head, rest) = path.split_first()?;
        let node = tree.node(head);
        let index = self.index_in(g, node)?;
        if rest.is_empty() {
            return index.last_row(node.is_reverse());
        }
        index.groups().rev().find_map(|sub| self.last_along(tree, rest, sub))
    }

    /// Row following `h` under group `g` in the order given by `path`.
    pub(crate) fn next_along(&self, tree: &IndexTree, path: &[IndexId], g: GroupId, h: HandleId) -> Option<HandleId> {
        let (&head, rest) = path.split_first()?;
        let node = tree.node(head);
        let index = self.index_in(g, node)?;
        if rest.is_empty() {
            return index.next_row(&self.slots, head, h, node.is_reverse());
        }
        let sub = self.group_at(h, head)?;
        if let Some(next) = self.next_along(tree, rest, sub, h) {
            return Some(next);
        }
        let key = self.slots.get(&h)?.sections.get(head.0)?.key()?;
        index
            .groups_after(key)
            .find_map(|sub| self.first_along(tree, rest, sub))
    }

    /// Rows under group `g` in the order given by `path`.
    pub(crate) fn rows_along(&self, tree: &IndexTree, path: &[IndexId], g: GroupId) -> Vec<HandleId> {
        let mut out = Vec::new();
        let mut cur = self.first_along(tree, path, g);
        while let Some(h) = cur {
            out.push(h);
            cur = self.next_along(tree, path, g, h);
        }
        out
    }

    /// Resolves the groups of `row` down to the parent of `idx`.
    ///
    /// Returns the group holding the `idx` index instance the row would be in.
    pub(crate) fn resolve_parent_group(&self, tree: &IndexTree, idx: IndexId, row: &Row) -> Option<GroupId> {
        let node = tree.node(idx);
        let mut g = self.root;
        for &anc in &node.nav_path[..node.level.saturating_sub(1)] {
            let an = tree.node(anc);
            let key = an.key_spec()?.key_of(row);
            g = self.index_in(g, an)?.group_for(&key)?;
        }
        Some(g)
    }

    /// Finds a row matching `row` on the key of `idx`.
    ///
    /// A non-leaf index gives the first row of the matching group, a FIFO
    /// index the oldest row with equal values.
    pub(crate) fn find(&self, tree: &IndexTree, idx: IndexId, row: &Row) -> Option<HandleId> {
        let node = tree.node(idx);
        let g = self.resolve_parent_group(tree, idx, row)?;
        let index = self.index_in(g, node)?;
        match &node.kind {
            NodeKind::Keyed(spec) => match index.get(&spec.key_of(row))? {
                Entry::Row(h) => Some(h),
                Entry::Group(sub) => self.first_along(tree, &node.group_path()[1..], sub),
            },
            NodeKind::Fifo { .. } => index
                .fifo_rows(&self.slots, idx)
                .into_iter()
                .find(|h| self.row(*h).map_or(false, |r| r.values() == row.values())),
            NodeKind::Root => None,
        }
    }

    /// Finds the group of a non-leaf index matching `row`.
    pub(crate) fn find_group(&self, tree: &IndexTree, idx: IndexId, row: &Row) -> Option<GroupId> {
        let node = tree.node(idx);
        let spec = node.key_spec()?;
        let g = self.resolve_parent_group(tree, idx, row)?;
        self.index_in(g, node)?.group_for(&spec.key_of(row))
    }

    /// Number of groups of a non-leaf index over the whole table.
    pub(crate) fn group_count(&self, idx: IndexId) -> usize {
        self.groups.values().filter(|gh| gh.node == idx).count()
    }
}
