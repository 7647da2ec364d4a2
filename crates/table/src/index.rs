//! Runtime indexes.
//!
//! One `Index` exists per compiled index node per group of its parent. A
//! keyed index maps each key to a row (leaf) or to a group (non-leaf). A FIFO
//! index is a doubly linked list threaded through the rows' sections.

use crate::group::GroupId;
use crate::handle::{HandleId, Section, Slots};
use crate::index_type::{IndexId, NodeKind};
use crate::key::IndexKey;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::ops::Bound::{Excluded, Unbounded};

/// What a keyed index maps a key to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Entry {
    Row(HandleId),
    Group(GroupId),
}

impl Entry {
    #[inline]
    pub(crate) fn row(self) -> Option<HandleId> {
        match self {
            Entry::Row(h) => Some(h),
            Entry::Group(_) => None,
        }
    }

    #[inline]
    pub(crate) fn group(self) -> Option<GroupId> {
        match self {
            Entry::Group(g) => Some(g),
            Entry::Row(_) => None,
        }
    }
}

/// Rows of a FIFO index, oldest at the head.
#[derive(Debug, Default)]
pub(crate) struct FifoList {
    head: Option<HandleId>,
    tail: Option<HandleId>,
    len: usize,
}

impl FifoList {
    fn links(slots: &Slots, node: IndexId, h: HandleId) -> Option<(Option<HandleId>, Option<HandleId>)> {
        match slots.get(&h)?.sections.get(node.0)? {
            Section::Fifo { prev, next } => Some((*prev, *next)),
            _ => None,
        }
    }

    fn set_links(slots: &mut Slots, node: IndexId, h: HandleId, prev: Option<HandleId>, next: Option<HandleId>) {
        if let Some(Section::Fifo { prev: p, next: n }) =
            slots.get_mut(&h).and_then(|s| s.sections.get_mut(node.0))
        {
            *p = prev;
            *n = next;
        }
    }

    fn set_next(slots: &mut Slots, node: IndexId, h: HandleId, next: Option<HandleId>) {
        if let Some(Section::Fifo { next: n, .. }) = slots.get_mut(&h).and_then(|s| s.sections.get_mut(node.0)) {
            *n = next;
        }
    }

    fn set_prev(slots: &mut Slots, node: IndexId, h: HandleId, prev: Option<HandleId>) {
        if let Some(Section::Fifo { prev: p, .. }) = slots.get_mut(&h).and_then(|s| s.sections.get_mut(node.0)) {
            *p = prev;
        }
    }

    /// Appends a row as the newest.
    pub(crate) fn push_back(&mut self, slots: &mut Slots, node: IndexId, h: HandleId) {
        Self::set_links(slots, node, h, self.tail, None);
        match self.tail {
            Some(tail) => Self::set_next(slots, node, tail, Some(h)),
            None => self.head = Some(h),
        }
        self.tail = Some(h);
        self.len += 1;
    }

    /// Removes a row from the list.
    pub(crate) fn unlink(&mut self, slots: &mut Slots, node: IndexId, h: HandleId) {
        let Some((prev, next)) = Self::links(slots, node, h) else {
            return;
        };
        match prev {
            Some(p) => Self::set_next(slots, node, p, next),
            None => self.head = next,
        }
        match next {
            Some(n) => Self::set_prev(slots, node, n, prev),
            None => self.tail = prev,
        }
        Self::set_links(slots, node, h, None, None);
        self.len -= 1;
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// The oldest row.
    #[inline]
    pub(crate) fn head(&self) -> Option<HandleId> {
        self.head
    }

    /// Returns the rows, oldest first.
    pub(crate) fn oldest_first(&self, slots: &Slots, node: IndexId) -> Vec<HandleId> {
        let mut out = Vec::with_capacity(self.len);
        let mut cur = self.head;
        while let Some(h) = cur {
            out.push(h);
            cur = Self::links(slots, node, h).and_then(|(_, next)| next);
        }
        out
    }
}

/// A live index instance.
pub(crate) enum Index {
    Keyed(BTreeMap<IndexKey, Entry>),
    Fifo(FifoList),
}

impl Index {
    pub(crate) fn new(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::Fifo { .. } => Index::Fifo(FifoList::default()),
            NodeKind::Keyed(_) | NodeKind::Root => Index::Keyed(BTreeMap::new()),
        }
    }

    /// Number of entries: rows for a leaf, groups otherwise.
    pub(crate) fn len(&self) -> usize {
        match self {
            Index::Keyed(map) => map.len(),
            Index::Fifo(list) => list.len(),
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn keyed(&self) -> Option<&BTreeMap<IndexKey, Entry>> {
        match self {
            Index::Keyed(map) => Some(map),
            Index::Fifo(_) => None,
        }
    }

    pub(crate) fn get(&self, key: &IndexKey) -> Option<Entry> {
        self.keyed()?.get(key).copied()
    }

    pub(crate) fn group_for(&self, key: &IndexKey) -> Option<GroupId> {
        self.get(key)?.group()
    }

    pub(crate) fn insert_entry(&mut self, key: IndexKey, entry: Entry) {
        if let Index::Keyed(map) = self {
            map.insert(key, entry);
        }
    }

    pub(crate) fn remove_entry(&mut self, key: &IndexKey) -> Option<Entry> {
        match self {
            Index::Keyed(map) => map.remove(key),
            Index::Fifo(_) => None,
        }
    }

    /// Groups of a non-leaf index, in key order.
    pub(crate) fn groups(&self) -> impl DoubleEndedIterator<Item = GroupId> + '_ {
        self.keyed()
            .into_iter()
            .flat_map(|map| map.values())
            .filter_map(|e| e.group())
    }

    /// Groups following `key`, in key order.
    pub(crate) fn groups_after<'a>(&'a self, key: &'a IndexKey) -> impl Iterator<Item = GroupId> + 'a {
        self.keyed()
            .into_iter()
            .flat_map(move |map| map.range::<IndexKey, _>((Excluded(key), Unbounded)))
            .filter_map(|(_, e)| e.group())
    }

    /// Rows of a FIFO index, oldest first. Empty for a keyed index.
    pub(crate) fn fifo_rows(&self, slots: &Slots, node: IndexId) -> Vec<HandleId> {
        match self {
            Index::Fifo(list) => list.oldest_first(slots, node),
            Index::Keyed(_) => Vec::new(),
        }
    }

    /// First row of a leaf index in iteration order.
    pub(crate) fn first_row(&self, reverse: bool) -> Option<HandleId> {
        match self {
            Index::Keyed(map) => map.values().find_map(|e| e.row()),
            Index::Fifo(list) if reverse => list.tail,
            Index::Fifo(list) => list.head,
        }
    }

    /// Last row of a leaf index in iteration order.
    pub(crate) fn last_row(&self, reverse: bool) -> Option<HandleId> {
        match self {
            Index::Keyed(map) => map.values().rev().find_map(|e| e.row()),
            Index::Fifo(list) if reverse => list.head,
            Index::Fifo(list) => list.tail,
        }
    }

    /// Row following `h` in a leaf index.
    pub(crate) fn next_row(&self, slots: &Slots, node: IndexId, h: HandleId, reverse: bool) -> Option<HandleId> {
        match self {
            Index::Keyed(map) => {
                let key = slots.get(&h)?.sections.get(node.0)?.key()?;
                map.range::<IndexKey, _>((Excluded(key), Unbounded)).find_map(|(_, e)| e.row())
            }
            Index::Fifo(_) => {
                let (prev, next) = FifoList::links(slots, node, h)?;
                if reverse {
                    prev
                } else {
                    next
                }
            }
        }
    }
}
