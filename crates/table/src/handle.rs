//! Row handles.
//!
//! A `RowHandle` is the caller's reference to one row of one table. While the
//! row is in the table, the table keeps a slot for it holding one section per
//! index of the table type: the row's precomputed key and its group for a
//! keyed index, its neighbours for a FIFO index. Sections are indexed by the
//! index id assigned when the table type was initialized, so all rows of a
//! table share the same layout.
//!
//! The slot is dropped when the row leaves the table; the handle itself stays
//! valid and may be inserted again.

use crate::group::GroupId;
use crate::key::IndexKey;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use hashbrown::HashMap;
use tributary_core::Row;

/// Unique identifier of a row handle.
pub type HandleId = u64;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// A row prepared for insertion into a specific table.
#[derive(Clone)]
pub struct RowHandle {
    pub(crate) id: HandleId,
    pub(crate) table_id: u64,
    pub(crate) row: Row,
}

impl RowHandle {
    pub(crate) fn new(table_id: u64, row: Row) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            table_id,
            row,
        }
    }

    pub(crate) fn with_id(id: HandleId, table_id: u64, row: Row) -> Self {
        Self { id, table_id, row }
    }

    /// Returns the handle id.
    #[inline]
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Returns the row.
    #[inline]
    pub fn row(&self) -> &Row {
        &self.row
    }
}

impl PartialEq for RowHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RowHandle {}

impl fmt::Debug for RowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowHandle({}: {})", self.id, self.row)
    }
}

/// Per-index state of one row.
#[derive(Clone, Debug)]
pub(crate) enum Section {
    /// The root index keeps nothing per row.
    Root,
    Keyed {
        key: IndexKey,
        /// The group of this row, for a non-leaf index.
        group: Option<GroupId>,
    },
    Fifo {
        prev: Option<HandleId>,
        next: Option<HandleId>,
    },
}

impl Section {
    #[inline]
    pub(crate) fn key(&self) -> Option<&IndexKey> {
        match self {
            Section::Keyed { key, .. } => Some(key),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn group(&self) -> Option<GroupId> {
        match self {
            Section::Keyed { group, .. } => *group,
            _ => None,
        }
    }
}

/// A row in the table, with its sections.
pub(crate) struct HandleSlot {
    pub(crate) row: Row,
    pub(crate) sections: alloc::vec::Vec<Section>,
}

pub(crate) type Slots = HashMap<HandleId, HandleSlot>;
