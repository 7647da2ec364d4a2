//! Group handles.
//!
//! A group is the runtime unit of a non-leaf index: all rows sharing one key
//! of that index. It holds one index per nested index type and one
//! aggregator per aggregator declared on those nested types. The table has
//! one root group holding the top-level indexes.

use crate::aggregator::Aggregator;
use crate::index::Index;
use crate::index_type::IndexId;
use crate::key::IndexKey;
use alloc::boxed::Box;
use alloc::vec::Vec;
use tributary_core::Row;

/// Identifier of a group within its table.
pub(crate) type GroupId = u64;

pub(crate) struct GroupHandle {
    /// The index this is a group of; the root index for the root group.
    pub(crate) node: IndexId,
    /// The group holding the index this group is in.
    pub(crate) parent: Option<GroupId>,
    pub(crate) key: Option<IndexKey>,
    /// The row that created the group. Only its key fields matter; it is
    /// kept when that row leaves the table.
    pub(crate) row: Option<Row>,
    /// Number of rows in the group.
    pub(crate) rows: usize,
    pub(crate) indexes: Vec<Index>,
    pub(crate) aggregators: Vec<Box<dyn Aggregator>>,
}

impl GroupHandle {
    /// Returns true if the group holds no rows and no nested groups.
    pub(crate) fn is_empty(&self) -> bool {
        self.rows == 0 && self.indexes.iter().all(Index::is_empty)
    }
}
