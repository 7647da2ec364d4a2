//! Table types.

use crate::index_type::{AggregatorSlot, IndexId, IndexTree, IndexType};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use tracing::debug;
use tributary_core::{Errors, RowTypeRef};

/// Names a table already uses for its own labels.
const RESERVED_LABELS: [&str; 3] = ["in", "out", "dump"];

/// The definition of a table: a row type and a tree of indexes.
///
/// A table type is built, initialized once, and then shared between any
/// number of tables, typically behind an `Rc`.
///
/// ```rust
/// use tributary_core::{DataType, RowTypeBuilder};
/// use tributary_table::{IndexType, TableType};
///
/// let rt = RowTypeBuilder::new()
///     .add_field("a", DataType::Int32).unwrap()
///     .add_field("b", DataType::Int32).unwrap()
///     .build().unwrap();
///
/// let mut tt = TableType::new(rt)
///     .add_subindex("primary", IndexType::hashed(&["a"]))
///     .add_subindex("byB", IndexType::hashed(&["b"]).add_subindex("fifo", IndexType::fifo()));
/// assert!(tt.initialize());
/// assert!(tt.find_index("byB.fifo").is_some());
/// ```
pub struct TableType {
    row_type: RowTypeRef,
    defs: Vec<(String, IndexType)>,
    tree: Option<IndexTree>,
    aggregators: Vec<AggregatorSlot>,
    errors: Errors,
}

impl TableType {
    /// Creates a table type without indexes.
    pub fn new(row_type: RowTypeRef) -> Self {
        Self {
            row_type,
            defs: Vec::new(),
            tree: None,
            aggregators: Vec::new(),
            errors: Errors::new(),
        }
    }

    /// Adds a top-level index. Has no effect once initialized.
    pub fn add_subindex(mut self, name: impl Into<String>, index: IndexType) -> Self {
        if self.tree.is_none() {
            self.defs.push((name.into(), index));
        }
        self
    }

    /// Compiles the index tree. Returns true if there were no errors.
    ///
    /// Calling it again has no effect and returns the same result.
    pub fn initialize(&mut self) -> bool {
        if self.tree.is_some() {
            return !self.errors.has_error();
        }
        let mut index_errors = Errors::new();
        let mut aggregators = Vec::new();
        let tree = IndexTree::compile(&self.row_type, &self.defs, &mut aggregators, &mut index_errors);
        self.errors.append("index error:", index_errors);

        let mut agg_errors = Errors::new();
        for (i, slot) in aggregators.iter().enumerate() {
            if slot.name.is_empty() {
                agg_errors.append_msg(true, format!("aggregator {} name must not be empty", i + 1));
            } else if RESERVED_LABELS.contains(&slot.name.as_str()) {
                agg_errors.append_msg(true, format!("aggregator name '{}' is reserved", slot.name));
            } else if aggregators[..i].iter().any(|other| other.name == slot.name) {
                agg_errors.append_msg(true, format!("duplicate aggregator name '{}'", slot.name));
            }
        }
        self.errors.append("aggregator error:", agg_errors);

        debug!(
            indexes = tree.nodes().len() - 1,
            aggregators = aggregators.len(),
            errors = self.errors.has_error(),
            "initialized table type"
        );
        self.tree = Some(tree);
        self.aggregators = aggregators;
        !self.errors.has_error()
    }

    /// Returns true once `initialize` has run.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.tree.is_some()
    }

    /// Returns the diagnostics collected by `initialize`.
    #[inline]
    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    /// Returns the row type.
    #[inline]
    pub fn row_type(&self) -> &RowTypeRef {
        &self.row_type
    }

    /// Finds an index by its dot-separated path, like `"byB.fifo"`.
    pub fn find_index(&self, path: &str) -> Option<IndexId> {
        self.tree.as_ref()?.find_path(path)
    }

    /// Returns the path of an index.
    pub fn index_path(&self, id: IndexId) -> Option<&str> {
        let tree = self.tree.as_ref()?;
        tree.nodes().get(id.0).map(|n| n.path.as_str())
    }

    /// Returns the kind description of an index, like `"HashedIndex(a)"`.
    pub fn index_type_name(&self, id: IndexId) -> Option<&str> {
        let tree = self.tree.as_ref()?;
        tree.nodes().get(id.0).map(|n| n.type_name.as_str())
    }

    /// Returns the leaf reached through first indexes, which defines the
    /// default row order of tables of this type.
    pub fn first_leaf(&self) -> Option<IndexId> {
        let tree = self.tree.as_ref()?;
        (tree.nodes().len() > 1).then(|| tree.default_leaf())
    }

    /// Returns true if the index has nested indexes.
    pub fn is_leaf(&self, id: IndexId) -> bool {
        self.tree
            .as_ref()
            .and_then(|t| t.nodes().get(id.0))
            .map_or(true, |n| n.is_leaf())
    }

    /// Returns the aggregator names, in declaration order.
    pub fn aggregator_names(&self) -> Vec<&str> {
        self.aggregators.iter().map(|a| a.name.as_str()).collect()
    }

    #[inline]
    pub(crate) fn has_aggregators(&self) -> bool {
        !self.aggregators.is_empty()
    }

    #[inline]
    pub(crate) fn aggregator_slot(&self, i: usize) -> &AggregatorSlot {
        &self.aggregators[i]
    }

    #[inline]
    pub(crate) fn aggregator_slots(&self) -> &[AggregatorSlot] {
        &self.aggregators
    }

    /// The compiled tree. Only valid on an initialized type, which is all a
    /// table ever holds.
    pub(crate) fn tree(&self) -> &IndexTree {
        match &self.tree {
            Some(tree) => tree,
            None => panic!("table type used before initialize()"),
        }
    }
}
