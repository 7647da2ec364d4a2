//! Index types.
//!
//! An `IndexType` is a reusable definition: what the index is keyed on and
//! which indexes are nested in it. A tree of index types becomes usable only
//! when a `TableType` is initialized, which compiles it against the table's
//! row type into an `IndexTree`:
//!
//! 1. `initialize` walks the definitions top-down. Each node gets its id, which
//!    is also the position of its section in every row, and resolves its key
//!    fields. Errors are collected per node and compilation goes on.
//! 2. `initialize_nested` walks the tree bottom-up. A non-leaf node builds its
//!    group layout (nested indexes and the aggregators living in each group)
//!    and its iteration chain, which both need the children to be finished.
//!
//! The root of the tree is synthetic: it stands for "all rows of the table"
//! and has exactly one group.

use crate::aggregator::AggregatorType;
use crate::key::{KeyField, KeySpec, Order, SortCondition};
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use tributary_core::{Errors, RowTypeRef};

/// Identifier of a compiled index within its table type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexId(pub(crate) usize);

impl IndexId {
    /// Returns the numeric id.
    #[inline]
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

#[derive(Clone)]
enum IndexKind {
    Hashed(Vec<String>),
    Ordered(Vec<KeyField>),
    Sorted {
        name: String,
        condition: Rc<dyn SortCondition>,
    },
    Fifo {
        limit: Option<usize>,
        jumping: bool,
        reverse: bool,
    },
}

/// Definition of an index and the indexes nested in it.
#[derive(Clone)]
pub struct IndexType {
    kind: IndexKind,
    nested: Vec<(String, IndexType)>,
    aggregator: Option<Rc<dyn AggregatorType>>,
}

impl IndexType {
    fn with_kind(kind: IndexKind) -> Self {
        Self {
            kind,
            nested: Vec::new(),
            aggregator: None,
        }
    }

    /// A unique index on the given fields, in hash order.
    pub fn hashed(fields: &[&str]) -> Self {
        Self::with_kind(IndexKind::Hashed(fields.iter().map(|f| String::from(*f)).collect()))
    }

    /// A unique index on the given fields, in key order.
    pub fn ordered(fields: impl IntoIterator<Item = KeyField>) -> Self {
        Self::with_kind(IndexKind::Ordered(fields.into_iter().collect()))
    }

    /// A unique index ordered by a user condition.
    pub fn sorted(name: impl Into<String>, condition: impl SortCondition + 'static) -> Self {
        Self::with_kind(IndexKind::Sorted {
            name: name.into(),
            condition: Rc::new(condition),
        })
    }

    /// An unbounded index in insertion order.
    pub fn fifo() -> Self {
        Self::with_kind(IndexKind::Fifo {
            limit: None,
            jumping: false,
            reverse: false,
        })
    }

    /// An index in insertion order holding at most `limit` rows.
    ///
    /// When full, an insertion evicts the oldest row, or every row if
    /// `jumping`. With `reverse` the index iterates newest first.
    pub fn fifo_limited(limit: usize, jumping: bool, reverse: bool) -> Self {
        Self::with_kind(IndexKind::Fifo {
            limit: Some(limit),
            jumping,
            reverse,
        })
    }

    /// Nests an index in this one.
    pub fn add_subindex(mut self, name: impl Into<String>, index: IndexType) -> Self {
        self.nested.push((name.into(), index));
        self
    }

    /// Attaches an aggregator, computed per group of the parent index.
    pub fn set_aggregator(mut self, aggregator: impl AggregatorType + 'static) -> Self {
        self.aggregator = Some(Rc::new(aggregator));
        self
    }

    /// Returns true if nothing is nested in this index.
    pub fn is_leaf(&self) -> bool {
        self.nested.is_empty()
    }

    /// Returns the nested indexes with their names.
    pub fn nested(&self) -> &[(String, IndexType)] {
        &self.nested
    }

    /// Returns the name of the index kind, with its key.
    pub fn type_name(&self) -> String {
        match &self.kind {
            IndexKind::Hashed(fields) => format!("HashedIndex({})", fields.join(", ")),
            IndexKind::Ordered(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|f| match f.order {
                        Order::Asc => f.name.clone(),
                        Order::Desc => format!("!{}", f.name),
                    })
                    .collect();
                format!("OrderedIndex({})", parts.join(", "))
            }
            IndexKind::Sorted { name, .. } => format!("SortedIndex({})", name),
            IndexKind::Fifo {
                limit,
                jumping,
                reverse,
            } => {
                let mut opts: Vec<String> = Vec::new();
                if let Some(limit) = limit {
                    opts.push(format!("limit={}", limit));
                }
                if *jumping {
                    opts.push(String::from("jumping"));
                }
                if *reverse {
                    opts.push(String::from("reverse"));
                }
                format!("FifoIndex({})", opts.join(" "))
            }
        }
    }
}

impl fmt::Debug for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())?;
        if !self.nested.is_empty() {
            f.write_str(" {")?;
            for (i, (name, nested)) in self.nested.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, " {:?} {}", nested, name)?;
            }
            f.write_str(" }")?;
        }
        Ok(())
    }
}

/// Compiled form of an index kind.
pub(crate) enum NodeKind {
    Root,
    Keyed(KeySpec),
    Fifo {
        limit: Option<usize>,
        jumping: bool,
        reverse: bool,
    },
}

/// What every group of a non-leaf node contains.
#[derive(Default)]
pub(crate) struct GroupLayout {
    /// One index per nested node, in declaration order.
    pub(crate) nested: Vec<IndexId>,
    /// Aggregators declared on the nested nodes, in declaration order.
    pub(crate) aggregators: Vec<usize>,
}

/// A compiled index.
pub(crate) struct IndexNode {
    pub(crate) id: IndexId,
    pub(crate) path: String,
    pub(crate) type_name: String,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<IndexId>,
    /// Position among the parent's nested indexes.
    pub(crate) position: usize,
    /// 0 for the root.
    pub(crate) level: usize,
    pub(crate) children: Vec<IndexId>,
    pub(crate) aggregator: Option<usize>,
    pub(crate) layout: GroupLayout,
    /// Ancestors below the root, this node, then first children down to a
    /// leaf. Walking it from the root visits the rows in this index's order.
    pub(crate) nav_path: Vec<IndexId>,
}

impl IndexNode {
    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    #[inline]
    pub(crate) fn is_reverse(&self) -> bool {
        matches!(self.kind, NodeKind::Fifo { reverse: true, .. })
    }

    pub(crate) fn key_spec(&self) -> Option<&KeySpec> {
        match &self.kind {
            NodeKind::Keyed(spec) => Some(spec),
            _ => None,
        }
    }

    /// The part of `nav_path` below the parent: the order of this index
    /// within one group of the parent.
    #[inline]
    pub(crate) fn group_path(&self) -> &[IndexId] {
        let start = self.level.saturating_sub(1);
        &self.nav_path[start..]
    }
}

/// An aggregator found while compiling, with the node it is declared on.
pub(crate) struct AggregatorSlot {
    pub(crate) name: String,
    pub(crate) node: IndexId,
    pub(crate) agg_type: Rc<dyn AggregatorType>,
}

/// The compiled index tree of a table type.
pub(crate) struct IndexTree {
    nodes: Vec<IndexNode>,
}

impl IndexTree {
    pub(crate) const ROOT: IndexId = IndexId(0);

    /// Compiles the top-level index definitions.
    pub(crate) fn compile(
        row_type: &RowTypeRef,
        defs: &[(String, IndexType)],
        aggregators: &mut Vec<AggregatorSlot>,
        errors: &mut Errors,
    ) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
        };
        tree.nodes.push(IndexNode {
            id: Self::ROOT,
            path: String::new(),
            type_name: String::from("RootIndex"),
            kind: NodeKind::Root,
            parent: None,
            position: 0,
            level: 0,
            children: Vec::new(),
            aggregator: None,
            layout: GroupLayout::default(),
            nav_path: Vec::new(),
        });

        if defs.is_empty() {
            errors.append_msg(true, "no indexes are defined");
        }
        check_names(defs, errors);
        for (i, (name, def)) in defs.iter().enumerate() {
            let mut child_errors = Errors::new();
            let id = tree.initialize(def, name, Self::ROOT, i, row_type, aggregators, &mut child_errors);
            tree.nodes[0].children.push(id);
            errors.append(format!("nested index {} '{}':", i + 1, name), child_errors);
        }
        tree.initialize_nested(Self::ROOT);
        tree
    }

    #[allow(clippy::too_many_arguments)]
    fn initialize(
        &mut self,
        def: &IndexType,
        name: &str,
        parent: IndexId,
        position: usize,
        row_type: &RowTypeRef,
        aggregators: &mut Vec<AggregatorSlot>,
        errors: &mut Errors,
    ) -> IndexId {
        let id = IndexId(self.nodes.len());
        let (path, level, mut nav_path) = {
            let p = &self.nodes[parent.0];
            let path = if p.path.is_empty() {
                String::from(name)
            } else {
                format!("{}.{}", p.path, name)
            };
            (path, p.level + 1, p.nav_path.clone())
        };
        nav_path.push(id);

        let kind = match &def.kind {
            IndexKind::Hashed(fields) => {
                let resolved = resolve_fields(row_type, fields.iter().map(String::as_str), errors);
                NodeKind::Keyed(KeySpec::Hashed(resolved))
            }
            IndexKind::Ordered(fields) => {
                let resolved = resolve_fields(row_type, fields.iter().map(|f| f.name.as_str()), errors);
                let orders: Vec<Order> = fields.iter().map(|f| f.order).collect();
                NodeKind::Keyed(KeySpec::Ordered {
                    fields: resolved,
                    orders: Rc::from(orders),
                })
            }
            IndexKind::Sorted { condition, .. } => {
                condition.check(row_type, errors);
                NodeKind::Keyed(KeySpec::Sorted(condition.clone()))
            }
            IndexKind::Fifo {
                limit,
                jumping,
                reverse,
            } => {
                if !def.nested.is_empty() {
                    errors.append_msg(true, "FifoIndex can not have nested indexes");
                }
                if *limit == Some(0) {
                    errors.append_msg(true, "the FifoIndex limit must be greater than 0");
                }
                NodeKind::Fifo {
                    limit: *limit,
                    jumping: *jumping,
                    reverse: *reverse,
                }
            }
        };

        let aggregator = def.aggregator.as_ref().map(|agg_type| {
            let mut agg_errors = Errors::new();
            agg_type.check(row_type, &mut agg_errors);
            errors.append(format!("aggregator '{}':", agg_type.name()), agg_errors);
            aggregators.push(AggregatorSlot {
                name: String::from(agg_type.name()),
                node: id,
                agg_type: agg_type.clone(),
            });
            aggregators.len() - 1
        });

        self.nodes.push(IndexNode {
            id,
            path,
            type_name: def.type_name(),
            kind,
            parent: Some(parent),
            position,
            level,
            children: Vec::new(),
            aggregator,
            layout: GroupLayout::default(),
            nav_path,
        });

        check_names(&def.nested, errors);
        for (i, (sub_name, sub)) in def.nested.iter().enumerate() {
            let mut child_errors = Errors::new();
            let child = self.initialize(sub, sub_name, id, i, row_type, aggregators, &mut child_errors);
            self.nodes[id.0].children.push(child);
            errors.append(format!("nested index {} '{}':", i + 1, sub_name), child_errors);
        }
        id
    }

    fn initialize_nested(&mut self, id: IndexId) {
        let children = self.nodes[id.0].children.clone();
        for &child in &children {
            self.initialize_nested(child);
        }
        let layout = GroupLayout {
            nested: children.clone(),
            aggregators: children
                .iter()
                .filter_map(|c| self.nodes[c.0].aggregator)
                .collect(),
        };
        if let Some(&first) = children.first() {
            let below: Vec<IndexId> = {
                let f = &self.nodes[first.0];
                f.group_path()[1..].to_vec()
            };
            self.nodes[id.0].nav_path.push(first);
            self.nodes[id.0].nav_path.extend(below);
        }
        self.nodes[id.0].layout = layout;
    }

    #[inline]
    pub(crate) fn node(&self, id: IndexId) -> &IndexNode {
        &self.nodes[id.0]
    }

    pub(crate) fn nodes(&self) -> &[IndexNode] {
        &self.nodes
    }

    /// Finds a node by its dot-separated path, like `"byB.fifo"`.
    pub(crate) fn find_path(&self, path: &str) -> Option<IndexId> {
        self.nodes.iter().skip(1).find(|n| n.path == path).map(|n| n.id)
    }

    /// The leaf reached from the root through first children.
    pub(crate) fn default_leaf(&self) -> IndexId {
        self.nodes[0].nav_path.last().copied().unwrap_or(Self::ROOT)
    }
}

fn check_names(defs: &[(String, IndexType)], errors: &mut Errors) {
    for (i, (name, _)) in defs.iter().enumerate() {
        if name.is_empty() {
            errors.append_msg(true, format!("nested index {} name must not be empty", i + 1));
        } else if name.contains('.') {
            errors.append_msg(true, format!("index name '{}' must not contain '.'", name));
        } else if defs[..i].iter().any(|(other, _)| other == name) {
            errors.append_msg(true, format!("duplicate nested index name '{}'", name));
        }
    }
}

fn resolve_fields<'a>(
    row_type: &RowTypeRef,
    names: impl Iterator<Item = &'a str>,
    errors: &mut Errors,
) -> Vec<usize> {
    let mut resolved = Vec::new();
    let mut any = false;
    for name in names {
        any = true;
        match row_type.field_index(name) {
            Some(i) => resolved.push(i),
            None => errors.append_msg(true, format!("can not find the key field '{}'", name)),
        }
    }
    if !any {
        errors.append_msg(true, "the index must have at least one key field");
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;
    use tributary_core::{DataType, RowTypeBuilder};

    fn rt() -> RowTypeRef {
        RowTypeBuilder::new()
            .add_field("a", DataType::Int32)
            .unwrap()
            .add_field("b", DataType::Int32)
            .unwrap()
            .add_field("c", DataType::String)
            .unwrap()
            .build()
            .unwrap()
    }

    fn compile(defs: &[(String, IndexType)]) -> (IndexTree, Errors) {
        let mut aggs = Vec::new();
        let mut errors = Errors::new();
        let tree = IndexTree::compile(&rt(), defs, &mut aggs, &mut errors);
        (tree, errors)
    }

    #[test]
    fn test_type_names() {
        assert_eq!(IndexType::hashed(&["a", "b"]).type_name(), "HashedIndex(a, b)");
        assert_eq!(
            IndexType::ordered([KeyField::asc("a"), KeyField::desc("b")]).type_name(),
            "OrderedIndex(a, !b)"
        );
        assert_eq!(
            IndexType::fifo_limited(3, true, false).type_name(),
            "FifoIndex(limit=3 jumping)"
        );
        assert_eq!(IndexType::fifo().type_name(), "FifoIndex()");
    }

    #[test]
    fn test_compile_layout() {
        let defs = vec![
            ("primary".to_string(), IndexType::hashed(&["a"])),
            (
                "byB".to_string(),
                IndexType::hashed(&["b"])
                    .add_subindex("fifo", IndexType::fifo())
                    .add_subindex("byC", IndexType::ordered([KeyField::asc("c")])),
            ),
        ];
        let (tree, errors) = compile(&defs);
        assert!(errors.is_empty(), "{}", errors);

        let by_b = tree.find_path("byB").unwrap();
        let fifo = tree.find_path("byB.fifo").unwrap();
        let by_c = tree.find_path("byB.byC").unwrap();
        assert_eq!(tree.nodes().len(), 5);
        assert_eq!(tree.node(by_b).layout.nested, vec![fifo, by_c]);
        assert_eq!(tree.node(by_c).position, 1);
        assert_eq!(tree.node(by_c).level, 2);

        // ids are assigned top-down, depth first
        assert!(by_b < fifo && fifo < by_c);

        assert_eq!(tree.default_leaf(), tree.find_path("primary").unwrap());
        assert_eq!(tree.node(by_b).nav_path, vec![by_b, fifo]);
        assert_eq!(tree.node(by_c).nav_path, vec![by_b, by_c]);
        assert_eq!(tree.node(by_c).group_path(), &[by_c]);
        assert_eq!(tree.node(by_b).group_path(), &[by_b, fifo]);
    }

    #[test]
    fn test_compile_errors() {
        let defs = vec![
            ("primary".to_string(), IndexType::hashed(&["x"])),
            (
                "f".to_string(),
                IndexType::fifo().add_subindex("sub", IndexType::hashed(&[])),
            ),
            ("primary".to_string(), IndexType::hashed(&["a"])),
        ];
        let (_, errors) = compile(&defs);
        assert!(errors.has_error());
        assert_eq!(
            errors.to_string(),
            "duplicate nested index name 'primary'\n\
             nested index 1 'primary':\n  can not find the key field 'x'\n\
             nested index 2 'f':\n  FifoIndex can not have nested indexes\n  \
             nested index 1 'sub':\n    the index must have at least one key field\n"
        );
    }

    #[test]
    fn test_no_indexes() {
        let (_, errors) = compile(&[]);
        assert_eq!(errors.to_string(), "no indexes are defined\n");
    }
}
