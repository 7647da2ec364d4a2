//! Index keys and comparators.
//!
//! Every keyed index stores its entries in a `BTreeMap<IndexKey, _>`. The key
//! of a row is extracted once, when the row is inserted, and kept in the
//! row's section for that index, so later lookups never recompute it.
//!
//! - Hashed keys order by a precomputed hash, then by value. The hasher uses
//!   fixed seeds, so the order is the same on every run.
//! - Ordered keys compare field by field, each field in its own `Order`.
//! - Sorted keys delegate to a user `SortCondition`.

use ahash::RandomState;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash::BuildHasher;
use tributary_core::{Errors, Row, RowTypeRef, Value};

const HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Sort order for index keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Order {
    /// Ascending order (smallest first)
    Asc,
    /// Descending order (largest first)
    Desc,
}

impl Order {
    /// Applies this order to a comparison result.
    #[inline]
    pub fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        }
    }
}

/// One key field of an ordered index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyField {
    /// Field name in the table's row type.
    pub name: String,
    /// Direction of this field.
    pub order: Order,
}

impl KeyField {
    /// An ascending key field.
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: Order::Asc,
        }
    }

    /// A descending key field.
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: Order::Desc,
        }
    }
}

/// A user-defined ordering for a sorted index.
///
/// Rows comparing equal are duplicates: inserting one replaces the other.
pub trait SortCondition {
    /// Compares two rows.
    fn compare(&self, a: &Row, b: &Row) -> Ordering;

    /// Returns false to veto the insertion of `row` into the table.
    fn allow_insert(&self, _row: &Row) -> bool {
        true
    }

    /// Validates the condition against the table's row type.
    fn check(&self, _row_type: &RowTypeRef, _errors: &mut Errors) {}
}

impl<F> SortCondition for F
where
    F: Fn(&Row, &Row) -> Ordering,
{
    fn compare(&self, a: &Row, b: &Row) -> Ordering {
        self(a, b)
    }
}

/// The key of one row in one keyed index.
#[derive(Clone)]
pub(crate) enum IndexKey {
    Hashed { hash: u64, values: Vec<Value> },
    Ordered { values: Vec<Value>, orders: Rc<[Order]> },
    Sorted { row: Row, condition: Rc<dyn SortCondition> },
}

impl IndexKey {
    fn rank(&self) -> u8 {
        match self {
            IndexKey::Hashed { .. } => 0,
            IndexKey::Ordered { .. } => 1,
            IndexKey::Sorted { .. } => 2,
        }
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                IndexKey::Hashed { hash: ha, values: va },
                IndexKey::Hashed { hash: hb, values: vb },
            ) => ha.cmp(hb).then_with(|| va.cmp(vb)),
            (
                IndexKey::Ordered { values: va, orders },
                IndexKey::Ordered { values: vb, .. },
            ) => {
                for ((a, b), order) in va.iter().zip(vb.iter()).zip(orders.iter()) {
                    let cmp = order.apply(a.cmp(b));
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                }
                Ordering::Equal
            }
            (IndexKey::Sorted { row: ra, condition }, IndexKey::Sorted { row: rb, .. }) => {
                condition.compare(ra, rb)
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Hashed { hash, values } => write!(f, "Hashed({:016x}, {:?})", hash, values),
            IndexKey::Ordered { values, .. } => write!(f, "Ordered({:?})", values),
            IndexKey::Sorted { row, .. } => write!(f, "Sorted({})", row),
        }
    }
}

/// Compiled key extraction of one keyed index.
#[derive(Clone)]
pub(crate) enum KeySpec {
    Hashed(Vec<usize>),
    Ordered { fields: Vec<usize>, orders: Rc<[Order]> },
    Sorted(Rc<dyn SortCondition>),
}

impl KeySpec {
    fn values(row: &Row, fields: &[usize]) -> Vec<Value> {
        fields
            .iter()
            .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Extracts the key of a row.
    pub(crate) fn key_of(&self, row: &Row) -> IndexKey {
        match self {
            KeySpec::Hashed(fields) => {
                let values = Self::values(row, fields);
                let state = RandomState::with_seeds(
                    HASH_SEEDS[0],
                    HASH_SEEDS[1],
                    HASH_SEEDS[2],
                    HASH_SEEDS[3],
                );
                IndexKey::Hashed {
                    hash: state.hash_one(&values),
                    values,
                }
            }
            KeySpec::Ordered { fields, orders } => IndexKey::Ordered {
                values: Self::values(row, fields),
                orders: orders.clone(),
            },
            KeySpec::Sorted(condition) => IndexKey::Sorted {
                row: row.clone(),
                condition: condition.clone(),
            },
        }
    }

    /// Returns false if the index vetoes the insertion of `row`.
    pub(crate) fn allows(&self, row: &Row) -> bool {
        match self {
            KeySpec::Sorted(condition) => condition.allow_insert(row),
            _ => true,
        }
    }
}
