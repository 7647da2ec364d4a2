//! Row structure for tributary.
//!
//! A `Row` is immutable once built and shared by reference count: tables,
//! rowops and trays all hold clones of the same allocation. The row is freed
//! when the last clone is dropped.

use crate::schema::RowTypeRef;
use crate::value::Value;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;

struct RowData {
    row_type: RowTypeRef,
    values: Vec<Value>,
}

/// An immutable record of a row type.
#[derive(Clone)]
pub struct Row {
    inner: Rc<RowData>,
}

impl Row {
    /// Assembles a row whose values were already checked against the type.
    pub(crate) fn from_parts(row_type: RowTypeRef, values: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(RowData { row_type, values }),
        }
    }

    /// Returns the type this row was built for.
    #[inline]
    pub fn row_type(&self) -> &RowTypeRef {
        &self.inner.row_type
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.inner.values
    }

    /// Gets the raw value at the given position, nulls included.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.inner.values.get(index)
    }

    /// Gets the value at the given position if it is present and non-null.
    pub fn get_field(&self, index: usize) -> Option<&Value> {
        match self.inner.values.get(index) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    /// Gets a field value by field name, if non-null.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.inner
            .row_type
            .field_index(name)
            .and_then(|i| self.get_field(i))
    }

    /// Returns the number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    /// Returns true if this row has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }

    /// Returns true if both rows are the same allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &Row) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.inner.row_type.matches(&other.inner.row_type)
                && self.inner.values == other.inner.values)
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, value) in self.inner.row_type.fields().iter().zip(self.values()) {
            if value.is_null() {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{}={}", field.name(), value)?;
        }
        Ok(())
    }
}
