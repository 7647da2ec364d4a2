//! Rowops and trays.
//!
//! A `Rowop` is the unit of work of the scheduler: an immutable
//! (label, opcode, row) triple. A `Tray` is an ordered batch of rowops, used
//! both to enqueue several rowops at once and to collect copies of what a
//! table emitted.

use crate::label::Label;
use crate::opcode::Opcode;
use alloc::vec::Vec;
use core::fmt;
use tributary_core::{Error, Result, Row};

/// One scheduled event.
#[derive(Clone)]
pub struct Rowop {
    label: Label,
    opcode: Opcode,
    row: Row,
}

impl Rowop {
    /// Creates a rowop, checking the row against the label's row type.
    pub fn new(label: &Label, opcode: Opcode, row: Row) -> Result<Self> {
        let rt = label.row_type();
        if !(alloc::rc::Rc::ptr_eq(rt, row.row_type()) || rt.equals(row.row_type())) {
            return Err(Error::RowTypeMismatch {
                label: label.name().into(),
            });
        }
        Ok(Self {
            label: label.clone(),
            opcode,
            row,
        })
    }

    /// Returns the label that will handle this rowop.
    #[inline]
    pub fn label(&self) -> &Label {
        &self.label
    }

    /// Returns the opcode.
    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Returns the row.
    #[inline]
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// Returns true if the opcode has the insert bit.
    #[inline]
    pub fn is_insert(&self) -> bool {
        self.opcode.is_insert()
    }

    /// Returns true if the opcode has the delete bit.
    #[inline]
    pub fn is_delete(&self) -> bool {
        self.opcode.is_delete()
    }

    /// Returns a copy of this rowop directed at another label of the same row type.
    pub fn adopt(&self, label: &Label) -> Result<Rowop> {
        Rowop::new(label, self.opcode, self.row.clone())
    }
}

impl fmt::Debug for Rowop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.label.name(), self.opcode, self.row)
    }
}

/// An ordered sequence of rowops.
#[derive(Clone, Debug, Default)]
pub struct Tray {
    rowops: Vec<Rowop>,
}

impl Tray {
    /// Creates an empty tray.
    pub fn new() -> Self {
        Self { rowops: Vec::new() }
    }

    /// Appends a rowop.
    #[inline]
    pub fn push(&mut self, rowop: Rowop) {
        self.rowops.push(rowop);
    }

    /// Moves all rowops of another tray to the end of this one.
    pub fn append(&mut self, other: &mut Tray) {
        self.rowops.append(&mut other.rowops);
    }

    /// Returns the number of rowops.
    #[inline]
    pub fn len(&self) -> usize {
        self.rowops.len()
    }

    /// Returns true if the tray holds nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rowops.is_empty()
    }

    /// Returns the rowops in order.
    #[inline]
    pub fn as_slice(&self) -> &[Rowop] {
        &self.rowops
    }

    /// Iterates over the rowops in order.
    pub fn iter(&self) -> core::slice::Iter<'_, Rowop> {
        self.rowops.iter()
    }

    /// Removes all rowops.
    pub fn clear(&mut self) {
        self.rowops.clear();
    }
}

impl Extend<Rowop> for Tray {
    fn extend<I: IntoIterator<Item = Rowop>>(&mut self, iter: I) {
        self.rowops.extend(iter);
    }
}

impl FromIterator<Rowop> for Tray {
    fn from_iter<I: IntoIterator<Item = Rowop>>(iter: I) -> Self {
        Self {
            rowops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Tray {
    type Item = Rowop;
    type IntoIter = alloc::vec::IntoIter<Rowop>;

    fn into_iter(self) -> Self::IntoIter {
        self.rowops.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tray {
    type Item = &'a Rowop;
    type IntoIter = core::slice::Iter<'a, Rowop>;

    fn into_iter(self) -> Self::IntoIter {
        self.rowops.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Unit;
    use alloc::format;
    use alloc::vec;
    use tributary_core::schema::RowTypeBuilder;
    use tributary_core::{DataType, RowTypeRef, Value};

    fn rt(field: &str) -> RowTypeRef {
        RowTypeBuilder::new()
            .add_field(field, DataType::Int32)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_rowop_new() {
        let unit = Unit::new("u");
        let t = rt("a");
        let lb = Label::dummy(&unit, t.clone(), "lb");
        let row = t.make_row(vec![Value::Int32(1)]).unwrap();
        let rop = Rowop::new(&lb, Opcode::INSERT, row.clone()).unwrap();
        assert!(rop.is_insert());
        assert!(rop.row().ptr_eq(&row));
        assert_eq!(rop.label(), &lb);
        assert_eq!(format!("{:?}", rop), "lb INSERT a=1");
    }

    #[test]
    fn test_rowop_type_mismatch() {
        let unit = Unit::new("u");
        let lb = Label::dummy(&unit, rt("a"), "lb");
        let row = rt("b").make_row(vec![Value::Int32(1)]).unwrap();
        assert!(matches!(
            Rowop::new(&lb, Opcode::INSERT, row),
            Err(Error::RowTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_rowop_adopt() {
        let unit = Unit::new("u");
        let t = rt("a");
        let lb1 = Label::dummy(&unit, t.clone(), "lb1");
        let lb2 = Label::dummy(&unit, t.clone(), "lb2");
        let rop = lb1
            .make_rowop(Opcode::DELETE, t.make_row(vec![Value::Int32(5)]).unwrap())
            .unwrap();
        let adopted = rop.adopt(&lb2).unwrap();
        assert_eq!(adopted.label(), &lb2);
        assert_eq!(adopted.opcode(), Opcode::DELETE);
        assert!(adopted.row().ptr_eq(rop.row()));
    }

    #[test]
    fn test_tray() {
        let unit = Unit::new("u");
        let t = rt("a");
        let lb = Label::dummy(&unit, t.clone(), "lb");
        let mut tray = Tray::new();
        assert!(tray.is_empty());
        for i in 0..3 {
            tray.push(
                lb.make_rowop(Opcode::INSERT, t.make_row(vec![Value::Int32(i)]).unwrap())
                    .unwrap(),
            );
        }
        let mut other: Tray = tray.iter().cloned().collect();
        tray.append(&mut other);
        assert!(other.is_empty());
        assert_eq!(tray.len(), 6);
        let values: Vec<_> = tray
            .iter()
            .map(|r| r.row().get_field(0).cloned().unwrap())
            .collect();
        assert_eq!(values[3], Value::Int32(0));
        tray.clear();
        assert!(tray.is_empty());
    }
}
