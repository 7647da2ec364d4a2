//! Row type definition.

use super::field::Field;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::types::DataType;
use crate::value::Value;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

/// Shared reference to a row type.
pub type RowTypeRef = Rc<RowType>;

/// An ordered set of named, typed fields.
#[derive(Clone, Debug)]
pub struct RowType {
    fields: Vec<Field>,
}

impl RowType {
    /// Creates a row type from the given fields, checking names.
    pub fn new(fields: Vec<Field>) -> Result<RowTypeRef> {
        let mut builder = RowTypeBuilder::new();
        for field in fields {
            builder = builder.add_field(field.name(), field.data_type())?;
        }
        builder.build()
    }

    /// Returns the fields.
    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the number of fields.
    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Gets a field by position.
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Gets a field position by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }

    /// Returns true if both types have the same field names and types.
    pub fn equals(&self, other: &RowType) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type())
    }

    /// Returns true if both types have the same field types, ignoring names.
    pub fn matches(&self, other: &RowType) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.data_type() == b.data_type())
    }

    /// Builds a row of this type.
    ///
    /// Missing trailing values are filled with nulls; extra values and values
    /// of the wrong type are rejected.
    pub fn make_row(self: &Rc<Self>, mut values: Vec<Value>) -> Result<Row> {
        if values.len() > self.fields.len() {
            return Err(Error::row_type(format!(
                "got {} values for {} fields",
                values.len(),
                self.fields.len()
            )));
        }
        for (field, value) in self.fields.iter().zip(values.iter()) {
            if let Some(dt) = value.data_type() {
                if dt != field.data_type() {
                    return Err(Error::row_type(format!(
                        "field '{}' expects {}, got {}",
                        field.name(),
                        field.data_type().name(),
                        dt.name()
                    )));
                }
            }
        }
        values.resize(self.fields.len(), Value::Null);
        Ok(Row::from_parts(self.clone(), values))
    }
}

/// Builder for creating row types.
#[derive(Default)]
pub struct RowTypeBuilder {
    fields: Vec<Field>,
}

impl RowTypeBuilder {
    /// Creates a new row type builder.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let mut chars = name.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return Err(Error::row_type("field name cannot be empty")),
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::row_type(format!(
                "field name must start with letter or underscore: {}",
                name
            )));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::row_type(format!(
                "field name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a field to the row type.
    pub fn add_field(mut self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        if self.fields.iter().any(|f| f.name() == name) {
            return Err(Error::row_type(format!("duplicate field name: {}", name)));
        }
        let index = self.fields.len();
        self.fields.push(Field::new(name, data_type).with_index(index));
        Ok(self)
    }

    /// Builds the row type.
    pub fn build(self) -> Result<RowTypeRef> {
        if self.fields.is_empty() {
            return Err(Error::row_type("a row type needs at least one field"));
        }
        Ok(Rc::new(RowType {
            fields: self.fields,
        }))
    }
}
