//! Field definition for tributary row types.

use crate::types::DataType;
use alloc::string::String;

/// A field definition in a row type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// Field name.
    name: String,
    /// Data type of the field.
    data_type: DataType,
    /// Field position in the row (0-based).
    index: usize,
}

impl Field {
    /// Creates a new field definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            index: 0,
        }
    }

    /// Sets the field position.
    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Returns the field name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the field position.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}
