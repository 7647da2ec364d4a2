//! Error types for the tributary engine.

use crate::errors::Errors;
use alloc::string::String;
use thiserror::Error;

/// Result type alias for tributary operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for runtime operations.
///
/// Definition problems found while compiling a table type are collected in an
/// [`Errors`] tree first and only surface here, wrapped in
/// [`Error::Definition`], when something tries to use the broken type.
#[derive(Debug, Error)]
pub enum Error {
    /// A row could not be built from the given values.
    #[error("row type mismatch: {message}")]
    RowType { message: String },

    /// A type carrying definition errors was used.
    #[error("definition errors:\n{errors}")]
    Definition { errors: Errors },

    /// A table type was used before `initialize()`.
    #[error("the table type is not initialized")]
    NotInitialized,

    /// A rowop was sent to a unit other than the one owning its label.
    #[error("label '{label}' belongs to unit '{label_unit}', can not be executed in unit '{unit}'")]
    WrongUnit {
        label: String,
        label_unit: String,
        unit: String,
    },

    /// The row of a rowop has a type different from its label.
    #[error("the row type of a rowop does not match the label '{label}'")]
    RowTypeMismatch { label: String },

    /// Two labels of different row types were chained.
    #[error("can not chain label '{to}' to '{from}' with a different row type")]
    ChainTypeMismatch { from: String, to: String },

    /// Chaining would close a cycle and the unit is configured to reject it.
    #[error("chaining label '{to}' to '{from}' would create a cycle")]
    ChainCycle { from: String, to: String },

    /// The frame stack grew past the configured limit.
    #[error("unit '{unit}' exceeded the maximal stack depth {depth}")]
    StackOverflow { unit: String, depth: usize },

    /// A label was re-entered more times than allowed.
    #[error("label '{label}' exceeded the maximal recursion depth {depth}")]
    RecursionLimit { label: String, depth: usize },

    /// A cleared label was used for chaining or rowop creation.
    #[error("label '{label}' has been cleared")]
    LabelCleared { label: String },

    /// A named object was not found.
    #[error("{what} not found")]
    NotFound { what: String },

    /// A label handler reported a failure.
    #[error("label '{label}': {message}")]
    Label { label: String, message: String },
}

impl Error {
    /// Creates a row construction error.
    pub fn row_type(message: impl Into<String>) -> Self {
        Error::RowType {
            message: message.into(),
        }
    }

    /// Wraps a diagnostic tree.
    pub fn definition(errors: Errors) -> Self {
        Error::Definition { errors }
    }

    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    /// Creates a handler failure for the given label.
    pub fn label(label: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Label {
            label: label.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = Error::row_type("too many values");
        assert!(err.to_string().contains("too many values"));

        let err = Error::not_found("index 'primary'");
        assert_eq!(err.to_string(), "index 'primary' not found");

        let err = Error::RecursionLimit {
            label: "lb".into(),
            depth: 1,
        };
        assert!(err.to_string().contains("'lb'"));
    }

    #[test]
    fn test_definition_error_carries_tree() {
        let mut errors = Errors::new();
        errors.append_msg(true, "bad index");
        let err = Error::definition(errors);
        assert_eq!(err.to_string(), "definition errors:\nbad index\n");
        match err {
            Error::Definition { errors } => assert!(errors.has_error()),
            _ => panic!("Wrong error type"),
        }
    }
}
