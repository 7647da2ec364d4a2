//! Hierarchical diagnostics.
//!
//! Definition problems are not reported one at a time: every stage of type
//! compilation appends what it found to an [`Errors`] node and keeps going, so
//! a single pass reports everything. A node holds messages and titled child
//! nodes in the order they were appended. The error flag of a child is folded
//! into its parent on every append, so the root tells whether anything below
//! it was an error (as opposed to a warning).

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Indentation added per nesting level when printing.
const INDENT_STEP: usize = 2;

#[derive(Clone, Debug, PartialEq)]
enum Entry {
    Message(String),
    Nested { title: String, errors: Errors },
}

/// A tree of diagnostic messages.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Errors {
    entries: Vec<Entry>,
    error: bool,
}

impl Errors {
    /// Creates an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message. `is_error` marks it as an error rather than a warning.
    pub fn append_msg(&mut self, is_error: bool, msg: impl Into<String>) {
        self.error |= is_error;
        self.entries.push(Entry::Message(msg.into()));
    }

    /// Appends a titled child node.
    ///
    /// Empty children are dropped. Returns whether the child carried an error.
    pub fn append(&mut self, title: impl Into<String>, child: Errors) -> bool {
        if child.is_empty() {
            return false;
        }
        let child_error = child.error;
        self.error |= child_error;
        self.entries.push(Entry::Nested {
            title: title.into(),
            errors: child,
        });
        child_error
    }

    /// Moves all entries of another node into this one, without a title.
    pub fn absorb(&mut self, other: Errors) {
        self.error |= other.error;
        self.entries.extend(other.entries);
    }

    /// Marks this node as erroneous.
    pub fn set_error(&mut self) {
        self.error = true;
    }

    /// Returns true if this node or any node below it holds an error.
    #[inline]
    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Returns true if nothing has been appended.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the tree, each line prefixed by `indent` spaces.
    pub fn print_to(&self, out: &mut String, indent: usize) {
        for entry in &self.entries {
            match entry {
                Entry::Message(msg) => {
                    for line in msg.lines() {
                        push_indented(out, indent, line);
                    }
                }
                Entry::Nested { title, errors } => {
                    push_indented(out, indent, title);
                    errors.print_to(out, indent + INDENT_STEP);
                }
            }
        }
    }
}

fn push_indented(out: &mut String, indent: usize, line: &str) {
    for _ in 0..indent {
        out.push(' ');
    }
    out.push_str(line);
    out.push('\n');
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.print_to(&mut out, 0);
        f.write_str(&out)
    }
}
