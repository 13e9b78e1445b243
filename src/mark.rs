//! Source positions shared by every pipeline stage.

use std::fmt;
use std::rc::Rc;

/// A zero-based (line, column) position within a named input, plus the
/// absolute byte index it corresponds to (useful for slicing the original
/// buffer when reporting errors).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mark {
    pub name: Rc<str>,
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

impl Mark {
    pub fn new(name: Rc<str>, index: usize, line: usize, column: usize) -> Self {
        Mark { name, index, line, column }
    }

    /// A placeholder mark for programmatically constructed documents that
    /// never went through the Reader (e.g. nodes built by hand before a
    /// dump). Carries no useful position information.
    pub fn unknown() -> Self {
        Mark { name: Rc::from("<unknown>"), index: 0, line: 0, column: 0 }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in \"{}\", line {}, column {}", self.name, self.line + 1, self.column + 1)
    }
}
