use std::fmt;

/// A position inside a code source
///
/// `line` counts from zero, `column` is a byte offset inside that line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLocation {
    /// Zero-based line number
    pub line: usize,
    /// Byte offset from the start of the line
    pub column: usize,
}

impl SourceLocation {
    /// Create a location from a zero-based line and a byte column
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Prefix `message` with this location, e.g. `"  3: 7: unexpected token"`
    #[must_use]
    pub fn prefix(&self, message: impl fmt::Display) -> String {
        format!("{self}: {message}")
    }
}

/// Renders as `<line>:<col>` with the line printed one-based and padded to
/// three columns, the byte column padded to two.
impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3}:{:>2}", self.line + 1, self.column)
    }
}
