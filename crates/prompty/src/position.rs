/*
 * position.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Source positions for tokens, AST nodes and errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A location in template source.
///
/// `line` and `column` are 1-based, `column` counts characters (not bytes).
/// `offset` is the 0-based byte offset into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Byte offset from start of source
    pub offset: usize,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based, in characters)
    pub column: usize,
}

impl Position {
    /// Create a position from its parts.
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// The position of the first character of a source.
    pub fn start() -> Self {
        Self::new(0, 1, 1)
    }

    /// Locate byte `offset` in `source`. Offsets past the end or inside a
    /// character are clamped back to the nearest character boundary.
    pub fn at_offset(source: &str, offset: usize) -> Self {
        let mut end = offset.min(source.len());
        while !source.is_char_boundary(end) {
            end -= 1;
        }
        let before = &source[..end];
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        Self::new(
            end,
            before.matches('\n').count() + 1,
            before[line_start..].chars().count() + 1,
        )
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open byte range `[start, end)` in template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Start location (inclusive)
    pub start: Position,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    pub fn new(start: Position, end: usize) -> Self {
        Self { start, end }
    }

    /// Slice the covered text out of `source`.
    ///
    /// Returns an empty string if the span does not fit the source, which can
    /// only happen when a span is paired with the wrong template.
    pub fn slice<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.start.offset..self.end).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_ordering() {
        let a = Position::new(0, 1, 1);
        let b = Position::new(5, 1, 6);
        let c = Position::new(10, 2, 1);

        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_position_display() {
        assert_eq!(Position::new(12, 3, 4).to_string(), "3:4");
    }

    #[test]
    fn test_at_offset_counts_characters() {
        let source = "'é' + 1";
        assert_eq!(Position::at_offset(source, 5), Position::new(5, 1, 5));
        assert_eq!(Position::at_offset("ab\ncd", 4), Position::new(4, 2, 2));
        assert_eq!(Position::at_offset("ab", 10), Position::new(2, 1, 3));
        // Inside the two bytes of `é`
        assert_eq!(Position::at_offset(source, 2), Position::new(1, 1, 2));
    }

    #[test]
    fn test_span_slice() {
        let source = "Hello, {~x /~}!";
        let span = Span::new(Position::new(7, 1, 8), 14);
        assert_eq!(span.slice(source), "{~x /~}");

        let bad = Span::new(Position::new(7, 1, 8), 100);
        assert_eq!(bad.slice(source), "");
    }
}
