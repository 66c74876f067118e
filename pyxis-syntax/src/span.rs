//! Source locations
//!
//! Spans are byte ranges into a single file. Line and column numbers are
//! only computed when a diagnostic is rendered, through [`LineIndex`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a source file within one build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    pub const INVALID: FileId = FileId(u32::MAX);

    pub fn new(id: u32) -> Self {
        FileId(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// Byte offset into a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteOffset(pub u32);

impl ByteOffset {
    pub fn new(offset: u32) -> Self {
        ByteOffset(offset)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Half-open byte range `[start, end)` in a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub file_id: FileId,
    pub start: ByteOffset,
    pub end: ByteOffset,
}

impl Span {
    pub fn new(file_id: FileId, start: ByteOffset, end: ByteOffset) -> Self {
        Span { file_id, start, end }
    }

    /// A zero-width span, used for synthesized nodes
    pub fn dummy() -> Self {
        Span::new(FileId::INVALID, ByteOffset(0), ByteOffset(0))
    }

    /// Smallest span covering both `self` and `other`
    pub fn merge(self, other: Span) -> Span {
        Span {
            file_id: self.file_id,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> u32 {
        self.end.0.saturating_sub(self.start.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.0, self.end.0)
    }
}

/// Nodes that know where they came from
pub trait HasSpan {
    fn span(&self) -> Span;
}

/// 1-based line and column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

/// Maps byte offsets to line/column pairs
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
    len: u32,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        LineIndex {
            line_starts,
            len: source.len() as u32,
        }
    }

    pub fn line_col(&self, offset: ByteOffset) -> LineCol {
        let offset = offset.0.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        LineCol {
            line: line as u32 + 1,
            column: offset - self.line_starts[line] + 1,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("ab\ncd\n\nx");
        assert_eq!(index.line_col(ByteOffset(0)), LineCol { line: 1, column: 1 });
        assert_eq!(index.line_col(ByteOffset(1)), LineCol { line: 1, column: 2 });
        assert_eq!(index.line_col(ByteOffset(3)), LineCol { line: 2, column: 1 });
        assert_eq!(index.line_col(ByteOffset(6)), LineCol { line: 3, column: 1 });
        assert_eq!(index.line_col(ByteOffset(7)), LineCol { line: 4, column: 1 });
        assert_eq!(index.line_count(), 4);
    }

    #[test]
    fn test_span_merge() {
        let a = Span::new(FileId::new(0), ByteOffset(4), ByteOffset(8));
        let b = Span::new(FileId::new(0), ByteOffset(1), ByteOffset(5));
        let merged = a.merge(b);
        assert_eq!(merged.start, ByteOffset(1));
        assert_eq!(merged.end, ByteOffset(8));
        assert_eq!(merged.len(), 7);
    }
}
