//! Parser error types and utilities

use crate::span::Span;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("{message}")]
    Lexer { message: String, span: Span },

    #[error("{message}")]
    Syntax { message: String, span: Span },

    #[error("invalid syntax: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("unexpected end of file: expected {expected}")]
    UnexpectedEof { expected: String, span: Span },

    #[error("unindent does not match any outer indentation level")]
    InconsistentDedent { span: Span },
}

impl ParseError {
    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self::Lexer {
            message: message.into(),
            span,
        }
    }

    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::Syntax {
            message: message.into(),
            span,
        }
    }

    pub fn unexpected_token(expected: impl Into<String>, found: impl Into<String>, span: Span) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn unexpected_eof(expected: impl Into<String>, span: Span) -> Self {
        Self::UnexpectedEof {
            expected: expected.into(),
            span,
        }
    }

    /// Get the span associated with this error
    pub fn span(&self) -> Span {
        match self {
            Self::Lexer { span, .. }
            | Self::Syntax { span, .. }
            | Self::UnexpectedToken { span, .. }
            | Self::UnexpectedEof { span, .. }
            | Self::InconsistentDedent { span } => *span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{ByteOffset, FileId};

    #[test]
    fn test_error_creation() {
        let span = Span::new(FileId::new(0), ByteOffset::new(0), ByteOffset::new(5));

        let error = ParseError::syntax("test error", span);
        assert_eq!(error.span(), span);
        assert_eq!(error.to_string(), "test error");
    }

    #[test]
    fn test_unexpected_token_message() {
        let span = Span::new(FileId::new(0), ByteOffset::new(3), ByteOffset::new(4));
        let error = ParseError::unexpected_token("':'", "newline", span);
        assert_eq!(error.to_string(), "invalid syntax: expected ':', found newline");
    }
}
