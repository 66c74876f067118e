//! pyxis syntax
//!
//! Lexing and parsing for the Python subset understood by the pyxis type
//! checker. The entry point is [`parse_module`]; the resulting [`ModuleAst`]
//! is an immutable tree whose nodes carry byte [`Span`]s.

pub mod ast;
pub mod content_hash;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod span;
pub mod token;
pub mod transform;

// Re-export core types
pub use ast::*;
pub use content_hash::{hash_source, ContentHasher};
pub use error::{ParseError, Result};
pub use lexer::Lexer;
pub use parser::Parser;
pub use span::{ByteOffset, FileId, HasSpan, LineCol, LineIndex, Span};
pub use token::{Token, TokenKind};

/// Parse one source file into a module tree
pub fn parse_module(source: &str, file_id: FileId) -> Result<ModuleAst> {
    let mut parser = Parser::new(source, file_id)?;
    let module = parser.parse()?;
    tracing::trace!(file = file_id.as_u32(), statements = module.body.len(), "parsed module");
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_parsing() {
        let source = "from typing import Optional\n\nclass A:\n    x: Optional[int] = None\n";
        let module = parse_module(source, FileId::new(0)).unwrap();
        assert_eq!(module.body.len(), 2);
        assert_eq!(module.imports()[0].module, "typing");
    }

    #[test]
    fn test_error_location() {
        let source = "x = 1\ny = )\n";
        let err = parse_module(source, FileId::new(0)).unwrap_err();
        let index = LineIndex::new(source);
        assert_eq!(index.line_col(err.span().start).line, 2);
    }

    #[test]
    fn test_docstring_is_expression_statement() {
        let source = "\"\"\"Module docs.\"\"\"\ndef f():\n    '''f docs'''\n    pass\n";
        let module = parse_module(source, FileId::new(0)).unwrap();
        assert!(matches!(&module.body[0], Stmt::Expr { value: Expr::Str { .. }, .. }));
    }
}
