//! Lexer
//!
//! Tokenizes source text into a stream of tokens, including the layout
//! tokens (`Newline`, `Indent`, `Dedent`) that encode Python-style
//! block structure. Line breaks inside brackets are joined implicitly.

use crate::{
    error::{ParseError as Error, Result},
    span::{ByteOffset, FileId, Span},
    token::{keyword_to_token, Token, TokenKind},
};

const TAB_WIDTH: u32 = 8;

/// Lexical analyzer
pub struct Lexer<'a> {
    source: &'a str,
    position: usize,
    file_id: FileId,
    indent_stack: Vec<u32>,
    paren_depth: u32,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input
    pub fn new(source: &'a str, file_id: FileId) -> Self {
        Lexer {
            source,
            position: 0,
            file_id,
            indent_stack: vec![0],
            paren_depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        loop {
            if self.at_line_start && self.paren_depth == 0 {
                if !self.handle_indentation()? {
                    break;
                }
            }

            self.skip_inline_whitespace()?;

            let Some(c) = self.current_char() else {
                break;
            };

            match c {
                '#' => self.skip_comment(),
                '\n' => {
                    let start = self.position;
                    self.advance();
                    if self.paren_depth == 0 {
                        self.push(TokenKind::Newline, start);
                        self.at_line_start = true;
                    }
                }
                '\r' => self.advance(),
                _ => self.lex_token()?,
            }
        }

        let end = self.position;
        if let Some(last) = self.tokens.last() {
            if !matches!(last.kind, TokenKind::Newline | TokenKind::Dedent) {
                self.push(TokenKind::Newline, end);
            }
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(TokenKind::Dedent, end);
        }
        self.push(TokenKind::Eof, end);

        Ok(self.tokens)
    }

    fn current_char(&self) -> Option<char> {
        self.source[self.position..].chars().next()
    }

    fn peek_char(&self, n: usize) -> Option<char> {
        self.source[self.position..].chars().nth(n)
    }

    fn advance(&mut self) {
        if let Some(c) = self.current_char() {
            self.position += c.len_utf8();
        }
    }

    fn make_span(&self, start: usize, end: usize) -> Span {
        Span::new(self.file_id, ByteOffset(start as u32), ByteOffset(end as u32))
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let span = self.make_span(start, self.position);
        self.tokens.push(Token::new(kind, span));
    }

    /// Measure the indentation of a new logical line and emit layout tokens.
    /// Returns `false` at end of input.
    fn handle_indentation(&mut self) -> Result<bool> {
        loop {
            let line_start = self.position;
            let mut width = 0u32;
            while let Some(c) = self.current_char() {
                match c {
                    ' ' => width += 1,
                    '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                    '\x0c' => width = 0,
                    _ => break,
                }
                self.advance();
            }

            match self.current_char() {
                None => return Ok(false),
                Some('#') => {
                    self.skip_comment();
                    self.skip_line_break();
                }
                Some('\n') | Some('\r') => self.skip_line_break(),
                Some(_) => {
                    let current = *self.indent_stack.last().unwrap_or(&0);
                    if width > current {
                        self.indent_stack.push(width);
                        self.tokens.push(Token::new(
                            TokenKind::Indent,
                            self.make_span(line_start, self.position),
                        ));
                    } else if width < current {
                        while width < *self.indent_stack.last().unwrap_or(&0) {
                            self.indent_stack.pop();
                            self.tokens.push(Token::new(
                                TokenKind::Dedent,
                                self.make_span(self.position, self.position),
                            ));
                        }
                        if width != *self.indent_stack.last().unwrap_or(&0) {
                            return Err(Error::InconsistentDedent {
                                span: self.make_span(line_start, self.position),
                            });
                        }
                    }
                    self.at_line_start = false;
                    return Ok(true);
                }
            }
        }
    }

    fn skip_line_break(&mut self) {
        if self.current_char() == Some('\r') {
            self.advance();
        }
        if self.current_char() == Some('\n') {
            self.advance();
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.current_char() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_inline_whitespace(&mut self) -> Result<()> {
        loop {
            match self.current_char() {
                Some(' ') | Some('\t') | Some('\x0c') => self.advance(),
                Some('\\') => {
                    let start = self.position;
                    self.advance();
                    match self.current_char() {
                        Some('\n') => self.advance(),
                        Some('\r') => self.skip_line_break(),
                        _ => {
                            return Err(Error::lexer(
                                "unexpected character after line continuation character",
                                self.make_span(start, self.position),
                            ))
                        }
                    }
                }
                Some('\n') | Some('\r') if self.paren_depth > 0 => self.advance(),
                Some('#') if self.paren_depth > 0 => self.skip_comment(),
                _ => return Ok(()),
            }
        }
    }

    fn lex_token(&mut self) -> Result<()> {
        let start = self.position;
        let Some(c) = self.current_char() else {
            return Ok(());
        };

        if c.is_ascii_digit() || (c == '.' && self.peek_char(1).map_or(false, |n| n.is_ascii_digit())) {
            return self.lex_number(start);
        }

        if c == '"' || c == '\'' {
            return self.lex_string(start, "");
        }

        if c.is_alphabetic() || c == '_' {
            return self.lex_name(start);
        }

        self.lex_operator(start, c)
    }

    fn lex_name(&mut self, start: usize) -> Result<()> {
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.source[start..self.position];

        if matches!(self.current_char(), Some('"') | Some('\'')) && is_string_prefix(text) {
            let prefix = text.to_ascii_lowercase();
            return self.lex_string(start, &prefix);
        }

        let kind = keyword_to_token(text).unwrap_or_else(|| TokenKind::Name(text.to_string()));
        self.push(kind, start);
        Ok(())
    }

    fn lex_number(&mut self, start: usize) -> Result<()> {
        let radix_prefix = self.current_char() == Some('0')
            && matches!(self.peek_char(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));
        if radix_prefix {
            self.advance();
            self.advance();
            while let Some(c) = self.current_char() {
                if c.is_ascii_hexdigit() || c == '_' {
                    self.advance();
                } else {
                    break;
                }
            }
            let text = self.source[start..self.position].to_string();
            self.push(TokenKind::Int(text), start);
            return Ok(());
        }

        let mut is_float = false;
        self.eat_digits();
        if self.current_char() == Some('.') {
            is_float = true;
            self.advance();
            self.eat_digits();
        }
        if matches!(self.current_char(), Some('e' | 'E')) {
            let sign = matches!(self.peek_char(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_char(digit_at).map_or(false, |c| c.is_ascii_digit()) {
                is_float = true;
                for _ in 0..digit_at {
                    self.advance();
                }
                self.eat_digits();
            }
        }
        if matches!(self.current_char(), Some('j' | 'J')) {
            is_float = true;
            self.advance();
        }

        let text = self.source[start..self.position].to_string();
        let kind = if is_float {
            TokenKind::Float(text)
        } else {
            TokenKind::Int(text)
        };
        self.push(kind, start);
        Ok(())
    }

    fn eat_digits(&mut self) {
        while let Some(c) = self.current_char() {
            if c.is_ascii_digit() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self, start: usize, prefix: &str) -> Result<()> {
        let raw = prefix.contains('r');
        let is_bytes = prefix.contains('b');
        let Some(quote) = self.current_char() else {
            return Ok(());
        };
        let triple = self.peek_char(1) == Some(quote) && self.peek_char(2) == Some(quote);
        let quote_len = if triple { 3 } else { 1 };
        for _ in 0..quote_len {
            self.advance();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.current_char() else {
                return Err(Error::lexer(
                    "unterminated string literal",
                    self.make_span(start, self.position),
                ));
            };

            if c == quote {
                if !triple {
                    self.advance();
                    break;
                }
                if self.peek_char(1) == Some(quote) && self.peek_char(2) == Some(quote) {
                    for _ in 0..3 {
                        self.advance();
                    }
                    break;
                }
                value.push(c);
                self.advance();
                continue;
            }

            if c == '\n' && !triple {
                return Err(Error::lexer(
                    "unterminated string literal",
                    self.make_span(start, self.position),
                ));
            }

            if c == '\\' {
                self.advance();
                let Some(escaped) = self.current_char() else {
                    continue;
                };
                if raw {
                    value.push('\\');
                    value.push(escaped);
                } else {
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\n' => {}
                        '\\' | '\'' | '"' => value.push(escaped),
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                self.advance();
                continue;
            }

            value.push(c);
            self.advance();
        }

        let kind = if is_bytes {
            TokenKind::Bytes(value)
        } else {
            TokenKind::Str(value)
        };
        self.push(kind, start);
        Ok(())
    }

    fn lex_operator(&mut self, start: usize, c: char) -> Result<()> {
        const AUG_OPS: [&str; 13] = [
            "**", "//", ">>", "<<", "+", "-", "*", "/", "%", "@", "&", "|", "^",
        ];

        let rest = &self.source[self.position..];
        for op in AUG_OPS {
            if rest.starts_with(op) && rest[op.len()..].starts_with('=') {
                for _ in 0..=op.len() {
                    self.advance();
                }
                self.push(TokenKind::AugAssign(op.to_string()), start);
                return Ok(());
            }
        }

        let (kind, len) = if rest.starts_with("...") {
            (TokenKind::Ellipsis, 3)
        } else if rest.starts_with("->") {
            (TokenKind::Arrow, 2)
        } else if rest.starts_with("**") {
            (TokenKind::DoubleStar, 2)
        } else if rest.starts_with("//") {
            (TokenKind::DoubleSlash, 2)
        } else if rest.starts_with("<<") {
            (TokenKind::LeftShift, 2)
        } else if rest.starts_with(">>") {
            (TokenKind::RightShift, 2)
        } else if rest.starts_with("<=") {
            (TokenKind::LessEq, 2)
        } else if rest.starts_with(">=") {
            (TokenKind::GreaterEq, 2)
        } else if rest.starts_with("==") {
            (TokenKind::EqEq, 2)
        } else if rest.starts_with("!=") {
            (TokenKind::NotEq, 2)
        } else {
            let kind = match c {
                '(' => TokenKind::LeftParen,
                ')' => TokenKind::RightParen,
                '[' => TokenKind::LeftBracket,
                ']' => TokenKind::RightBracket,
                '{' => TokenKind::LeftBrace,
                '}' => TokenKind::RightBrace,
                ',' => TokenKind::Comma,
                ':' => TokenKind::Colon,
                '.' => TokenKind::Dot,
                ';' => TokenKind::Semicolon,
                '=' => TokenKind::Assign,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '%' => TokenKind::Percent,
                '@' => TokenKind::At,
                '|' => TokenKind::Pipe,
                '&' => TokenKind::Amp,
                '^' => TokenKind::Caret,
                '~' => TokenKind::Tilde,
                '<' => TokenKind::Less,
                '>' => TokenKind::Greater,
                other => {
                    self.advance();
                    return Err(Error::lexer(
                        format!("invalid character '{}' in source", other),
                        self.make_span(start, self.position),
                    ));
                }
            };
            (kind, 1)
        };

        match kind {
            TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => {
                self.paren_depth += 1
            }
            TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                self.paren_depth = self.paren_depth.saturating_sub(1)
            }
            _ => {}
        }

        for _ in 0..len {
            self.advance();
        }
        self.push(kind, start);
        Ok(())
    }
}

fn is_string_prefix(text: &str) -> bool {
    matches!(
        text.to_ascii_lowercase().as_str(),
        "r" | "b" | "u" | "f" | "rb" | "br" | "fr" | "rf"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, FileId::new(0))
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            kinds("x = 42\n"),
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Assign,
                TokenKind::Int("42".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indentation() {
        let tokens = kinds("if x:\n    pass\n\n  # comment\ny\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::If,
                TokenKind::Name("x".into()),
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Pass,
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Name("y".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_implicit_line_joining() {
        let tokens = kinds("f(1,\n  2)\n");
        assert!(!tokens[..tokens.len() - 2].contains(&TokenKind::Newline));
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_dedent_at_eof() {
        let tokens = kinds("def f():\n    return 1");
        assert_eq!(&tokens[tokens.len() - 3..], &[TokenKind::Newline, TokenKind::Dedent, TokenKind::Eof]);
    }

    #[test]
    fn test_operators_and_numbers() {
        assert_eq!(
            kinds("a **= 1.5e3 -> ... != 0x1F"),
            vec![
                TokenKind::Name("a".into()),
                TokenKind::AugAssign("**".into()),
                TokenKind::Float("1.5e3".into()),
                TokenKind::Arrow,
                TokenKind::Ellipsis,
                TokenKind::NotEq,
                TokenKind::Int("0x1F".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#"s = b'ab' + """x"y""" + r'\n'"#)[2..7].to_vec(),
            vec![
                TokenKind::Bytes("ab".into()),
                TokenKind::Plus,
                TokenKind::Str("x\"y".into()),
                TokenKind::Plus,
                TokenKind::Str("\\n".into()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("x = 'abc\n", FileId::new(0)).tokenize().unwrap_err();
        assert_eq!(err.to_string(), "unterminated string literal");
    }

    #[test]
    fn test_inconsistent_dedent() {
        let err = Lexer::new("if x:\n    a\n  b\n", FileId::new(0)).tokenize().unwrap_err();
        assert!(matches!(err, Error::InconsistentDedent { .. }));
    }
}
