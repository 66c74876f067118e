//! Token definitions

use crate::span::Span;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals and names
    Name(String),
    Int(String),
    Float(String),
    Str(String),
    Bytes(String),

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,

    // Keywords
    Def,
    Class,
    Return,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Not,
    And,
    Or,
    Is,
    Import,
    From,
    As,
    Pass,
    Break,
    Continue,
    Raise,
    Assert,
    Global,
    Lambda,
    True,
    False,
    None,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,
    Arrow,
    Ellipsis,
    Assign,
    /// `+=`, `-=`, ... carrying the operator text without `=`
    AugAssign(String),

    // Operators
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    At,
    Pipe,
    Amp,
    Caret,
    Tilde,
    LeftShift,
    RightShift,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    EqEq,
    NotEq,
}

/// Map an identifier to its keyword token, if it is one
pub fn keyword_to_token(name: &str) -> Option<TokenKind> {
    let kind = match name {
        "def" => TokenKind::Def,
        "class" => TokenKind::Class,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "not" => TokenKind::Not,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "is" => TokenKind::Is,
        "import" => TokenKind::Import,
        "from" => TokenKind::From,
        "as" => TokenKind::As,
        "pass" => TokenKind::Pass,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "raise" => TokenKind::Raise,
        "assert" => TokenKind::Assert,
        "global" => TokenKind::Global,
        "lambda" => TokenKind::Lambda,
        "True" => TokenKind::True,
        "False" => TokenKind::False,
        "None" => TokenKind::None,
        _ => return None,
    };
    Some(kind)
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Name(name) => write!(f, "name '{}'", name),
            TokenKind::Int(text) | TokenKind::Float(text) => write!(f, "number {}", text),
            TokenKind::Str(_) | TokenKind::Bytes(_) => write!(f, "string literal"),
            TokenKind::Newline => write!(f, "newline"),
            TokenKind::Indent => write!(f, "indent"),
            TokenKind::Dedent => write!(f, "dedent"),
            TokenKind::Eof => write!(f, "end of file"),
            TokenKind::AugAssign(op) => write!(f, "'{}='", op),
            other => write!(f, "'{}'", other.text()),
        }
    }
}

impl TokenKind {
    fn text(&self) -> &'static str {
        match self {
            TokenKind::Def => "def",
            TokenKind::Class => "class",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::For => "for",
            TokenKind::In => "in",
            TokenKind::Not => "not",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Is => "is",
            TokenKind::Import => "import",
            TokenKind::From => "from",
            TokenKind::As => "as",
            TokenKind::Pass => "pass",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Raise => "raise",
            TokenKind::Assert => "assert",
            TokenKind::Global => "global",
            TokenKind::Lambda => "lambda",
            TokenKind::True => "True",
            TokenKind::False => "False",
            TokenKind::None => "None",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Semicolon => ";",
            TokenKind::Arrow => "->",
            TokenKind::Ellipsis => "...",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::DoubleStar => "**",
            TokenKind::Slash => "/",
            TokenKind::DoubleSlash => "//",
            TokenKind::Percent => "%",
            TokenKind::At => "@",
            TokenKind::Pipe => "|",
            TokenKind::Amp => "&",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::LeftShift => "<<",
            TokenKind::RightShift => ">>",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::LessEq => "<=",
            TokenKind::GreaterEq => ">=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            _ => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }
}
