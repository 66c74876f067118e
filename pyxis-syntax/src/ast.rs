//! Syntax tree definitions
//!
//! The tree is a closed set of tagged node variants. Every consumer walks it
//! with `match`, so adding a node kind is a compile error everywhere it is
//! not yet handled.

use crate::span::{HasSpan, Span};
use serde::{Deserialize, Serialize};

/// A parsed source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleAst {
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl ModuleAst {
    /// All modules this file imports, in source order, including imports
    /// nested inside function and class bodies
    pub fn imports(&self) -> Vec<ImportRef> {
        let mut refs = Vec::new();
        collect_imports(&self.body, &mut refs);
        refs
    }
}

/// One import target mentioned by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRef {
    /// Dotted module name as written (without leading dots)
    pub module: String,
    /// Number of leading dots for relative imports
    pub level: u32,
    /// Names imported with `from module import a, b`; these may be submodules
    pub from_names: Vec<String>,
    pub span: Span,
}

/// Absolute name of a possibly relative import target
///
/// A package's `__init__` module counts as the package itself when
/// counting leading dots. Returns `None` when the dots climb past the top
/// level.
pub fn absolute_module(importer: &str, is_package: bool, level: u32, module: &str) -> Option<String> {
    if level == 0 {
        return Some(module.to_string());
    }
    let mut parts: Vec<&str> = importer.split('.').collect();
    let climb = if is_package { level - 1 } else { level } as usize;
    parts.truncate(parts.len().saturating_sub(climb));
    if parts.is_empty() {
        return None;
    }
    let base = parts.join(".");
    Some(if module.is_empty() {
        base
    } else {
        format!("{}.{}", base, module)
    })
}

fn collect_imports(body: &[Stmt], refs: &mut Vec<ImportRef>) {
    for stmt in body {
        match stmt {
            Stmt::Import(import) => {
                for alias in &import.names {
                    refs.push(ImportRef {
                        module: alias.name.clone(),
                        level: 0,
                        from_names: Vec::new(),
                        span: alias.span,
                    });
                }
            }
            Stmt::ImportFrom(import) => refs.push(ImportRef {
                module: import.module.clone(),
                level: import.level,
                from_names: import.names.iter().map(|a| a.name.clone()).collect(),
                span: import.span,
            }),
            Stmt::FunctionDef(def) => collect_imports(&def.body, refs),
            Stmt::ClassDef(def) => collect_imports(&def.body, refs),
            Stmt::If(stmt) => {
                collect_imports(&stmt.body, refs);
                collect_imports(&stmt.orelse, refs);
            }
            Stmt::While(stmt) => {
                collect_imports(&stmt.body, refs);
                collect_imports(&stmt.orelse, refs);
            }
            Stmt::For(stmt) => {
                collect_imports(&stmt.body, refs);
                collect_imports(&stmt.orelse, refs);
            }
            _ => {}
        }
    }
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Import(ImportStmt),
    ImportFrom(ImportFromStmt),
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Assign {
        targets: Vec<Expr>,
        value: Expr,
        span: Span,
    },
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
        span: Span,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    Raise {
        exc: Option<Expr>,
        span: Span,
    },
    Assert {
        test: Expr,
        msg: Option<Expr>,
        span: Span,
    },
    Global {
        names: Vec<String>,
        span: Span,
    },
    Expr {
        value: Expr,
        span: Span,
    },
    Pass(Span),
    Break(Span),
    Continue(Span),
}

/// `import a.b as c, d`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportStmt {
    pub names: Vec<ImportAlias>,
    pub span: Span,
}

/// `from ..m import x as y` or `from m import *`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportFromStmt {
    pub module: String,
    pub level: u32,
    pub names: Vec<ImportAlias>,
    pub is_star: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportAlias {
    pub name: String,
    pub asname: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub name_span: Span,
    pub params: Vec<Param>,
    pub returns: Option<Expr>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    /// Ordinary positional-or-keyword parameter
    Positional,
    /// `*args`
    VarArgs,
    /// Parameter after `*` or `*args`
    KeywordOnly,
    /// `**kwargs`
    KwArgs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
    pub kind: ParamKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub name_span: Span,
    pub bases: Vec<Expr>,
    pub keywords: Vec<Keyword>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    pub test: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileStmt {
    pub test: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStmt {
    pub target: Expr,
    pub iter: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
    pub span: Span,
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Name {
        id: String,
        span: Span,
    },
    Int {
        text: String,
        span: Span,
    },
    Float {
        text: String,
        span: Span,
    },
    Str {
        value: String,
        span: Span,
    },
    Bytes {
        value: String,
        span: Span,
    },
    Bool {
        value: bool,
        span: Span,
    },
    NoneLit(Span),
    Ellipsis(Span),
    Attribute {
        value: Box<Expr>,
        attr: String,
        span: Span,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
        span: Span,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Arg>,
        span: Span,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
        span: Span,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
        span: Span,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
        span: Span,
    },
    List {
        elts: Vec<Expr>,
        span: Span,
    },
    Tuple {
        elts: Vec<Expr>,
        span: Span,
    },
    Set {
        elts: Vec<Expr>,
        span: Span,
    },
    Dict {
        items: Vec<(Expr, Expr)>,
        span: Span,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgKind {
    Positional,
    Keyword,
    Star,
    DoubleStar,
}

/// A call argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub kind: ArgKind,
    /// Keyword name for `ArgKind::Keyword`
    pub name: Option<String>,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mult => "*",
            BinOp::MatMult => "@",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::LShift => "<<",
            BinOp::RShift => ">>",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
        }
    }

    /// Dunder method implementing the operator, e.g. `__add__`
    pub fn method(self) -> &'static str {
        match self {
            BinOp::Add => "__add__",
            BinOp::Sub => "__sub__",
            BinOp::Mult => "__mul__",
            BinOp::MatMult => "__matmul__",
            BinOp::Div => "__truediv__",
            BinOp::FloorDiv => "__floordiv__",
            BinOp::Mod => "__mod__",
            BinOp::Pow => "__pow__",
            BinOp::LShift => "__lshift__",
            BinOp::RShift => "__rshift__",
            BinOp::BitOr => "__or__",
            BinOp::BitXor => "__xor__",
            BinOp::BitAnd => "__and__",
        }
    }

    /// Reflected dunder method, e.g. `__radd__`
    pub fn reflected_method(self) -> String {
        format!("__r{}", &self.method()[2..])
    }

    pub fn from_symbol(symbol: &str) -> Option<BinOp> {
        let op = match symbol {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mult,
            "@" => BinOp::MatMult,
            "/" => BinOp::Div,
            "//" => BinOp::FloorDiv,
            "%" => BinOp::Mod,
            "**" => BinOp::Pow,
            "<<" => BinOp::LShift,
            ">>" => BinOp::RShift,
            "|" => BinOp::BitOr,
            "^" => BinOp::BitXor,
            "&" => BinOp::BitAnd,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    Invert,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
        }
    }

    pub fn method(self) -> Option<&'static str> {
        match self {
            UnaryOp::Not => None,
            UnaryOp::Neg => Some("__neg__"),
            UnaryOp::Pos => Some("__pos__"),
            UnaryOp::Invert => Some("__invert__"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }

    /// Rich comparison method, for the operators that have one
    pub fn method(self) -> Option<&'static str> {
        match self {
            CmpOp::Lt => Some("__lt__"),
            CmpOp::LtE => Some("__le__"),
            CmpOp::Gt => Some("__gt__"),
            CmpOp::GtE => Some("__ge__"),
            _ => None,
        }
    }
}

impl HasSpan for Expr {
    fn span(&self) -> Span {
        match self {
            Expr::Name { span, .. }
            | Expr::Int { span, .. }
            | Expr::Float { span, .. }
            | Expr::Str { span, .. }
            | Expr::Bytes { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Attribute { span, .. }
            | Expr::Subscript { span, .. }
            | Expr::Slice { span, .. }
            | Expr::Call { span, .. }
            | Expr::BinOp { span, .. }
            | Expr::UnaryOp { span, .. }
            | Expr::BoolOp { span, .. }
            | Expr::Compare { span, .. }
            | Expr::IfExp { span, .. }
            | Expr::List { span, .. }
            | Expr::Tuple { span, .. }
            | Expr::Set { span, .. }
            | Expr::Dict { span, .. }
            | Expr::Lambda { span, .. } => *span,
            Expr::NoneLit(span) | Expr::Ellipsis(span) => *span,
        }
    }
}

impl HasSpan for Stmt {
    fn span(&self) -> Span {
        match self {
            Stmt::Import(s) => s.span,
            Stmt::ImportFrom(s) => s.span,
            Stmt::FunctionDef(s) => s.span,
            Stmt::ClassDef(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::Assign { span, .. }
            | Stmt::AnnAssign { span, .. }
            | Stmt::AugAssign { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Raise { span, .. }
            | Stmt::Assert { span, .. }
            | Stmt::Global { span, .. }
            | Stmt::Expr { span, .. } => *span,
            Stmt::Pass(span) | Stmt::Break(span) | Stmt::Continue(span) => *span,
        }
    }
}

impl Expr {
    /// Direct subexpressions in source order
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Name { .. }
            | Expr::Int { .. }
            | Expr::Float { .. }
            | Expr::Str { .. }
            | Expr::Bytes { .. }
            | Expr::Bool { .. }
            | Expr::NoneLit(_)
            | Expr::Ellipsis(_) => Vec::new(),
            Expr::Attribute { value, .. } => vec![value.as_ref()],
            Expr::Subscript { value, index, .. } => vec![value.as_ref(), index.as_ref()],
            Expr::Slice { lower, upper, step, .. } => [lower, upper, step]
                .into_iter()
                .flatten()
                .map(|e| e.as_ref())
                .collect(),
            Expr::Call { func, args, .. } => {
                let mut children = vec![func.as_ref()];
                children.extend(args.iter().map(|a| &a.value));
                children
            }
            Expr::BinOp { left, right, .. } | Expr::BoolOp { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            Expr::UnaryOp { operand, .. } => vec![operand.as_ref()],
            Expr::Compare { left, comparators, .. } => {
                let mut children = vec![left.as_ref()];
                children.extend(comparators.iter());
                children
            }
            Expr::IfExp { test, body, orelse, .. } => vec![body.as_ref(), test.as_ref(), orelse.as_ref()],
            Expr::List { elts, .. } | Expr::Tuple { elts, .. } | Expr::Set { elts, .. } => elts.iter().collect(),
            Expr::Dict { items, .. } => items.iter().flat_map(|(k, v)| [k, v]).collect(),
            Expr::Lambda { params, body, .. } => {
                let mut children: Vec<&Expr> = params.iter().filter_map(|p| p.default.as_ref()).collect();
                children.push(body.as_ref());
                children
            }
        }
    }

    /// Dotted name for `a.b.c` chains of names and attributes
    pub fn dotted_name(&self) -> Option<String> {
        match self {
            Expr::Name { id, .. } => Some(id.clone()),
            Expr::Attribute { value, attr, .. } => {
                value.dotted_name().map(|base| format!("{}.{}", base, attr))
            }
            _ => None,
        }
    }
}
