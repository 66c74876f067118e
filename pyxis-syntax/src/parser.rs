//! Parser
//!
//! Recursive descent over the token stream produced by [`Lexer`], with
//! precedence climbing expressed as one method per precedence level.

use crate::{
    ast::*,
    error::{ParseError as Error, Result},
    lexer::Lexer,
    span::{FileId, HasSpan, Span},
    token::{Token, TokenKind},
};

/// Parser state
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    file_id: FileId,
}

impl Parser {
    /// Create a new parser from source code
    pub fn new(input: &str, file_id: FileId) -> Result<Self> {
        let tokens = Lexer::new(input, file_id).tokenize()?;
        Ok(Parser {
            tokens,
            current: 0,
            file_id,
        })
    }

    /// Parse a complete module
    pub fn parse(&mut self) -> Result<ModuleAst> {
        let start = self.current_span();
        let mut body = Vec::new();
        while !self.is_at_end() {
            if self.match_token(&TokenKind::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        let end = self.current_span();
        Ok(ModuleAst {
            body,
            span: Span::new(self.file_id, start.start, end.end),
        })
    }

    /// Parse a single expression (public for testing)
    pub fn parse_expression_public(&mut self) -> Result<Expr> {
        self.parse_expression()
    }

    // ------------------------------------------------------------------
    // Token helpers

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.current.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        &self.tokens[(self.current + n).min(self.tokens.len() - 1)].kind
    }

    fn current_span(&self) -> Span {
        self.tokens[self.current.min(self.tokens.len() - 1)].span
    }

    fn previous_span(&self) -> Span {
        if self.current == 0 {
            self.current_span()
        } else {
            self.tokens[self.current - 1].span
        }
    }

    fn span_from(&self, start: Span) -> Span {
        start.merge(self.previous_span())
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.current.min(self.tokens.len() - 1)].clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error_expected(expected))
        }
    }

    fn error_expected(&self, expected: &str) -> Error {
        let span = self.current_span();
        match self.peek() {
            TokenKind::Eof => Error::unexpected_eof(expected, span),
            TokenKind::Newline if self.peek_at(1) == &TokenKind::Eof => {
                Error::unexpected_eof(expected, span)
            }
            found => Error::unexpected_token(expected, found.to_string(), span),
        }
    }

    fn expect_name(&mut self) -> Result<(String, Span)> {
        match self.peek().clone() {
            TokenKind::Name(name) => {
                let token = self.advance();
                Ok((name, token.span))
            }
            _ => Err(self.error_expected("identifier")),
        }
    }

    // ------------------------------------------------------------------
    // Statements

    fn parse_statement(&mut self) -> Result<Vec<Stmt>> {
        match self.peek() {
            TokenKind::Def => Ok(vec![self.parse_function_def(Vec::new())?]),
            TokenKind::Class => Ok(vec![self.parse_class_def(Vec::new())?]),
            TokenKind::At => Ok(vec![self.parse_decorated()?]),
            TokenKind::If => Ok(vec![self.parse_if()?]),
            TokenKind::While => Ok(vec![self.parse_while()?]),
            TokenKind::For => Ok(vec![self.parse_for()?]),
            TokenKind::Indent => Err(Error::syntax("unexpected indent", self.current_span())),
            _ => self.parse_simple_statements(),
        }
    }

    /// `small_stmt (';' small_stmt)* [';'] NEWLINE`
    fn parse_simple_statements(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = vec![self.parse_small_statement()?];
        while self.match_token(&TokenKind::Semicolon) {
            if self.check(&TokenKind::Newline) || self.is_at_end() {
                break;
            }
            stmts.push(self.parse_small_statement()?);
        }
        if !self.is_at_end() {
            self.expect(TokenKind::Newline, "newline")?;
        }
        Ok(stmts)
    }

    fn parse_small_statement(&mut self) -> Result<Stmt> {
        let start = self.current_span();
        match self.peek() {
            TokenKind::Pass => {
                self.advance();
                Ok(Stmt::Pass(start))
            }
            TokenKind::Break => {
                self.advance();
                Ok(Stmt::Break(start))
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Stmt::Continue(start))
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_testlist()?)
                };
                Ok(Stmt::Return {
                    value,
                    span: self.span_from(start),
                })
            }
            TokenKind::Raise => {
                self.advance();
                let exc = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                if self.match_token(&TokenKind::From) {
                    self.parse_expression()?;
                }
                Ok(Stmt::Raise {
                    exc,
                    span: self.span_from(start),
                })
            }
            TokenKind::Assert => {
                self.advance();
                let test = self.parse_expression()?;
                let msg = if self.match_token(&TokenKind::Comma) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                Ok(Stmt::Assert {
                    test,
                    msg,
                    span: self.span_from(start),
                })
            }
            TokenKind::Global => {
                self.advance();
                let mut names = vec![self.expect_name()?.0];
                while self.match_token(&TokenKind::Comma) {
                    names.push(self.expect_name()?.0);
                }
                Ok(Stmt::Global {
                    names,
                    span: self.span_from(start),
                })
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::From => self.parse_import_from(),
            _ => self.parse_expression_statement(),
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
        )
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt> {
        let start = self.current_span();
        let first = self.parse_testlist()?;

        match self.peek().clone() {
            TokenKind::Colon => {
                self.advance();
                let annotation = self.parse_expression()?;
                let value = if self.match_token(&TokenKind::Assign) {
                    Some(self.parse_testlist()?)
                } else {
                    None
                };
                self.check_target(&first)?;
                Ok(Stmt::AnnAssign {
                    target: first,
                    annotation,
                    value,
                    span: self.span_from(start),
                })
            }
            TokenKind::Assign => {
                let mut exprs = vec![first];
                while self.match_token(&TokenKind::Assign) {
                    exprs.push(self.parse_testlist()?);
                }
                let value = exprs.pop().ok_or_else(|| self.error_expected("expression"))?;
                for target in &exprs {
                    self.check_target(target)?;
                }
                Ok(Stmt::Assign {
                    targets: exprs,
                    value,
                    span: self.span_from(start),
                })
            }
            TokenKind::AugAssign(op) => {
                self.advance();
                let op = BinOp::from_symbol(&op)
                    .ok_or_else(|| Error::syntax("invalid augmented assignment", start))?;
                let value = self.parse_testlist()?;
                self.check_target(&first)?;
                Ok(Stmt::AugAssign {
                    target: first,
                    op,
                    value,
                    span: self.span_from(start),
                })
            }
            _ => Ok(Stmt::Expr {
                value: first,
                span: self.span_from(start),
            }),
        }
    }

    fn check_target(&self, target: &Expr) -> Result<()> {
        match target {
            Expr::Name { .. } | Expr::Attribute { .. } | Expr::Subscript { .. } => Ok(()),
            Expr::Tuple { elts, .. } | Expr::List { elts, .. } => {
                for elt in elts {
                    self.check_target(elt)?;
                }
                Ok(())
            }
            other => Err(Error::syntax("cannot assign to expression", other.span())),
        }
    }

    fn parse_dotted_name(&mut self) -> Result<String> {
        let mut name = self.expect_name()?.0;
        while self.check(&TokenKind::Dot) {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_name()?.0);
        }
        Ok(name)
    }

    fn parse_import(&mut self) -> Result<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Import, "'import'")?;
        let mut names = Vec::new();
        loop {
            let alias_start = self.current_span();
            let name = self.parse_dotted_name()?;
            let asname = if self.match_token(&TokenKind::As) {
                Some(self.expect_name()?.0)
            } else {
                None
            };
            names.push(ImportAlias {
                name,
                asname,
                span: self.span_from(alias_start),
            });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Stmt::Import(ImportStmt {
            names,
            span: self.span_from(start),
        }))
    }

    fn parse_import_from(&mut self) -> Result<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::From, "'from'")?;

        let mut level = 0;
        loop {
            match self.peek() {
                TokenKind::Dot => level += 1,
                TokenKind::Ellipsis => level += 3,
                _ => break,
            }
            self.advance();
        }

        let module = if matches!(self.peek(), TokenKind::Name(_)) {
            self.parse_dotted_name()?
        } else if level == 0 {
            return Err(self.error_expected("module name"));
        } else {
            String::new()
        };

        self.expect(TokenKind::Import, "'import'")?;

        let mut names = Vec::new();
        let mut is_star = false;
        if self.match_token(&TokenKind::Star) {
            is_star = true;
        } else {
            let parenthesized = self.match_token(&TokenKind::LeftParen);
            loop {
                let alias_start = self.current_span();
                let (name, _) = self.expect_name()?;
                let asname = if self.match_token(&TokenKind::As) {
                    Some(self.expect_name()?.0)
                } else {
                    None
                };
                names.push(ImportAlias {
                    name,
                    asname,
                    span: self.span_from(alias_start),
                });
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
                if parenthesized && self.check(&TokenKind::RightParen) {
                    break;
                }
            }
            if parenthesized {
                self.expect(TokenKind::RightParen, "')'")?;
            }
        }

        Ok(Stmt::ImportFrom(ImportFromStmt {
            module,
            level,
            names,
            is_star,
            span: self.span_from(start),
        }))
    }

    fn parse_decorated(&mut self) -> Result<Stmt> {
        let mut decorators = Vec::new();
        while self.match_token(&TokenKind::At) {
            decorators.push(self.parse_expression()?);
            self.expect(TokenKind::Newline, "newline")?;
        }
        match self.peek() {
            TokenKind::Def => self.parse_function_def(decorators),
            TokenKind::Class => self.parse_class_def(decorators),
            _ => Err(self.error_expected("'def' or 'class' after decorator")),
        }
    }

    fn parse_function_def(&mut self, decorators: Vec<Expr>) -> Result<Stmt> {
        let start = decorators.first().map(|d| d.span()).unwrap_or_else(|| self.current_span());
        self.expect(TokenKind::Def, "'def'")?;
        let (name, name_span) = self.expect_name()?;
        self.expect(TokenKind::LeftParen, "'('")?;
        let params = self.parse_parameters(&TokenKind::RightParen, true)?;
        self.expect(TokenKind::RightParen, "')'")?;
        let returns = if self.match_token(&TokenKind::Arrow) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block()?;
        Ok(Stmt::FunctionDef(FunctionDef {
            name,
            name_span,
            params,
            returns,
            body,
            decorators,
            span: self.span_from(start),
        }))
    }

    /// Parameter list up to (not including) `close`
    fn parse_parameters(&mut self, close: &TokenKind, annotations: bool) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        let mut keyword_only = false;

        while !self.check(close) {
            let start = self.current_span();
            if self.match_token(&TokenKind::Slash) {
                // positional-only marker
            } else if self.match_token(&TokenKind::DoubleStar) {
                let (name, _) = self.expect_name()?;
                let annotation = self.parse_param_annotation(annotations)?;
                params.push(Param {
                    name,
                    annotation,
                    default: None,
                    kind: ParamKind::KwArgs,
                    span: self.span_from(start),
                });
            } else if self.match_token(&TokenKind::Star) {
                keyword_only = true;
                if matches!(self.peek(), TokenKind::Name(_)) {
                    let (name, _) = self.expect_name()?;
                    let annotation = self.parse_param_annotation(annotations)?;
                    params.push(Param {
                        name,
                        annotation,
                        default: None,
                        kind: ParamKind::VarArgs,
                        span: self.span_from(start),
                    });
                }
            } else {
                let (name, _) = self.expect_name()?;
                let annotation = self.parse_param_annotation(annotations)?;
                let default = if self.match_token(&TokenKind::Assign) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                params.push(Param {
                    name,
                    annotation,
                    default,
                    kind: if keyword_only {
                        ParamKind::KeywordOnly
                    } else {
                        ParamKind::Positional
                    },
                    span: self.span_from(start),
                });
            }

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(params)
    }

    fn parse_param_annotation(&mut self, annotations: bool) -> Result<Option<Expr>> {
        if annotations && self.match_token(&TokenKind::Colon) {
            Ok(Some(self.parse_expression()?))
        } else {
            Ok(None)
        }
    }

    fn parse_class_def(&mut self, decorators: Vec<Expr>) -> Result<Stmt> {
        let start = decorators.first().map(|d| d.span()).unwrap_or_else(|| self.current_span());
        self.expect(TokenKind::Class, "'class'")?;
        let (name, name_span) = self.expect_name()?;

        let mut bases = Vec::new();
        let mut keywords = Vec::new();
        if self.match_token(&TokenKind::LeftParen) {
            for arg in self.parse_call_arguments()? {
                match (arg.kind, arg.name) {
                    (ArgKind::Keyword, Some(name)) => keywords.push(Keyword {
                        name,
                        value: arg.value,
                        span: arg.span,
                    }),
                    (ArgKind::Positional, _) => bases.push(arg.value),
                    _ => return Err(Error::syntax("invalid class base", arg.span)),
                }
            }
            self.expect(TokenKind::RightParen, "')'")?;
        }

        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block()?;
        Ok(Stmt::ClassDef(ClassDef {
            name,
            name_span,
            bases,
            keywords,
            body,
            decorators,
            span: self.span_from(start),
        }))
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let start = self.current_span();
        self.advance(); // `if` or `elif`
        let test = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block()?;
        let orelse = if self.check(&TokenKind::Elif) {
            vec![self.parse_if()?]
        } else if self.match_token(&TokenKind::Else) {
            self.expect(TokenKind::Colon, "':'")?;
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If(IfStmt {
            test,
            body,
            orelse,
            span: self.span_from(start),
        }))
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::While, "'while'")?;
        let test = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::While(WhileStmt {
            test,
            body,
            orelse,
            span: self.span_from(start),
        }))
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::For, "'for'")?;
        let target = self.parse_target_list()?;
        self.check_target(&target)?;
        self.expect(TokenKind::In, "'in'")?;
        let iter = self.parse_testlist()?;
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::For(ForStmt {
            target,
            iter,
            body,
            orelse,
            span: self.span_from(start),
        }))
    }

    fn parse_else_block(&mut self) -> Result<Vec<Stmt>> {
        if self.match_token(&TokenKind::Else) {
            self.expect(TokenKind::Colon, "':'")?;
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    /// Targets of a `for` loop stop before `in`, so they are parsed below the
    /// comparison level
    fn parse_target_list(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let first = self.parse_bitor()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.check(&TokenKind::In) {
                break;
            }
            elts.push(self.parse_bitor()?);
        }
        Ok(Expr::Tuple {
            elts,
            span: self.span_from(start),
        })
    }

    /// Body of a compound statement: an indented block or simple statements
    /// on the same line
    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        if !self.match_token(&TokenKind::Newline) {
            return self.parse_simple_statements();
        }
        while self.match_token(&TokenKind::Newline) {}
        self.expect(TokenKind::Indent, "an indented block")?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::Dedent) && !self.is_at_end() {
            if self.match_token(&TokenKind::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        self.match_token(&TokenKind::Dedent);
        Ok(body)
    }

    // ------------------------------------------------------------------
    // Expressions

    /// `expr (',' expr)* [',']`, producing a tuple when a comma is present
    fn parse_testlist(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let first = self.parse_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.starts_expression() {
                elts.push(self.parse_expression()?);
            } else {
                break;
            }
        }
        Ok(Expr::Tuple {
            elts,
            span: self.span_from(start),
        })
    }

    fn starts_expression(&self) -> bool {
        !matches!(
            self.peek(),
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Assign
                | TokenKind::Colon
                | TokenKind::Semicolon
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::RightBrace
                | TokenKind::AugAssign(_)
                | TokenKind::Dedent
                | TokenKind::Indent
        )
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        if self.check(&TokenKind::Lambda) {
            return self.parse_lambda();
        }
        let start = self.current_span();
        let body = self.parse_or()?;
        if self.check(&TokenKind::If) {
            self.advance();
            let test = self.parse_or()?;
            self.expect(TokenKind::Else, "'else'")?;
            let orelse = self.parse_expression()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
                span: self.span_from(start),
            });
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> Result<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::Lambda, "'lambda'")?;
        let params = self.parse_parameters(&TokenKind::Colon, false)?;
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_expression()?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
            span: self.span_from(start),
        })
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let mut left = self.parse_and()?;
        while self.match_token(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::BoolOp {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let mut left = self.parse_not()?;
        while self.match_token(&TokenKind::And) {
            let right = self.parse_not()?;
            left = Expr::BoolOp {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        let start = self.current_span();
        if self.match_token(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span: self.span_from(start),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();

        loop {
            let op = match self.peek() {
                TokenKind::EqEq => CmpOp::Eq,
                TokenKind::NotEq => CmpOp::NotEq,
                TokenKind::Less => CmpOp::Lt,
                TokenKind::LessEq => CmpOp::LtE,
                TokenKind::Greater => CmpOp::Gt,
                TokenKind::GreaterEq => CmpOp::GtE,
                TokenKind::In => CmpOp::In,
                TokenKind::Is => {
                    if self.peek_at(1) == &TokenKind::Not {
                        self.advance();
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                TokenKind::Not if self.peek_at(1) == &TokenKind::In => {
                    self.advance();
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.advance();
            ops.push(op);
            comparators.push(self.parse_bitor()?);
        }

        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
                comparators,
                span: self.span_from(start),
            })
        }
    }

    fn parse_binary_level(
        &mut self,
        operators: &[(TokenKind, BinOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let start = self.current_span();
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in operators {
                if self.check(token) {
                    self.advance();
                    let right = next(self)?;
                    left = Expr::BinOp {
                        left: Box::new(left),
                        op: *op,
                        right: Box::new(right),
                        span: self.span_from(start),
                    };
                    continue 'outer;
                }
            }
            break;
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> Result<Expr> {
        self.parse_binary_level(&[(TokenKind::Pipe, BinOp::BitOr)], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> Result<Expr> {
        self.parse_binary_level(&[(TokenKind::Caret, BinOp::BitXor)], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<Expr> {
        self.parse_binary_level(&[(TokenKind::Amp, BinOp::BitAnd)], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::LeftShift, BinOp::LShift),
                (TokenKind::RightShift, BinOp::RShift),
            ],
            Self::parse_arith,
        )
    }

    fn parse_arith(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::Star, BinOp::Mult),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::DoubleSlash, BinOp::FloorDiv),
                (TokenKind::Percent, BinOp::Mod),
                (TokenKind::At, BinOp::MatMult),
            ],
            Self::parse_factor,
        )
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let op = match self.peek() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Tilde => Some(UnaryOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_factor()?;
            return Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
                span: self.span_from(start),
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let base = self.parse_primary()?;
        if self.match_token(&TokenKind::DoubleStar) {
            let exponent = self.parse_factor()?;
            return Ok(Expr::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
                span: self.span_from(start),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let (attr, _) = self.expect_name()?;
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                        span: self.span_from(start),
                    };
                }
                TokenKind::LeftParen => {
                    self.advance();
                    let args = self.parse_call_arguments()?;
                    self.expect(TokenKind::RightParen, "')'")?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        span: self.span_from(start),
                    };
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_subscript()?;
                    self.expect(TokenKind::RightBracket, "']'")?;
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                        span: self.span_from(start),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_arguments(&mut self) -> Result<Vec<Arg>> {
        let mut args = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            let start = self.current_span();
            let arg = if self.match_token(&TokenKind::Star) {
                let value = self.parse_expression()?;
                Arg {
                    kind: ArgKind::Star,
                    name: None,
                    value,
                    span: self.span_from(start),
                }
            } else if self.match_token(&TokenKind::DoubleStar) {
                let value = self.parse_expression()?;
                Arg {
                    kind: ArgKind::DoubleStar,
                    name: None,
                    value,
                    span: self.span_from(start),
                }
            } else if matches!(self.peek(), TokenKind::Name(_)) && self.peek_at(1) == &TokenKind::Assign {
                let (name, _) = self.expect_name()?;
                self.advance();
                let value = self.parse_expression()?;
                Arg {
                    kind: ArgKind::Keyword,
                    name: Some(name),
                    value,
                    span: self.span_from(start),
                }
            } else {
                let value = self.parse_expression()?;
                Arg {
                    kind: ArgKind::Positional,
                    name: None,
                    span: value.span(),
                    value,
                }
            };
            args.push(arg);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_subscript(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let first = self.parse_slice_item()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.check(&TokenKind::RightBracket) {
                break;
            }
            elts.push(self.parse_slice_item()?);
        }
        Ok(Expr::Tuple {
            elts,
            span: self.span_from(start),
        })
    }

    fn parse_slice_item(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            let expr = self.parse_expression()?;
            if !self.check(&TokenKind::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect(TokenKind::Colon, "':'")?;
        let upper = if matches!(self.peek(), TokenKind::Colon | TokenKind::Comma | TokenKind::RightBracket) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let step = if self.match_token(&TokenKind::Colon)
            && !matches!(self.peek(), TokenKind::Comma | TokenKind::RightBracket)
        {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Ok(Expr::Slice {
            lower,
            upper,
            step,
            span: self.span_from(start),
        })
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let start = self.current_span();
        match self.peek().clone() {
            TokenKind::Name(id) => {
                self.advance();
                Ok(Expr::Name { id, span: start })
            }
            TokenKind::Int(text) => {
                self.advance();
                Ok(Expr::Int { text, span: start })
            }
            TokenKind::Float(text) => {
                self.advance();
                Ok(Expr::Float { text, span: start })
            }
            TokenKind::Str(_) | TokenKind::Bytes(_) => self.parse_strings(),
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool { value: true, span: start })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool { value: false, span: start })
            }
            TokenKind::None => {
                self.advance();
                Ok(Expr::NoneLit(start))
            }
            TokenKind::Ellipsis => {
                self.advance();
                Ok(Expr::Ellipsis(start))
            }
            TokenKind::LeftParen => self.parse_paren(),
            TokenKind::LeftBracket => {
                self.advance();
                let elts = self.parse_display_items(&TokenKind::RightBracket)?;
                self.expect(TokenKind::RightBracket, "']'")?;
                Ok(Expr::List {
                    elts,
                    span: self.span_from(start),
                })
            }
            TokenKind::LeftBrace => self.parse_brace(),
            _ => Err(self.error_expected("expression")),
        }
    }

    /// Adjacent string literals are concatenated
    fn parse_strings(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let mut text = String::new();
        let mut is_bytes = false;
        loop {
            match self.peek().clone() {
                TokenKind::Str(value) => {
                    text.push_str(&value);
                }
                TokenKind::Bytes(value) => {
                    is_bytes = true;
                    text.push_str(&value);
                }
                _ => break,
            }
            self.advance();
        }
        let span = self.span_from(start);
        if is_bytes {
            Ok(Expr::Bytes { value: text, span })
        } else {
            Ok(Expr::Str { value: text, span })
        }
    }

    fn parse_paren(&mut self) -> Result<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::LeftParen, "'('")?;
        if self.match_token(&TokenKind::RightParen) {
            return Ok(Expr::Tuple {
                elts: Vec::new(),
                span: self.span_from(start),
            });
        }
        let first = self.parse_expression()?;
        if self.match_token(&TokenKind::RightParen) {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.check(&TokenKind::RightParen) {
                break;
            }
            elts.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(Expr::Tuple {
            elts,
            span: self.span_from(start),
        })
    }

    fn parse_display_items(&mut self, close: &TokenKind) -> Result<Vec<Expr>> {
        let mut elts = Vec::new();
        while !self.check(close) {
            elts.push(self.parse_expression()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(elts)
    }

    fn parse_brace(&mut self) -> Result<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::LeftBrace, "'{'")?;
        if self.match_token(&TokenKind::RightBrace) {
            return Ok(Expr::Dict {
                items: Vec::new(),
                span: self.span_from(start),
            });
        }

        let first = self.parse_expression()?;
        if self.match_token(&TokenKind::Colon) {
            let value = self.parse_expression()?;
            let mut items = vec![(first, value)];
            while self.match_token(&TokenKind::Comma) {
                if self.check(&TokenKind::RightBrace) {
                    break;
                }
                let key = self.parse_expression()?;
                self.expect(TokenKind::Colon, "':'")?;
                let value = self.parse_expression()?;
                items.push((key, value));
            }
            self.expect(TokenKind::RightBrace, "'}'")?;
            return Ok(Expr::Dict {
                items,
                span: self.span_from(start),
            });
        }

        let mut elts = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.check(&TokenKind::RightBrace) {
                break;
            }
            elts.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(Expr::Set {
            elts,
            span: self.span_from(start),
        })
    }
}
