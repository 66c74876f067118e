//! Tree-to-tree transforms
//!
//! A [`Transform`] consumes nothing: it reads an immutable tree and builds a
//! new one. Every method has a default that rebuilds its node from the
//! transformed children, so an implementation that overrides nothing is the
//! identity. Override a single method to rewrite one kind of node and let the
//! defaults handle the rest of the tree.

use crate::ast::*;

pub trait Transform {
    fn transform_module(&mut self, module: &ModuleAst) -> ModuleAst {
        ModuleAst {
            body: self.transform_block(&module.body),
            span: module.span,
        }
    }

    fn transform_block(&mut self, body: &[Stmt]) -> Vec<Stmt> {
        body.iter().map(|stmt| self.transform_stmt(stmt)).collect()
    }

    fn transform_stmt(&mut self, stmt: &Stmt) -> Stmt {
        walk_stmt(self, stmt)
    }

    fn transform_expr(&mut self, expr: &Expr) -> Expr {
        walk_expr(self, expr)
    }

    fn transform_param(&mut self, param: &Param) -> Param {
        Param {
            name: param.name.clone(),
            annotation: param.annotation.as_ref().map(|e| self.transform_expr(e)),
            default: param.default.as_ref().map(|e| self.transform_expr(e)),
            kind: param.kind,
            span: param.span,
        }
    }
}

/// Identity transform
pub struct IdentityTransform;

impl Transform for IdentityTransform {}

fn boxed<T: Transform + ?Sized>(t: &mut T, expr: &Expr) -> Box<Expr> {
    Box::new(t.transform_expr(expr))
}

fn exprs<T: Transform + ?Sized>(t: &mut T, exprs: &[Expr]) -> Vec<Expr> {
    exprs.iter().map(|e| t.transform_expr(e)).collect()
}

/// Rebuild a statement from transformed children
pub fn walk_stmt<T: Transform + ?Sized>(t: &mut T, stmt: &Stmt) -> Stmt {
    match stmt {
        Stmt::Import(import) => Stmt::Import(import.clone()),
        Stmt::ImportFrom(import) => Stmt::ImportFrom(import.clone()),
        Stmt::FunctionDef(def) => Stmt::FunctionDef(FunctionDef {
            name: def.name.clone(),
            name_span: def.name_span,
            params: def.params.iter().map(|p| t.transform_param(p)).collect(),
            returns: def.returns.as_ref().map(|e| t.transform_expr(e)),
            body: t.transform_block(&def.body),
            decorators: exprs(t, &def.decorators),
            span: def.span,
        }),
        Stmt::ClassDef(def) => Stmt::ClassDef(ClassDef {
            name: def.name.clone(),
            name_span: def.name_span,
            bases: exprs(t, &def.bases),
            keywords: def
                .keywords
                .iter()
                .map(|k| Keyword {
                    name: k.name.clone(),
                    value: t.transform_expr(&k.value),
                    span: k.span,
                })
                .collect(),
            body: t.transform_block(&def.body),
            decorators: exprs(t, &def.decorators),
            span: def.span,
        }),
        Stmt::Assign { targets, value, span } => Stmt::Assign {
            targets: exprs(t, targets),
            value: t.transform_expr(value),
            span: *span,
        },
        Stmt::AnnAssign {
            target,
            annotation,
            value,
            span,
        } => Stmt::AnnAssign {
            target: t.transform_expr(target),
            annotation: t.transform_expr(annotation),
            value: value.as_ref().map(|e| t.transform_expr(e)),
            span: *span,
        },
        Stmt::AugAssign {
            target,
            op,
            value,
            span,
        } => Stmt::AugAssign {
            target: t.transform_expr(target),
            op: *op,
            value: t.transform_expr(value),
            span: *span,
        },
        Stmt::Return { value, span } => Stmt::Return {
            value: value.as_ref().map(|e| t.transform_expr(e)),
            span: *span,
        },
        Stmt::If(stmt) => Stmt::If(IfStmt {
            test: t.transform_expr(&stmt.test),
            body: t.transform_block(&stmt.body),
            orelse: t.transform_block(&stmt.orelse),
            span: stmt.span,
        }),
        Stmt::While(stmt) => Stmt::While(WhileStmt {
            test: t.transform_expr(&stmt.test),
            body: t.transform_block(&stmt.body),
            orelse: t.transform_block(&stmt.orelse),
            span: stmt.span,
        }),
        Stmt::For(stmt) => Stmt::For(ForStmt {
            target: t.transform_expr(&stmt.target),
            iter: t.transform_expr(&stmt.iter),
            body: t.transform_block(&stmt.body),
            orelse: t.transform_block(&stmt.orelse),
            span: stmt.span,
        }),
        Stmt::Raise { exc, span } => Stmt::Raise {
            exc: exc.as_ref().map(|e| t.transform_expr(e)),
            span: *span,
        },
        Stmt::Assert { test, msg, span } => Stmt::Assert {
            test: t.transform_expr(test),
            msg: msg.as_ref().map(|e| t.transform_expr(e)),
            span: *span,
        },
        Stmt::Global { names, span } => Stmt::Global {
            names: names.clone(),
            span: *span,
        },
        Stmt::Expr { value, span } => Stmt::Expr {
            value: t.transform_expr(value),
            span: *span,
        },
        Stmt::Pass(span) => Stmt::Pass(*span),
        Stmt::Break(span) => Stmt::Break(*span),
        Stmt::Continue(span) => Stmt::Continue(*span),
    }
}

/// Rebuild an expression from transformed children
pub fn walk_expr<T: Transform + ?Sized>(t: &mut T, expr: &Expr) -> Expr {
    match expr {
        Expr::Name { .. }
        | Expr::Int { .. }
        | Expr::Float { .. }
        | Expr::Str { .. }
        | Expr::Bytes { .. }
        | Expr::Bool { .. }
        | Expr::NoneLit(_)
        | Expr::Ellipsis(_) => expr.clone(),
        Expr::Attribute { value, attr, span } => Expr::Attribute {
            value: boxed(t, value),
            attr: attr.clone(),
            span: *span,
        },
        Expr::Subscript { value, index, span } => Expr::Subscript {
            value: boxed(t, value),
            index: boxed(t, index),
            span: *span,
        },
        Expr::Slice {
            lower,
            upper,
            step,
            span,
        } => Expr::Slice {
            lower: lower.as_ref().map(|e| boxed(t, e)),
            upper: upper.as_ref().map(|e| boxed(t, e)),
            step: step.as_ref().map(|e| boxed(t, e)),
            span: *span,
        },
        Expr::Call { func, args, span } => Expr::Call {
            func: boxed(t, func),
            args: args
                .iter()
                .map(|a| Arg {
                    kind: a.kind,
                    name: a.name.clone(),
                    value: t.transform_expr(&a.value),
                    span: a.span,
                })
                .collect(),
            span: *span,
        },
        Expr::BinOp {
            left,
            op,
            right,
            span,
        } => Expr::BinOp {
            left: boxed(t, left),
            op: *op,
            right: boxed(t, right),
            span: *span,
        },
        Expr::UnaryOp { op, operand, span } => Expr::UnaryOp {
            op: *op,
            operand: boxed(t, operand),
            span: *span,
        },
        Expr::BoolOp {
            op,
            left,
            right,
            span,
        } => Expr::BoolOp {
            op: *op,
            left: boxed(t, left),
            right: boxed(t, right),
            span: *span,
        },
        Expr::Compare {
            left,
            ops,
            comparators,
            span,
        } => Expr::Compare {
            left: boxed(t, left),
            ops: ops.clone(),
            comparators: exprs(t, comparators),
            span: *span,
        },
        Expr::IfExp {
            test,
            body,
            orelse,
            span,
        } => Expr::IfExp {
            test: boxed(t, test),
            body: boxed(t, body),
            orelse: boxed(t, orelse),
            span: *span,
        },
        Expr::List { elts, span } => Expr::List {
            elts: exprs(t, elts),
            span: *span,
        },
        Expr::Tuple { elts, span } => Expr::Tuple {
            elts: exprs(t, elts),
            span: *span,
        },
        Expr::Set { elts, span } => Expr::Set {
            elts: exprs(t, elts),
            span: *span,
        },
        Expr::Dict { items, span } => Expr::Dict {
            items: items
                .iter()
                .map(|(k, v)| (t.transform_expr(k), t.transform_expr(v)))
                .collect(),
            span: *span,
        },
        Expr::Lambda { params, body, span } => Expr::Lambda {
            params: params.iter().map(|p| t.transform_param(p)).collect(),
            body: boxed(t, body),
            span: *span,
        },
    }
}
