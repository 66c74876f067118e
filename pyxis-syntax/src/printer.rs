//! Tree dump
//!
//! Renders a module as an indented, line-numbered tree in the familiar
//! `MypyFile:1(...)` layout. The output is stable and is used to compare
//! trees in tests.

use crate::ast::*;
use crate::span::{LineIndex, Span};

/// Dump a parsed module. `source` is the text the module was parsed from,
/// used to turn spans into line numbers.
pub fn dump(module: &ModuleAst, source: &str) -> String {
    let printer = TreePrinter {
        index: LineIndex::new(source),
    };
    printer.module(module)
}

struct TreePrinter {
    index: LineIndex,
}

/// Indent all lines in a multi-line string
fn indent_lines(text: &str, indent: &str) -> String {
    text.lines()
        .map(|line| format!("{indent}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl TreePrinter {
    fn line(&self, span: Span) -> u32 {
        self.index.line_col(span.start).line
    }

    fn tagged(&self, tag: &str, span: Span, items: Vec<String>) -> String {
        let head = format!("{}:{}", tag, self.line(span));
        if items.is_empty() {
            return format!("{}()", head);
        }
        let body = items
            .iter()
            .map(|item| indent_lines(item, "  "))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}(\n{})", head, body)
    }

    fn group(&self, tag: &str, items: Vec<String>) -> String {
        let body = items
            .iter()
            .map(|item| indent_lines(item, "  "))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}(\n{})", tag, body)
    }

    fn module(&self, module: &ModuleAst) -> String {
        let items = module.body.iter().map(|s| self.stmt(s)).collect();
        self.tagged("MypyFile", module.span, items)
    }

    fn block(&self, tag: &str, body: &[Stmt]) -> String {
        self.group(tag, body.iter().map(|s| self.stmt(s)).collect())
    }

    fn stmt(&self, stmt: &Stmt) -> String {
        match stmt {
            Stmt::Import(import) => {
                let names = import
                    .names
                    .iter()
                    .map(alias_text)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Import:{}({})", self.line(import.span), names)
            }
            Stmt::ImportFrom(import) => {
                let module = format!("{}{}", ".".repeat(import.level as usize), import.module);
                if import.is_star {
                    format!("ImportAll:{}({})", self.line(import.span), module)
                } else {
                    let names = import
                        .names
                        .iter()
                        .map(alias_text)
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("ImportFrom:{}({}, [{}])", self.line(import.span), module, names)
                }
            }
            Stmt::FunctionDef(def) => {
                let mut items = vec![def.name.clone()];
                if !def.decorators.is_empty() {
                    items.push(self.group(
                        "Decorators",
                        def.decorators.iter().map(|d| self.expr(d)).collect(),
                    ));
                }
                if !def.params.is_empty() {
                    items.push(self.group("Args", def.params.iter().map(|p| self.param(p)).collect()));
                }
                if let Some(returns) = &def.returns {
                    items.push(self.group("Returns", vec![self.expr(returns)]));
                }
                items.push(self.block("Block", &def.body));
                self.tagged("FuncDef", def.span, items)
            }
            Stmt::ClassDef(def) => {
                let mut items = vec![def.name.clone()];
                if !def.bases.is_empty() {
                    items.push(self.group("BaseType", def.bases.iter().map(|b| self.expr(b)).collect()));
                }
                for keyword in &def.keywords {
                    items.push(self.group(&format!("Keyword({})", keyword.name), vec![self.expr(&keyword.value)]));
                }
                if !def.decorators.is_empty() {
                    items.push(self.group(
                        "Decorators",
                        def.decorators.iter().map(|d| self.expr(d)).collect(),
                    ));
                }
                items.push(self.block("Block", &def.body));
                self.tagged("ClassDef", def.span, items)
            }
            Stmt::Assign { targets, value, span } => {
                let mut items: Vec<String> = targets.iter().map(|t| self.expr(t)).collect();
                items.push(self.expr(value));
                self.tagged("AssignmentStmt", *span, items)
            }
            Stmt::AnnAssign {
                target,
                annotation,
                value,
                span,
            } => {
                let mut items = vec![self.expr(target)];
                if let Some(value) = value {
                    items.push(self.expr(value));
                }
                items.push(self.group("Type", vec![self.expr(annotation)]));
                self.tagged("AssignmentStmt", *span, items)
            }
            Stmt::AugAssign {
                target,
                op,
                value,
                span,
            } => self.tagged(
                "OperatorAssignmentStmt",
                *span,
                vec![op.symbol().to_string(), self.expr(target), self.expr(value)],
            ),
            Stmt::Return { value, span } => {
                self.tagged("ReturnStmt", *span, value.iter().map(|v| self.expr(v)).collect())
            }
            Stmt::If(stmt) => {
                let mut items = vec![
                    self.group("If", vec![self.expr(&stmt.test)]),
                    self.block("Then", &stmt.body),
                ];
                if !stmt.orelse.is_empty() {
                    items.push(self.block("Else", &stmt.orelse));
                }
                self.tagged("IfStmt", stmt.span, items)
            }
            Stmt::While(stmt) => {
                let mut items = vec![self.expr(&stmt.test), self.block("Block", &stmt.body)];
                if !stmt.orelse.is_empty() {
                    items.push(self.block("Else", &stmt.orelse));
                }
                self.tagged("WhileStmt", stmt.span, items)
            }
            Stmt::For(stmt) => {
                let mut items = vec![
                    self.expr(&stmt.target),
                    self.expr(&stmt.iter),
                    self.block("Block", &stmt.body),
                ];
                if !stmt.orelse.is_empty() {
                    items.push(self.block("Else", &stmt.orelse));
                }
                self.tagged("ForStmt", stmt.span, items)
            }
            Stmt::Raise { exc, span } => {
                self.tagged("RaiseStmt", *span, exc.iter().map(|e| self.expr(e)).collect())
            }
            Stmt::Assert { test, msg, span } => {
                let mut items = vec![self.expr(test)];
                if let Some(msg) = msg {
                    items.push(self.expr(msg));
                }
                self.tagged("AssertStmt", *span, items)
            }
            Stmt::Global { names, span } => {
                format!("GlobalDecl:{}({})", self.line(*span), names.join(", "))
            }
            Stmt::Expr { value, span } => self.tagged("ExpressionStmt", *span, vec![self.expr(value)]),
            Stmt::Pass(span) => format!("PassStmt:{}()", self.line(*span)),
            Stmt::Break(span) => format!("BreakStmt:{}()", self.line(*span)),
            Stmt::Continue(span) => format!("ContinueStmt:{}()", self.line(*span)),
        }
    }

    fn param(&self, param: &Param) -> String {
        let prefix = match param.kind {
            ParamKind::Positional => "",
            ParamKind::VarArgs => "*",
            ParamKind::KeywordOnly => "kw:",
            ParamKind::KwArgs => "**",
        };
        let mut items = Vec::new();
        if let Some(annotation) = &param.annotation {
            items.push(self.expr(annotation));
        }
        if let Some(default) = &param.default {
            items.push(self.group("Default", vec![self.expr(default)]));
        }
        if items.is_empty() {
            format!("Var({}{})", prefix, param.name)
        } else {
            self.group(&format!("Var({}{})", prefix, param.name), items)
        }
    }

    fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Name { id, .. } => format!("NameExpr({})", id),
            Expr::Int { text, .. } => format!("IntExpr({})", text),
            Expr::Float { text, .. } => format!("FloatExpr({})", text),
            Expr::Str { value, .. } => format!("StrExpr({})", value),
            Expr::Bytes { value, .. } => format!("BytesExpr({})", value),
            Expr::Bool { value, .. } => {
                format!("NameExpr({})", if *value { "True" } else { "False" })
            }
            Expr::NoneLit(_) => "NameExpr(None)".to_string(),
            Expr::Ellipsis(_) => "Ellipsis".to_string(),
            Expr::Attribute { value, attr, span } => {
                self.tagged("MemberExpr", *span, vec![self.expr(value), attr.clone()])
            }
            Expr::Subscript { value, index, span } => {
                self.tagged("IndexExpr", *span, vec![self.expr(value), self.expr(index)])
            }
            Expr::Slice {
                lower,
                upper,
                step,
                span,
            } => {
                let part = |e: &Option<Box<Expr>>| match e {
                    Some(e) => self.expr(e),
                    None => "<empty>".to_string(),
                };
                let mut items = vec![part(lower), part(upper)];
                if step.is_some() {
                    items.push(part(step));
                }
                self.tagged("SliceExpr", *span, items)
            }
            Expr::Call { func, args, span } => {
                let mut items = vec![self.expr(func)];
                if !args.is_empty() {
                    items.push(self.group("Args", args.iter().map(|a| self.arg(a)).collect()));
                }
                self.tagged("CallExpr", *span, items)
            }
            Expr::BinOp {
                left,
                op,
                right,
                span,
            } => self.tagged(
                "OpExpr",
                *span,
                vec![op.symbol().to_string(), self.expr(left), self.expr(right)],
            ),
            Expr::UnaryOp { op, operand, span } => {
                self.tagged("UnaryExpr", *span, vec![op.symbol().to_string(), self.expr(operand)])
            }
            Expr::BoolOp {
                op,
                left,
                right,
                span,
            } => {
                let symbol = match op {
                    BoolOp::And => "and",
                    BoolOp::Or => "or",
                };
                self.tagged(
                    "OpExpr",
                    *span,
                    vec![symbol.to_string(), self.expr(left), self.expr(right)],
                )
            }
            Expr::Compare {
                left,
                ops,
                comparators,
                span,
            } => {
                let mut items = vec![ops.iter().map(|op| op.symbol()).collect::<Vec<_>>().join(" ")];
                items.push(self.expr(left));
                items.extend(comparators.iter().map(|c| self.expr(c)));
                self.tagged("ComparisonExpr", *span, items)
            }
            Expr::IfExp {
                test,
                body,
                orelse,
                span,
            } => self.tagged(
                "ConditionalExpr",
                *span,
                vec![
                    self.group("Condition", vec![self.expr(test)]),
                    self.expr(body),
                    self.expr(orelse),
                ],
            ),
            Expr::List { elts, span } => {
                self.tagged("ListExpr", *span, elts.iter().map(|e| self.expr(e)).collect())
            }
            Expr::Tuple { elts, span } => {
                self.tagged("TupleExpr", *span, elts.iter().map(|e| self.expr(e)).collect())
            }
            Expr::Set { elts, span } => {
                self.tagged("SetExpr", *span, elts.iter().map(|e| self.expr(e)).collect())
            }
            Expr::Dict { items, span } => self.tagged(
                "DictExpr",
                *span,
                items
                    .iter()
                    .map(|(k, v)| self.group("Item", vec![self.expr(k), self.expr(v)]))
                    .collect(),
            ),
            Expr::Lambda { params, body, span } => {
                let mut items = Vec::new();
                if !params.is_empty() {
                    items.push(self.group("Args", params.iter().map(|p| self.param(p)).collect()));
                }
                items.push(self.expr(body));
                self.tagged("LambdaExpr", *span, items)
            }
        }
    }

    fn arg(&self, arg: &Arg) -> String {
        let value = self.expr(&arg.value);
        match (arg.kind, &arg.name) {
            (ArgKind::Keyword, Some(name)) => self.group(&format!("KwArgs({})", name), vec![value]),
            (ArgKind::Star, _) => self.group("VarArg", vec![value]),
            (ArgKind::DoubleStar, _) => self.group("DictVarArg", vec![value]),
            _ => value,
        }
    }
}

fn alias_text(alias: &ImportAlias) -> String {
    match &alias.asname {
        Some(asname) => format!("{} : {}", alias.name, asname),
        None => alias.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_module;
    use crate::span::FileId;

    fn dump_source(source: &str) -> String {
        let module = parse_module(source, FileId::new(0)).unwrap();
        dump(&module, source)
    }

    #[test]
    fn test_dump_assignment() {
        assert_eq!(
            dump_source("x = 1\n"),
            "MypyFile:1(\n  AssignmentStmt:1(\n    NameExpr(x)\n    IntExpr(1)))"
        );
    }

    #[test]
    fn test_dump_function() {
        let text = dump_source("import a as b\n\ndef f(x: int) -> str:\n    return x\n");
        let expected = "\
MypyFile:1(
  Import:1(a : b)
  FuncDef:3(
    f
    Args(
      Var(x)(
        NameExpr(int)))
    Returns(
      NameExpr(str))
    Block(
      ReturnStmt:4(
        NameExpr(x)))))";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_dump_empty_module() {
        assert_eq!(dump_source(""), "MypyFile:1()");
    }
}
