//! Diagnostics
//!
//! Every problem found during analysis becomes a [`Diagnostic`] tied to a
//! module and a 1-based source position. Analysis never stops at the first
//! problem; it records one diagnostic and recovers.

use crate::types::Type;
use pyxis_syntax::{LineIndex, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// Which stage found the problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Missing modules and ignored imports
    Resolution,
    Syntax,
    /// Undefined names and redefinitions
    Binding,
    Type,
    /// Broken internal invariant; aborts the current module only
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub module: String,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        module: impl Into<String>,
        line: u32,
        column: u32,
        severity: Severity,
        kind: DiagnosticKind,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            module: module.into(),
            line,
            column,
            severity,
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}: {}", self.line, self.column, self.severity, self.message)
    }
}

/// Collects diagnostics for one module
#[derive(Debug)]
pub struct DiagnosticReporter<'a> {
    module: String,
    lines: &'a LineIndex,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> DiagnosticReporter<'a> {
    pub fn new(module: impl Into<String>, lines: &'a LineIndex) -> Self {
        Self {
            module: module.into(),
            lines,
            diagnostics: Vec::new(),
        }
    }

    fn push(&mut self, span: Span, severity: Severity, kind: DiagnosticKind, message: String) {
        let pos = self.lines.line_col(span.start);
        self.diagnostics.push(Diagnostic::new(
            self.module.clone(),
            pos.line,
            pos.column,
            severity,
            kind,
            message,
        ));
    }

    pub fn report_error(&mut self, kind: DiagnosticKind, span: Span, message: impl Into<String>) {
        self.push(span, Severity::Error, kind, message.into());
    }

    pub fn report_note(&mut self, span: Span, message: impl Into<String>) {
        self.push(span, Severity::Note, DiagnosticKind::Type, message.into());
    }

    pub fn report_internal(&mut self, span: Span, message: impl fmt::Display) {
        self.push(span, Severity::Error, DiagnosticKind::Internal, messages::internal(message));
    }

    pub fn line_of(&self, span: Span) -> u32 {
        self.lines.line_col(span.start).line
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }

    /// Diagnostics in source order, duplicates removed
    pub fn finish(self) -> Vec<Diagnostic> {
        let mut diagnostics = self.diagnostics;
        sort_diagnostics(&mut diagnostics);
        diagnostics
    }
}

/// Stable sort by position, dropping exact duplicates
pub fn sort_diagnostics(diagnostics: &mut Vec<Diagnostic>) {
    diagnostics.sort_by_key(|d| (d.line, d.column));
    let mut seen = std::collections::HashSet::new();
    diagnostics.retain(|d| seen.insert(d.clone()));
}

/// Message texts
pub mod messages {
    use super::*;

    pub fn name_not_defined(name: &str) -> String {
        format!("Name \"{}\" is not defined", name)
    }

    pub fn already_defined(name: &str, line: u32) -> String {
        format!("Name \"{}\" already defined on line {}", name, line)
    }

    pub fn cannot_find_module(module: &str) -> String {
        format!(
            "Cannot find implementation or library stub for module named \"{}\"",
            module
        )
    }

    pub fn import_ignored(module: &str) -> String {
        format!("Import of \"{}\" ignored", module)
    }

    pub fn module_has_no_attribute(module: &str, name: &str) -> String {
        format!("Module \"{}\" has no attribute \"{}\"", module, name)
    }

    pub fn has_no_attribute(ty: &Type, name: &str) -> String {
        format!("\"{}\" has no attribute \"{}\"", ty, name)
    }

    pub fn item_has_no_attribute(item: &Type, union: &Type, name: &str) -> String {
        format!("Item \"{}\" of \"{}\" has no attribute \"{}\"", item, union, name)
    }

    pub fn incompatible_argument(index: usize, callee: &str, actual: &Type, expected: &Type) -> String {
        format!(
            "Argument {} to {} has incompatible type \"{}\"; expected \"{}\"",
            index, callee, actual, expected
        )
    }

    pub fn incompatible_assignment(expr: &Type, var: &Type) -> String {
        format!(
            "Incompatible types in assignment (expression has type \"{}\", variable has type \"{}\")",
            expr, var
        )
    }

    pub fn incompatible_return(got: &Type, expected: &Type) -> String {
        format!(
            "Incompatible return value type (got \"{}\", expected \"{}\")",
            got, expected
        )
    }

    pub const MISSING_RETURN: &str = "Missing return statement";
    pub const RETURN_VALUE_EXPECTED: &str = "Return value expected";
    pub const NO_RETURN_VALUE_EXPECTED: &str = "No return value expected";

    pub fn unsupported_operands(op: &str, left: &Type, right: &Type) -> String {
        format!(
            "Unsupported operand types for {} (\"{}\" and \"{}\")",
            op, left, right
        )
    }

    pub fn unsupported_left_operand(op: &str, left: &Type) -> String {
        format!("Unsupported left operand type for {} (\"{}\")", op, left)
    }

    pub fn unsupported_right_operand(op: &str, right: &Type) -> String {
        format!("Unsupported right operand type for {} (\"{}\")", op, right)
    }

    pub fn unsupported_unary_operand(op: &str, operand: &Type) -> String {
        format!("Unsupported operand type for unary {} (\"{}\")", op, operand)
    }

    pub fn incompatible_default(name: &str, default: &Type, arg: &Type) -> String {
        format!(
            "Incompatible default for argument \"{}\" (default has type \"{}\", argument has type \"{}\")",
            name, default, arg
        )
    }

    pub fn unsupported_index_assignment(ty: &Type) -> String {
        format!("Unsupported target for indexed assignment (\"{}\")", ty)
    }

    pub fn operand_note(side: &str, ty: &Type) -> String {
        format!("{} operand is of type \"{}\"", side, ty)
    }

    pub const BAD_EXCEPTION: &str = "Exceptions must derive from BaseException";

    pub fn not_callable(ty: &Type) -> String {
        format!("\"{}\" not callable", ty)
    }

    pub fn not_indexable(ty: &Type) -> String {
        format!("Value of type \"{}\" is not indexable", ty)
    }

    pub fn invalid_index(index: &Type, target: &Type, expected: &Type) -> String {
        format!(
            "Invalid index type \"{}\" for \"{}\"; expected type \"{}\"",
            index, target, expected
        )
    }

    pub fn not_iterable(ty: &Type) -> String {
        format!("\"{}\" has no attribute \"__iter__\" (not iterable)", ty)
    }

    pub fn too_many_arguments(callee: &str) -> String {
        format!("Too many arguments for {}", callee)
    }

    pub fn too_few_arguments(callee: &str) -> String {
        format!("Too few arguments for {}", callee)
    }

    pub fn missing_positional_argument(name: &str, callee: &str) -> String {
        format!("Missing positional argument \"{}\" in call to {}", name, callee)
    }

    pub fn missing_named_argument(name: &str, callee: &str) -> String {
        format!("Missing named argument \"{}\" for {}", name, callee)
    }

    pub fn unexpected_keyword(name: &str, callee: &str) -> String {
        format!("Unexpected keyword argument \"{}\" for {}", name, callee)
    }

    pub fn multiple_values(name: &str, callee: &str) -> String {
        format!("{} gets multiple values for keyword argument \"{}\"", callee, name)
    }

    pub fn not_valid_as_type(kind: &str, fullname: &str) -> String {
        format!("{} \"{}\" is not valid as a type", kind, fullname)
    }

    pub fn type_arg_count(class: &str, expected: usize, given: usize) -> String {
        let plural = if expected == 1 { "" } else { "s" };
        format!(
            "\"{}\" expects {} type argument{}, but {} given",
            class, expected, plural, given
        )
    }

    pub fn version_gate(feature: &str, version: (u32, u32)) -> String {
        format!("{} requires Python {}.{} or newer", feature, version.0, version.1)
    }

    pub fn builtin_not_subscriptable(name: &str, alias: &str) -> String {
        format!(
            "\"{}\" is not subscriptable, use \"typing.{}\" instead",
            name, alias
        )
    }

    pub fn internal(message: impl fmt::Display) -> String {
        format!("INTERNAL ERROR: {}", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyxis_syntax::{ByteOffset, FileId};

    #[test]
    fn test_reporter_positions_and_order() {
        let source = "x = 1\ny = z\n";
        let index = LineIndex::new(source);
        let mut reporter = DiagnosticReporter::new("m", &index);
        let span = |s: u32, e: u32| Span::new(FileId::new(0), ByteOffset(s), ByteOffset(e));

        assert!(!reporter.has_errors());
        reporter.report_error(DiagnosticKind::Binding, span(10, 11), messages::name_not_defined("z"));
        reporter.report_internal(span(0, 1), "boom");
        reporter.report_internal(span(0, 1), "boom");
        assert!(reporter.has_errors());

        let diagnostics = reporter.finish();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (1, 1));
        assert_eq!(diagnostics[0].message, "INTERNAL ERROR: boom");
        assert_eq!((diagnostics[1].line, diagnostics[1].column), (2, 5));
        assert_eq!(diagnostics[1].to_string(), "2:5: error: Name \"z\" is not defined");
    }
}
