//! Semantic analysis
//!
//! Binds the names of every module in one SCC. Forward references (to a
//! later definition in the same module, or to a sibling module of an import
//! cycle that has not been walked yet) are not errors: they are recorded as
//! [`DeferredRef`]s and the whole SCC is walked again. Within a pass each
//! module is rewalked while its own deferrals keep shrinking, so the pass
//! count tracks references across modules only. The loop stops when
//! nothing is deferred, when a pass makes no progress (the leftovers are
//! reported as undefined in one last pass), or when the pass cap is hit.
//!
//! Function bodies are walked only for name binding; their types are the
//! checker's business.

use crate::diagnostics::{messages, Diagnostic, DiagnosticKind, DiagnosticReporter, Severity};
use crate::env::{AnalysisOptions, Env, ModuleMap};
use crate::mro;
use crate::scope::{lookup_module_attr, Lookup, Scope};
use crate::symbols::{ClassInfo, DeclareOutcome, SymbolFlags, SymbolKind, SymbolNode, SymbolTable};
use crate::typeanal::{BaseType, TypeAnalyzer};
use crate::types::*;
use pyxis_syntax::{
    absolute_module, ClassDef, Expr, FunctionDef, HasSpan, ImportAlias, ImportFromStmt, LineIndex,
    ModuleAst, ParamKind, Span, Stmt,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// One module of the SCC being analyzed
#[derive(Debug, Clone, Copy)]
pub struct SccModule<'a> {
    pub name: &'a str,
    pub ast: &'a ModuleAst,
    pub lines: &'a LineIndex,
    /// `pkg/__init__.py`; affects relative imports
    pub is_package: bool,
    /// `.pyi` stub; exempt from language version gates
    pub is_stub: bool,
}

/// Per-module analysis state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisState {
    Unprocessed,
    BindingPass(u32),
    Stable,
    TypeChecked,
}

/// A name reference that could not be bound in the current pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRef {
    pub module: String,
    pub name: String,
    pub line: u32,
    pub column: u32,
}

/// Result of analyzing one SCC
#[derive(Debug)]
pub struct SemanalOutput {
    pub tables: BTreeMap<String, SymbolTable>,
    pub diagnostics: BTreeMap<String, Vec<Diagnostic>>,
    pub passes: u32,
    /// Modules whose analysis hit an internal error; they are not type checked
    pub aborted: BTreeSet<String>,
}

/// Decorator-derived flavour of a function defined in a class body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MethodKind {
    Instance,
    Class,
    Static,
    Property,
}

pub(crate) fn method_kind(def: &FunctionDef) -> MethodKind {
    for decorator in &def.decorators {
        match decorator.dotted_name().as_deref() {
            Some("staticmethod") => return MethodKind::Static,
            Some("classmethod") => return MethodKind::Class,
            Some("property") => return MethodKind::Property,
            _ => {}
        }
    }
    MethodKind::Instance
}

/// Signature of a `def`, with `self` typed from the enclosing class
pub(crate) fn function_signature(ta: &mut TypeAnalyzer<'_, '_>, def: &FunctionDef, class: Option<&ClassInfo>) -> CallableType {
    let kind = method_kind(def);
    let annotated = def.returns.is_some() || def.params.iter().any(|p| p.annotation.is_some());
    let mut params = Vec::with_capacity(def.params.len());
    for (i, param) in def.params.iter().enumerate() {
        let ty = match (&param.annotation, class) {
            (Some(annotation), _) => ta.analyze(annotation),
            (None, Some(info)) if i == 0 && param.kind == ParamKind::Positional && kind != MethodKind::Static => {
                if kind == MethodKind::Class {
                    Type::ClassObject(info.self_instance())
                } else {
                    Type::Instance(info.self_instance())
                }
            }
            (None, _) => Type::Any(AnyKind::Unannotated),
        };
        let has_default = param.default.is_some();
        let kind = match param.kind {
            ParamKind::Positional if has_default => CallableArgKind::Optional,
            ParamKind::Positional => CallableArgKind::Positional,
            ParamKind::VarArgs => CallableArgKind::Star,
            ParamKind::KeywordOnly if has_default => CallableArgKind::NamedOptional,
            ParamKind::KeywordOnly => CallableArgKind::Named,
            ParamKind::KwArgs => CallableArgKind::StarStar,
        };
        params.push(CallableParam {
            name: Some(param.name.clone()),
            ty,
            kind,
        });
    }
    let ret = match &def.returns {
        Some(annotation) => ta.analyze(annotation),
        None if def.name == "__init__" && annotated => Type::None,
        None => Type::Any(AnyKind::Unannotated),
    };
    let mut callable = CallableType::new(params, ret);
    let mut vars = Vec::new();
    for param in &callable.params {
        param.ty.collect_type_vars(&mut vars);
    }
    callable.ret.collect_type_vars(&mut vars);
    if let Some(info) = class {
        vars.retain(|tv| !info.type_vars.iter().any(|c| c.fullname == tv.fullname));
    }
    callable.type_vars = vars;
    callable.name = Some(match class {
        Some(info) => format!("{}\" of \"{}", def.name, short_name(&info.fullname)),
        None => def.name.clone(),
    });
    callable
}

/// Table for the innermost class of `classes`, or the module table
pub(crate) fn scope_table_mut<'t>(
    tables: &'t mut BTreeMap<String, SymbolTable>,
    module: &str,
    classes: &[String],
) -> Option<&'t mut SymbolTable> {
    let mut table = tables.get_mut(module)?;
    for class in classes {
        table = &mut table.lookup_mut(class)?.class.as_mut()?.members;
    }
    Some(table)
}

/// Fresh module table holding the runtime-provided module attributes
fn implicit_table(module: &str) -> SymbolTable {
    let mut table = SymbolTable::new();
    for name in ["__name__", "__file__", "__doc__"] {
        table.insert(
            SymbolNode::new(name, format!("{}.{}", module, name), SymbolKind::Variable, 0)
                .with_type(Type::named(STR))
                .with_flags(SymbolFlags::IMPLICIT),
        );
    }
    table
}

/// Copy of a node bound under a new name by an import
fn imported_copy(node: &SymbolNode, bound: &str, line: u32) -> SymbolNode {
    let mut copy = SymbolNode::new(bound, node.fullname.clone(), node.kind, line).with_flags(SymbolFlags::IMPORTED);
    copy.ty = node.ty.clone();
    copy
}

/// Names assigned anywhere in a function body, nested scopes excluded
fn collect_assigned(body: &[Stmt], out: &mut BTreeSet<String>) {
    fn target_names(target: &Expr, out: &mut BTreeSet<String>) {
        match target {
            Expr::Name { id, .. } => {
                out.insert(id.clone());
            }
            Expr::Tuple { elts, .. } | Expr::List { elts, .. } => {
                for elt in elts {
                    target_names(elt, out);
                }
            }
            _ => {}
        }
    }
    for stmt in body {
        match stmt {
            Stmt::Assign { targets, .. } => targets.iter().for_each(|t| target_names(t, out)),
            Stmt::AnnAssign { target, .. } | Stmt::AugAssign { target, .. } => target_names(target, out),
            Stmt::FunctionDef(def) => {
                out.insert(def.name.clone());
            }
            Stmt::ClassDef(def) => {
                out.insert(def.name.clone());
            }
            Stmt::Import(import) => {
                for alias in &import.names {
                    let bound = alias
                        .asname
                        .clone()
                        .unwrap_or_else(|| alias.name.split('.').next().unwrap_or_default().to_string());
                    out.insert(bound);
                }
            }
            Stmt::ImportFrom(import) => {
                for alias in &import.names {
                    out.insert(alias.asname.clone().unwrap_or_else(|| alias.name.clone()));
                }
            }
            Stmt::If(s) => {
                collect_assigned(&s.body, out);
                collect_assigned(&s.orelse, out);
            }
            Stmt::While(s) => {
                collect_assigned(&s.body, out);
                collect_assigned(&s.orelse, out);
            }
            Stmt::For(s) => {
                target_names(&s.target, out);
                collect_assigned(&s.body, out);
                collect_assigned(&s.orelse, out);
            }
            _ => {}
        }
    }
}

pub(crate) fn collect_globals(body: &[Stmt], out: &mut BTreeSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Global { names, .. } => out.extend(names.iter().cloned()),
            Stmt::If(s) => {
                collect_globals(&s.body, out);
                collect_globals(&s.orelse, out);
            }
            Stmt::While(s) => {
                collect_globals(&s.body, out);
                collect_globals(&s.orelse, out);
            }
            Stmt::For(s) => {
                collect_globals(&s.body, out);
                collect_globals(&s.orelse, out);
            }
            _ => {}
        }
    }
}

/// Name loads of an expression that are not local, with their spans
fn collect_loads<'x>(expr: &'x Expr, locals: &BTreeSet<String>, out: &mut Vec<(&'x str, Span)>) {
    match expr {
        Expr::Name { id, span } => {
            if !locals.contains(id) {
                out.push((id, *span));
            }
        }
        Expr::Lambda { params, body, .. } => {
            for default in params.iter().filter_map(|p| p.default.as_ref()) {
                collect_loads(default, locals, out);
            }
            let mut inner = locals.clone();
            inner.extend(params.iter().map(|p| p.name.clone()));
            collect_loads(body, &inner, out);
        }
        other => {
            for child in other.children() {
                collect_loads(child, locals, out);
            }
        }
    }
}

/// Per-module state of one pass
struct PassCx<'a> {
    module: SccModule<'a>,
    final_mode: bool,
    reporter: DiagnosticReporter<'a>,
    deferred: Vec<DeferredRef>,
    /// Function bodies, walked after the module's top level
    bodies: Vec<(&'a FunctionDef, Vec<String>)>,
}

impl<'a> PassCx<'a> {
    fn new(module: SccModule<'a>, final_mode: bool) -> Self {
        PassCx {
            module,
            final_mode,
            reporter: DiagnosticReporter::new(module.name, module.lines),
            deferred: Vec::new(),
            bodies: Vec::new(),
        }
    }

    fn line(&self, span: Span) -> u32 {
        self.module.lines.line_col(span.start).line
    }

    fn defer(&mut self, name: impl Into<String>, span: Span) {
        let pos = self.module.lines.line_col(span.start);
        let name = name.into();
        trace!(module = self.module.name, name = %name, line = pos.line, "deferred reference");
        self.deferred.push(DeferredRef {
            module: self.module.name.to_string(),
            name,
            line: pos.line,
            column: pos.column,
        });
    }

    /// A name with no binding at all
    fn missing(&mut self, name: &str, span: Span) {
        if self.final_mode {
            self.reporter
                .report_error(DiagnosticKind::Binding, span, messages::name_not_defined(name));
        } else {
            self.defer(name, span);
        }
    }

    /// A name bound to a placeholder; its definition reports the root cause
    fn pending(&mut self, name: &str, span: Span) {
        if !self.final_mode {
            self.defer(name, span);
        }
    }

    fn absorb(&mut self, ta: TypeAnalyzer<'_, '_>) -> bool {
        let deferred = !ta.deferred.is_empty();
        for (name, span) in ta.deferred {
            self.defer(name, span);
        }
        for (span, kind, message) in ta.errors {
            self.reporter.report_error(kind, span, message);
        }
        deferred
    }
}

/// Fixed-point name binding over one SCC
pub struct SemanticAnalyzer<'a> {
    modules: &'a [SccModule<'a>],
    deps: &'a ModuleMap,
    options: &'a AnalysisOptions,
    tables: BTreeMap<String, SymbolTable>,
    /// Redefinition conflicts are only detected on first sight, so they
    /// outlive the pass that found them
    conflicts: BTreeMap<String, Vec<Diagnostic>>,
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(modules: &'a [SccModule<'a>], deps: &'a ModuleMap, options: &'a AnalysisOptions) -> Self {
        let tables = modules
            .iter()
            .map(|m| (m.name.to_string(), implicit_table(m.name)))
            .collect();
        SemanticAnalyzer {
            modules,
            deps,
            options,
            tables,
            conflicts: BTreeMap::new(),
        }
    }

    fn env(&self) -> Env<'_> {
        Env::new(self.deps, &self.tables, self.options)
    }

    /// Run passes until the SCC is stable
    pub fn run(mut self) -> SemanalOutput {
        let cap = self.modules.len() as u32 + self.options.extra_pass_budget;
        let mut passes = 0;
        let mut previous: Option<usize> = None;
        let mut aborted = BTreeSet::new();
        let mut internal: Vec<Diagnostic> = Vec::new();

        let diagnostics = loop {
            passes += 1;
            for module in self.modules {
                debug!(module = module.name, state = ?AnalysisState::BindingPass(passes), "semantic analysis pass");
            }
            let (diagnostics, deferred) = self.run_pass(false);
            if deferred.is_empty() {
                break diagnostics;
            }
            if previous.map_or(false, |p| deferred.len() >= p) {
                debug!(deferred = deferred.len(), "no progress, reporting undefined names");
                passes += 1;
                break self.run_pass(true).0;
            }
            if passes >= cap {
                for module in self.modules {
                    if let Some(first) = deferred.iter().find(|d| d.module == module.name) {
                        internal.push(Diagnostic::new(
                            module.name,
                            first.line,
                            first.column,
                            Severity::Error,
                            DiagnosticKind::Internal,
                            messages::internal(format!(
                                "maximum semantic analysis iteration count reached ({} passes)",
                                cap
                            )),
                        ));
                        aborted.insert(module.name.to_string());
                    }
                }
                passes += 1;
                break self.run_pass(true).0;
            }
            previous = Some(deferred.len());
        };

        internal.extend(self.check_resolved(&mut aborted));

        let mut per_module: BTreeMap<String, Vec<Diagnostic>> = BTreeMap::new();
        for module in self.modules {
            let mut list = self.conflicts.remove(module.name).unwrap_or_default();
            list.extend(diagnostics.get(module.name).cloned().unwrap_or_default());
            list.extend(internal.iter().filter(|d| d.module == module.name).cloned());
            crate::diagnostics::sort_diagnostics(&mut list);
            debug!(module = module.name, passes, state = ?AnalysisState::Stable, "module stable");
            per_module.insert(module.name.to_string(), list);
        }

        SemanalOutput {
            tables: self.tables,
            diagnostics: per_module,
            passes,
            aborted,
        }
    }

    /// No forward reference may survive a stable module
    fn check_resolved(&mut self, aborted: &mut BTreeSet<String>) -> Vec<Diagnostic> {
        fn scan(table: &SymbolTable, found: &mut Vec<(String, String, u32)>) {
            for (_, node) in table.iter() {
                if let Some(ty) = node.ty.as_ref().filter(|t| t.has_unresolved()) {
                    found.push((node.fullname.clone(), ty.to_string(), node.line));
                }
                if let Some(info) = &node.class {
                    scan(&info.members, found);
                }
            }
        }
        fn erase(table: &mut SymbolTable) {
            for (_, node) in table.iter_mut() {
                if let Some(ty) = node.ty.as_mut() {
                    *ty = ty.erase_unresolved();
                }
                if let Some(info) = node.class.as_mut() {
                    erase(&mut info.members);
                }
            }
        }

        let mut diagnostics = Vec::new();
        for (module, table) in self.tables.iter_mut() {
            let mut found = Vec::new();
            scan(table, &mut found);
            if let Some((fullname, ty, line)) = found.into_iter().next() {
                diagnostics.push(Diagnostic::new(
                    module.clone(),
                    line.max(1),
                    1,
                    Severity::Error,
                    DiagnosticKind::Internal,
                    messages::internal(format!(
                        "unresolved type \"{}\" remains in \"{}\" after semantic analysis",
                        ty, fullname
                    )),
                ));
                erase(table);
                aborted.insert(module.clone());
            }
        }
        diagnostics
    }

    fn run_pass(&mut self, final_mode: bool) -> (BTreeMap<String, Vec<Diagnostic>>, Vec<DeferredRef>) {
        let modules: &'a [SccModule<'a>] = self.modules;
        let mut diagnostics = BTreeMap::new();
        let mut deferred = Vec::new();
        for module in modules {
            // Forward references inside one module settle here, so a pass
            // only has to account for references across modules
            let mut walks = 0;
            let mut previous: Option<usize> = None;
            let cx = loop {
                let mut cx = PassCx::new(*module, final_mode);
                self.walk_module(&mut cx);
                walks += 1;
                if final_mode || cx.deferred.is_empty() || previous.map_or(false, |p| cx.deferred.len() >= p) {
                    break cx;
                }
                previous = Some(cx.deferred.len());
            };
            trace!(module = module.name, deferred = cx.deferred.len(), walks, final_mode, "pass finished");
            deferred.extend(cx.deferred);
            diagnostics.insert(module.name.to_string(), cx.reporter.finish());
        }
        (diagnostics, deferred)
    }

    fn walk_module(&mut self, cx: &mut PassCx<'a>) {
        let module = cx.module;
        self.visit_block(cx, &module.ast.body, &[]);
        for (def, classes) in std::mem::take(&mut cx.bodies) {
            let is_method = !classes.is_empty();
            self.visit_function(cx, def, &classes, &BTreeSet::new(), is_method);
        }
    }

    fn declare(&mut self, cx: &mut PassCx<'a>, classes: &[String], node: SymbolNode, span: Span) {
        let module = cx.module.name;
        let Some(table) = scope_table_mut(&mut self.tables, module, classes) else {
            return;
        };
        let name = node.name.clone();
        if let DeclareOutcome::Conflict { previous_line, .. } = table.declare(node) {
            let pos = cx.module.lines.line_col(span.start);
            self.conflicts.entry(module.to_string()).or_default().push(Diagnostic::new(
                module,
                pos.line,
                pos.column,
                Severity::Error,
                DiagnosticKind::Binding,
                messages::already_defined(&name, previous_line),
            ));
        }
    }

    /// Resolve name loads; returns whether anything had to be deferred
    fn check_loads(&mut self, cx: &mut PassCx<'a>, expr: &Expr, scope: Scope<'_>, locals: &BTreeSet<String>) -> bool {
        let mut names = Vec::new();
        collect_loads(expr, locals, &mut names);
        let env = self.env();
        let before = cx.deferred.len();
        for (name, span) in names {
            match scope.lookup(&env, name) {
                Lookup::Missing => cx.missing(name, span),
                Lookup::Pending => cx.pending(name, span),
                _ => {}
            }
        }
        cx.deferred.len() > before
    }

    fn visit_block(&mut self, cx: &mut PassCx<'a>, body: &'a [Stmt], classes: &[String]) {
        for stmt in body {
            self.visit_stmt(cx, stmt, classes);
        }
    }

    fn visit_stmt(&mut self, cx: &mut PassCx<'a>, stmt: &'a Stmt, classes: &[String]) {
        let module = cx.module.name;
        let scope = Scope::class_body(module, classes);
        let none = BTreeSet::new();
        match stmt {
            Stmt::Import(import) => {
                for alias in &import.names {
                    self.bind_import(cx, alias, classes);
                }
            }
            Stmt::ImportFrom(import) => self.bind_import_from(cx, import, classes),
            Stmt::FunctionDef(def) => self.bind_function(cx, def, classes),
            Stmt::ClassDef(def) => self.bind_class(cx, def, classes),
            Stmt::Assign { targets, value, span } => self.bind_assignment(cx, targets, value, *span, classes),
            Stmt::AnnAssign {
                target,
                annotation,
                value,
                ..
            } => self.bind_annotated(cx, target, annotation, value.as_ref(), classes),
            Stmt::AugAssign { target, value, .. } => {
                self.check_loads(cx, target, scope, &none);
                self.check_loads(cx, value, scope, &none);
            }
            Stmt::Return { value: Some(value), .. }
            | Stmt::Raise { exc: Some(value), .. }
            | Stmt::Expr { value, .. } => {
                self.check_loads(cx, value, scope, &none);
            }
            Stmt::Assert { test, msg, .. } => {
                self.check_loads(cx, test, scope, &none);
                if let Some(msg) = msg {
                    self.check_loads(cx, msg, scope, &none);
                }
            }
            Stmt::If(s) => {
                self.check_loads(cx, &s.test, scope, &none);
                self.visit_block(cx, &s.body, classes);
                self.visit_block(cx, &s.orelse, classes);
            }
            Stmt::While(s) => {
                self.check_loads(cx, &s.test, scope, &none);
                self.visit_block(cx, &s.body, classes);
                self.visit_block(cx, &s.orelse, classes);
            }
            Stmt::For(s) => {
                self.check_loads(cx, &s.iter, scope, &none);
                self.bind_target(cx, &s.target, None, false, classes);
                self.visit_block(cx, &s.body, classes);
                self.visit_block(cx, &s.orelse, classes);
            }
            Stmt::Return { value: None, .. }
            | Stmt::Raise { exc: None, .. }
            | Stmt::Global { .. }
            | Stmt::Pass(_)
            | Stmt::Break(_)
            | Stmt::Continue(_) => {}
        }
    }

    fn bind_import(&mut self, cx: &mut PassCx<'a>, alias: &ImportAlias, classes: &[String]) {
        let (bound, target) = match &alias.asname {
            Some(asname) => (asname.clone(), alias.name.clone()),
            None => {
                let top = alias.name.split('.').next().unwrap_or_default().to_string();
                (top.clone(), top)
            }
        };
        let node = SymbolNode::new(bound, target.clone(), SymbolKind::ModuleRef, cx.line(alias.span))
            .with_type(Type::Module(target))
            .with_flags(SymbolFlags::IMPORTED);
        self.declare(cx, classes, node, alias.span);
    }

    fn bind_import_from(&mut self, cx: &mut PassCx<'a>, import: &ImportFromStmt, classes: &[String]) {
        let Some(module) = absolute_module(cx.module.name, cx.module.is_package, import.level, &import.module) else {
            cx.reporter.report_error(
                DiagnosticKind::Resolution,
                import.span,
                "No parent module -- cannot perform relative import",
            );
            return;
        };
        let line = cx.line(import.span);

        if import.is_star {
            let env = self.env();
            let nodes: Vec<SymbolNode> = match env.module(&module) {
                Some(table) if !table.is_opaque() => table
                    .exported()
                    .filter(|n| n.kind != SymbolKind::Placeholder)
                    .map(|n| imported_copy(n, &n.name, line))
                    .collect(),
                _ => Vec::new(),
            };
            for node in nodes {
                self.declare(cx, classes, node, import.span);
            }
            return;
        }

        for alias in &import.names {
            let bound = alias.asname.clone().unwrap_or_else(|| alias.name.clone());
            let line = cx.line(alias.span);
            let fullname = format!("{}.{}", module, alias.name);
            let env = self.env();
            let is_local = env.is_local(&module);
            let resolved = match lookup_module_attr(&env, &module, &alias.name) {
                Lookup::Found(node) if node.ty.as_ref().map_or(false, |t| t.has_unresolved()) => None,
                Lookup::Found(node) => Some(imported_copy(node, &bound, line)),
                Lookup::Module(submodule) => Some(
                    SymbolNode::new(bound.clone(), submodule.clone(), SymbolKind::ModuleRef, line)
                        .with_type(Type::Module(submodule))
                        .with_flags(SymbolFlags::IMPORTED),
                ),
                Lookup::Opaque => Some(
                    SymbolNode::new(bound.clone(), fullname.clone(), SymbolKind::Variable, line)
                        .with_type(Type::Any(AnyKind::MissingImport))
                        .with_flags(SymbolFlags::IMPORTED),
                ),
                Lookup::Pending => None,
                Lookup::Missing if is_local && !cx.final_mode => None,
                Lookup::Missing => {
                    cx.reporter.report_error(
                        DiagnosticKind::Binding,
                        alias.span,
                        messages::module_has_no_attribute(&module, &alias.name),
                    );
                    Some(
                        SymbolNode::new(bound.clone(), fullname.clone(), SymbolKind::Variable, line)
                            .with_type(Type::from_error())
                            .with_flags(SymbolFlags::IMPORTED),
                    )
                }
            };
            let mut node = match resolved {
                Some(node) => node,
                None if cx.final_mode => SymbolNode::new(bound, fullname, SymbolKind::Variable, line)
                    .with_type(Type::from_error())
                    .with_flags(SymbolFlags::IMPORTED),
                None => {
                    cx.defer(fullname.clone(), alias.span);
                    SymbolNode::new(bound, fullname, SymbolKind::Placeholder, line).with_flags(SymbolFlags::IMPORTED)
                }
            };
            // stubs re-export only `from m import X as X`
            if cx.module.is_stub && alias.asname.as_deref() != Some(alias.name.as_str()) {
                node.flags.remove(SymbolFlags::EXPORTED);
            }
            self.declare(cx, classes, node, alias.span);
        }
    }

    fn bind_function(&mut self, cx: &mut PassCx<'a>, def: &'a FunctionDef, classes: &[String]) {
        let module = cx.module.name;
        let scope = Scope::class_body(module, classes);
        let none = BTreeSet::new();
        for decorator in &def.decorators {
            self.check_loads(cx, decorator, scope, &none);
        }
        for default in def.params.iter().filter_map(|p| p.default.as_ref()) {
            self.check_loads(cx, default, scope, &none);
        }

        let env = self.env();
        let class = scope.class_fullname().and_then(|c| env.class(&c));
        let mut ta = TypeAnalyzer::new(&env, scope, cx.final_mode, cx.module.is_stub);
        let signature = function_signature(&mut ta, def, class);
        let in_class = class.is_some();
        cx.absorb(ta);

        let fullname = scope.fullname(&def.name);
        let line = cx.line(def.span);
        let node = if in_class && method_kind(def) == MethodKind::Property {
            SymbolNode::new(def.name.clone(), fullname, SymbolKind::Variable, line)
                .with_type(signature.ret)
                .with_flags(SymbolFlags::EXPLICIT_TYPE)
        } else {
            let flags = match method_kind(def) {
                MethodKind::Static if in_class => SymbolFlags::STATICMETHOD,
                MethodKind::Class if in_class => SymbolFlags::CLASSMETHOD,
                _ => SymbolFlags::empty(),
            };
            SymbolNode::new(def.name.clone(), fullname, SymbolKind::Function, line)
                .with_type(Type::Callable(Box::new(signature)))
                .with_flags(flags)
        };
        self.declare(cx, classes, node, def.name_span);
        cx.bodies.push((def, classes.to_vec()));
    }

    fn bind_class(&mut self, cx: &mut PassCx<'a>, def: &'a ClassDef, classes: &[String]) {
        let module = cx.module.name;
        let scope = Scope::class_body(module, classes);
        let fullname = scope.fullname(&def.name);
        let none = BTreeSet::new();
        for decorator in &def.decorators {
            self.check_loads(cx, decorator, scope, &none);
        }
        for keyword in &def.keywords {
            self.check_loads(cx, &keyword.value, scope, &none);
        }

        let env = self.env();
        let mut ta = TypeAnalyzer::new(&env, scope, cx.final_mode, cx.module.is_stub);
        let mut bases: Vec<Instance> = Vec::new();
        let mut base_spans: Vec<Span> = Vec::new();
        let mut declared_vars: Option<Vec<TypeVarDef>> = None;
        let mut fallback_to_any = false;
        let mut pending = false;
        for base in &def.bases {
            match ta.analyze_base(base) {
                BaseType::Instance(inst) => {
                    bases.push(inst);
                    base_spans.push(base.span());
                }
                BaseType::Generic(vars) => declared_vars = Some(vars),
                BaseType::Any | BaseType::Invalid => fallback_to_any = true,
                BaseType::Pending => pending = true,
            }
        }
        cx.absorb(ta);

        // every base needs a complete MRO before this class can have one
        let mut base_mros = Vec::with_capacity(bases.len());
        for (base, span) in bases.iter().zip(base_spans) {
            match env.class(&base.class) {
                Some(info) if info.is_ready() => base_mros.push(info.mro.clone()),
                _ if cx.final_mode => base_mros.push(vec![base.class.clone()]),
                _ => {
                    pending = true;
                    cx.defer(short_name(&base.class), span);
                }
            }
        }

        let type_vars = declared_vars.unwrap_or_else(|| {
            let mut vars = Vec::new();
            for base in &bases {
                Type::Instance(base.clone()).collect_type_vars(&mut vars);
            }
            vars
        });

        let mut mro_error = None;
        let mro = if pending && !cx.final_mode {
            Vec::new()
        } else if fullname == OBJECT {
            vec![OBJECT.to_string()]
        } else if bases.is_empty() {
            bases.push(Instance {
                class: OBJECT.to_string(),
                args: Vec::new(),
            });
            vec![fullname.clone(), OBJECT.to_string()]
        } else {
            let names: Vec<String> = bases.iter().map(|b| b.class.clone()).collect();
            mro::linearize(&fullname, &names, &base_mros).unwrap_or_else(|err| {
                mro_error = Some(err.to_string());
                mro::fallback(&fullname, &base_mros)
            })
        };
        if let Some(message) = mro_error {
            cx.reporter.report_error(DiagnosticKind::Type, def.name_span, message);
        }

        let mut info = ClassInfo::new(fullname.clone());
        info.bases = bases;
        info.mro = mro;
        info.type_vars = type_vars;
        info.fallback_to_any = fallback_to_any;
        let line = cx.line(def.span);

        // keep members collected in earlier passes
        if let Some(existing) = scope_table_mut(&mut self.tables, module, classes)
            .and_then(|t| t.lookup_mut(&def.name))
            .filter(|n| n.line == line)
        {
            if let Some(old) = existing.class.as_mut() {
                info.members = std::mem::take(&mut old.members);
            }
        }
        let mut node = SymbolNode::new(def.name.clone(), fullname, SymbolKind::Class, line);
        node.class = Some(Box::new(info));
        self.declare(cx, classes, node, def.name_span);

        let mut inner = classes.to_vec();
        inner.push(def.name.clone());
        self.visit_block(cx, &def.body, &inner);
    }

    fn bind_assignment(&mut self, cx: &mut PassCx<'a>, targets: &'a [Expr], value: &'a Expr, span: Span, classes: &[String]) {
        let module = cx.module.name;
        let scope = Scope::class_body(module, classes);
        let pending = self.check_loads(cx, value, scope, &BTreeSet::new());
        if pending {
            for target in targets {
                self.bind_target(cx, target, None, true, classes);
            }
            return;
        }

        if let [Expr::Name { id, span: target_span }] = targets {
            if let Some(def) = self.type_var_declaration(cx, id, value, scope) {
                let node = SymbolNode::new(id.clone(), def.fullname.clone(), SymbolKind::TypeVar, cx.line(span))
                    .with_type(Type::TypeVar(def));
                self.declare(cx, classes, node, *target_span);
                return;
            }
            match self.type_alias(cx, value, scope) {
                AliasOutcome::Alias(ty) => {
                    let node = SymbolNode::new(id.clone(), scope.fullname(id), SymbolKind::TypeAlias, cx.line(span))
                        .with_type(ty);
                    self.declare(cx, classes, node, *target_span);
                    return;
                }
                AliasOutcome::Pending => {
                    self.bind_target(cx, &targets[0], None, true, classes);
                    return;
                }
                AliasOutcome::NotAlias => {}
            }
        }

        let inferred = {
            let env = self.env();
            infer_simple(&env, scope, value)
        };
        for target in targets {
            let ty = if targets.len() == 1 { inferred.clone() } else { None };
            self.bind_target(cx, target, ty, false, classes);
        }
    }

    /// `T = TypeVar("T", covariant=True)`
    fn type_var_declaration(&mut self, cx: &mut PassCx<'a>, name: &str, value: &Expr, scope: Scope<'_>) -> Option<TypeVarDef> {
        let Expr::Call { func, args, span } = value else {
            return None;
        };
        let env = self.env();
        let is_type_var = match func.as_ref() {
            Expr::Name { id, .. } => matches!(scope.lookup(&env, id), Lookup::Found(n) if n.fullname == "typing.TypeVar"),
            Expr::Attribute { value, attr, .. } if attr == "TypeVar" => {
                matches!(value.dotted_name().as_deref(), Some("typing"))
            }
            _ => false,
        };
        if !is_type_var {
            return None;
        }
        let mut variance = Variance::Invariant;
        let mut declared_name = None;
        for arg in args {
            match (arg.name.as_deref(), &arg.value) {
                (None, Expr::Str { value, .. }) if declared_name.is_none() => declared_name = Some(value.clone()),
                (Some("covariant"), Expr::Bool { value: true, .. }) => variance = Variance::Covariant,
                (Some("contravariant"), Expr::Bool { value: true, .. }) => variance = Variance::Contravariant,
                _ => {}
            }
        }
        if let Some(declared) = declared_name.as_deref().filter(|d| *d != name) {
            cx.reporter.report_error(
                DiagnosticKind::Type,
                *span,
                format!(
                    "String argument 1 \"{}\" to TypeVar(...) does not match variable name \"{}\"",
                    declared, name
                ),
            );
        }
        Some(TypeVarDef {
            name: name.to_string(),
            fullname: scope.fullname(name),
            variance,
        })
    }

    fn type_alias(&mut self, cx: &mut PassCx<'a>, value: &Expr, scope: Scope<'_>) -> AliasOutcome {
        let candidate = match value {
            Expr::Name { .. } | Expr::Attribute { .. } | Expr::Subscript { .. } => true,
            Expr::BinOp { op, .. } => *op == pyxis_syntax::BinOp::BitOr,
            _ => false,
        };
        if !candidate {
            return AliasOutcome::NotAlias;
        }
        let env = self.env();
        let mut ta = TypeAnalyzer::new(&env, scope, cx.final_mode, cx.module.is_stub);
        let ty = ta.analyze(value);
        if !ta.errors.is_empty() {
            return AliasOutcome::NotAlias;
        }
        if !ta.deferred.is_empty() {
            cx.absorb(ta);
            return AliasOutcome::Pending;
        }
        match ty {
            Type::Instance(_) | Type::Union(_) | Type::Callable(_) | Type::ClassObject(_) => AliasOutcome::Alias(ty),
            Type::Any(AnyKind::Explicit) => AliasOutcome::Alias(ty),
            _ => AliasOutcome::NotAlias,
        }
    }

    fn bind_annotated(&mut self, cx: &mut PassCx<'a>, target: &'a Expr, annotation: &'a Expr, value: Option<&'a Expr>, classes: &[String]) {
        let module = cx.module.name;
        let scope = Scope::class_body(module, classes);
        let none = BTreeSet::new();
        if let Some(value) = value {
            self.check_loads(cx, value, scope, &none);
        }
        let ty = {
            let env = self.env();
            let mut ta = TypeAnalyzer::new(&env, scope, cx.final_mode, cx.module.is_stub);
            let ty = ta.analyze(annotation);
            cx.absorb(ta);
            ty
        };
        match target {
            Expr::Name { id, span } => {
                let node = SymbolNode::new(id.clone(), scope.fullname(id), SymbolKind::Variable, cx.line(*span))
                    .with_type(ty)
                    .with_flags(SymbolFlags::EXPLICIT_TYPE);
                self.declare(cx, classes, node, *span);
            }
            other => {
                self.check_loads(cx, other, scope, &none);
            }
        }
    }

    /// Bind assignment targets: names become variables, anything else is a load
    fn bind_target(&mut self, cx: &mut PassCx<'a>, target: &Expr, ty: Option<Type>, placeholder: bool, classes: &[String]) {
        let module = cx.module.name;
        match target {
            Expr::Name { id, span } => {
                let scope = Scope::class_body(module, classes);
                let kind = if placeholder {
                    SymbolKind::Placeholder
                } else {
                    SymbolKind::Variable
                };
                let mut node = SymbolNode::new(id.clone(), scope.fullname(id), kind, cx.line(*span));
                node.ty = ty;
                self.declare(cx, classes, node, *span);
            }
            Expr::Tuple { elts, .. } | Expr::List { elts, .. } => {
                for elt in elts {
                    self.bind_target(cx, elt, None, placeholder, classes);
                }
            }
            other => {
                let scope = Scope::class_body(module, classes);
                self.check_loads(cx, other, scope, &BTreeSet::new());
            }
        }
    }

    fn visit_function(&mut self, cx: &mut PassCx<'a>, def: &'a FunctionDef, classes: &[String], outer: &BTreeSet<String>, is_method: bool) {
        let mut locals = outer.clone();
        locals.extend(def.params.iter().map(|p| p.name.clone()));
        collect_assigned(&def.body, &mut locals);
        let mut globals = BTreeSet::new();
        collect_globals(&def.body, &mut globals);
        for name in &globals {
            locals.remove(name);
        }
        let self_name = if is_method && method_kind(def) != MethodKind::Static {
            def.params.first().map(|p| p.name.as_str())
        } else {
            None
        };
        let body = FunctionBody {
            def,
            classes,
            locals: &locals,
            self_name,
        };
        self.visit_function_block(cx, &body, &def.body);
    }

    fn visit_function_block(&mut self, cx: &mut PassCx<'a>, fun: &FunctionBody<'_, 'a>, body: &'a [Stmt]) {
        let module = cx.module.name;
        let scope = Scope::function_body(module, fun.classes);
        for stmt in body {
            match stmt {
                Stmt::FunctionDef(inner) => {
                    for expr in inner.decorators.iter().chain(inner.params.iter().filter_map(|p| p.default.as_ref())) {
                        self.check_loads(cx, expr, scope, fun.locals);
                    }
                    {
                        let env = self.env();
                        let mut ta = TypeAnalyzer::new(&env, scope, cx.final_mode, cx.module.is_stub);
                        function_signature(&mut ta, inner, None);
                        cx.absorb(ta);
                    }
                    self.visit_function(cx, inner, fun.classes, fun.locals, false);
                }
                Stmt::ClassDef(inner) => {
                    for base in &inner.bases {
                        self.check_loads(cx, base, scope, fun.locals);
                    }
                    self.visit_function_block(cx, fun, &inner.body);
                }
                Stmt::Assign { targets, value, span } => {
                    self.check_loads(cx, value, scope, fun.locals);
                    for target in targets {
                        if !self.bind_instance_attr(cx, fun, target, None, Some(value), *span) {
                            self.check_target_loads(cx, target, scope, fun.locals);
                        }
                    }
                }
                Stmt::AnnAssign {
                    target,
                    annotation,
                    value,
                    span,
                } => {
                    if let Some(value) = value {
                        self.check_loads(cx, value, scope, fun.locals);
                    }
                    let ty = {
                        let env = self.env();
                        let mut ta = TypeAnalyzer::new(&env, scope, cx.final_mode, cx.module.is_stub);
                        let ty = ta.analyze(annotation);
                        cx.absorb(ta);
                        ty
                    };
                    if !self.bind_instance_attr(cx, fun, target, Some(ty), None, *span) {
                        self.check_target_loads(cx, target, scope, fun.locals);
                    }
                }
                Stmt::AugAssign { target, value, .. } => {
                    self.check_loads(cx, target, scope, fun.locals);
                    self.check_loads(cx, value, scope, fun.locals);
                }
                Stmt::Return { value: Some(value), .. }
                | Stmt::Raise { exc: Some(value), .. }
                | Stmt::Expr { value, .. } => {
                    self.check_loads(cx, value, scope, fun.locals);
                }
                Stmt::Assert { test, msg, .. } => {
                    self.check_loads(cx, test, scope, fun.locals);
                    if let Some(msg) = msg {
                        self.check_loads(cx, msg, scope, fun.locals);
                    }
                }
                Stmt::If(s) => {
                    self.check_loads(cx, &s.test, scope, fun.locals);
                    self.visit_function_block(cx, fun, &s.body);
                    self.visit_function_block(cx, fun, &s.orelse);
                }
                Stmt::While(s) => {
                    self.check_loads(cx, &s.test, scope, fun.locals);
                    self.visit_function_block(cx, fun, &s.body);
                    self.visit_function_block(cx, fun, &s.orelse);
                }
                Stmt::For(s) => {
                    self.check_loads(cx, &s.iter, scope, fun.locals);
                    self.visit_function_block(cx, fun, &s.body);
                    self.visit_function_block(cx, fun, &s.orelse);
                }
                Stmt::Import(_)
                | Stmt::ImportFrom(_)
                | Stmt::Return { value: None, .. }
                | Stmt::Raise { exc: None, .. }
                | Stmt::Global { .. }
                | Stmt::Pass(_)
                | Stmt::Break(_)
                | Stmt::Continue(_) => {}
            }
        }
    }

    fn check_target_loads(&mut self, cx: &mut PassCx<'a>, target: &Expr, scope: Scope<'_>, locals: &BTreeSet<String>) {
        match target {
            Expr::Name { .. } => {}
            Expr::Tuple { elts, .. } | Expr::List { elts, .. } => {
                for elt in elts {
                    self.check_target_loads(cx, elt, scope, locals);
                }
            }
            other => {
                self.check_loads(cx, other, scope, locals);
            }
        }
    }

    /// `self.x = ...` inside a method defines an instance attribute
    fn bind_instance_attr(
        &mut self,
        cx: &mut PassCx<'a>,
        fun: &FunctionBody<'_, 'a>,
        target: &Expr,
        declared: Option<Type>,
        value: Option<&Expr>,
        span: Span,
    ) -> bool {
        let Some(self_name) = fun.self_name else {
            return false;
        };
        let Expr::Attribute { value: receiver, attr, .. } = target else {
            return false;
        };
        if !matches!(receiver.as_ref(), Expr::Name { id, .. } if id == self_name) {
            return false;
        }
        let module = cx.module.name;
        let class_scope = Scope::class_body(module, fun.classes);
        let (class_level, ty) = {
            let env = self.env();
            let class_level = class_scope
                .class_table(&env)
                .and_then(|t| t.lookup(attr))
                .map_or(false, |n| !n.flags.contains(SymbolFlags::INSTANCE_ATTR));
            let ty = match declared {
                Some(ty) => Some(ty),
                None => value.and_then(|v| infer_in_function(&env, module, fun, v)),
            };
            (class_level, ty)
        };
        if class_level {
            return true;
        }
        let fullname = class_scope.fullname(attr);
        let mut flags = SymbolFlags::INSTANCE_ATTR;
        if value.is_none() {
            flags |= SymbolFlags::EXPLICIT_TYPE;
        }
        let mut node = SymbolNode::new(attr.clone(), fullname, SymbolKind::Variable, cx.line(span)).with_flags(flags);
        node.ty = ty;
        self.declare(cx, fun.classes, node, span);
        true
    }
}

enum AliasOutcome {
    Alias(Type),
    Pending,
    NotAlias,
}

struct FunctionBody<'f, 'a> {
    def: &'a FunctionDef,
    classes: &'f [String],
    locals: &'f BTreeSet<String>,
    /// First parameter of a method
    self_name: Option<&'f str>,
}

/// Simple inference inside a method; parameters use their annotation
fn infer_in_function(env: &Env<'_>, module: &str, fun: &FunctionBody<'_, '_>, value: &Expr) -> Option<Type> {
    let scope = Scope::function_body(module, fun.classes);
    if let Expr::Name { id, .. } = value {
        if fun.locals.contains(id) {
            let param = fun.def.params.iter().find(|p| &p.name == id)?;
            let annotation = param.annotation.as_ref()?;
            let mut ta = TypeAnalyzer::new(env, scope, true, false);
            let ty = ta.analyze(annotation);
            return (ta.errors.is_empty() && !ty.has_unresolved()).then_some(ty);
        }
    }
    infer_simple(env, scope, value)
}

/// Type of an unannotated assignment when it is obvious without checking
pub(crate) fn infer_simple(env: &Env<'_>, scope: Scope<'_>, value: &Expr) -> Option<Type> {
    let ty = match value {
        Expr::Int { .. } => Type::named(INT),
        Expr::Float { .. } => Type::named(FLOAT),
        Expr::Str { .. } => Type::named(STR),
        Expr::Bytes { .. } => Type::named(BYTES),
        Expr::Bool { .. } => Type::named(BOOL),
        Expr::Call { func, .. } => {
            let Expr::Name { id, .. } = func.as_ref() else {
                return None;
            };
            let Lookup::Found(node) = scope.lookup(env, id) else {
                return None;
            };
            let node = env.resolve_node(node);
            let info = node.class.as_ref()?;
            if !info.type_vars.is_empty() {
                return None;
            }
            Type::named(&info.fullname)
        }
        Expr::Name { id, .. } => {
            let Lookup::Found(node) = scope.lookup(env, id) else {
                return None;
            };
            let node = env.resolve_node(node);
            if node.kind != SymbolKind::Variable || !node.flags.contains(SymbolFlags::EXPLICIT_TYPE) {
                return None;
            }
            node.ty.clone()?
        }
        _ => return None,
    };
    (!ty.has_unresolved()).then_some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{check_program, check_sources, check_sources_with, rendered};
    use crate::types::Instance;

    fn class_instance(fullname: &str) -> Type {
        Type::Instance(Instance {
            class: fullname.to_string(),
            args: Vec::new(),
        })
    }

    #[test]
    fn test_forward_reference_resolves() {
        let diagnostics = check_program(
            "def make() -> C:\n    return C()\n\nclass C:\n    def other(self) -> D:\n        return D()\n\nclass D:\n    pass\n",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_undefined_name_reported_once() {
        assert_eq!(check_program("x = y\n"), vec!["1:5: error: Name \"y\" is not defined"]);
        assert_eq!(
            check_program("def f() -> int:\n    return missing\n"),
            vec!["2:12: error: Name \"missing\" is not defined"]
        );
    }

    #[test]
    fn test_redefinition_conflict() {
        let diagnostics = check_program("def f() -> None:\n    pass\n\nclass f:\n    pass\n");
        assert_eq!(diagnostics, vec!["4:7: error: Name \"f\" already defined on line 1"]);
    }

    #[test]
    fn test_import_cycle_stabilizes_in_two_passes() {
        let outcome = check_sources(&[
            ("a", "from b import B\n\nclass A:\n    def partner(self) -> B:\n        return B()\n"),
            ("b", "from a import A\n\nclass B:\n    owner: A\n"),
        ]);
        assert!(outcome.passes <= 2, "passes = {}", outcome.passes);
        assert!(rendered(&outcome, "a").is_empty());
        assert!(rendered(&outcome, "b").is_empty());

        let a = &outcome.modules[0].table;
        let class_a = a.lookup("A").unwrap().class.as_ref().unwrap();
        let partner = class_a.members.lookup("partner").unwrap().ty.clone();
        match partner {
            Some(Type::Callable(callable)) => assert_eq!(callable.ret, class_instance("b.B")),
            other => panic!("unexpected partner type {:?}", other),
        }

        let b = &outcome.modules[1].table;
        let class_b = b.lookup("B").unwrap().class.as_ref().unwrap();
        assert_eq!(class_b.members.lookup("owner").unwrap().ty, Some(class_instance("a.A")));
        assert!(outcome.modules.iter().all(|m| m.state == AnalysisState::TypeChecked));
    }

    /// Module `m{i}` defines `C{i}`, derived from the class of the next or
    /// previous module, and every module takes part in one import cycle
    fn cyclic_hierarchy(size: usize, forward: bool) -> Vec<(String, String)> {
        (0..size)
            .map(|i| {
                let name = format!("m{}", i);
                let mut source = String::new();
                let base = if forward {
                    (i + 1 < size).then(|| i + 1)
                } else {
                    i.checked_sub(1)
                };
                match base {
                    Some(b) => source.push_str(&format!("from m{} import C{}\n", b, b)),
                    None => source.push_str(&format!("import m{}\n", if forward { 0 } else { size - 1 })),
                }
                let parent = base.map(|b| format!("C{}", b)).unwrap_or_else(|| "object".to_string());
                source.push_str(&format!("\nclass C{}({}):\n    pass\n", i, parent));
                (name, source)
            })
            .collect()
    }

    #[test]
    fn test_cyclic_hierarchies_converge() {
        for size in 2..=6 {
            for forward in [false, true] {
                let sources = cyclic_hierarchy(size, forward);
                let borrowed: Vec<(&str, &str)> =
                    sources.iter().map(|(n, s)| (n.as_str(), s.as_str())).collect();
                let outcome = check_sources(&borrowed);
                assert!(
                    outcome.passes <= size as u32 + 2,
                    "size {} forward {}: {} passes",
                    size,
                    forward,
                    outcome.passes
                );
                for module in &outcome.modules {
                    assert!(module.diagnostics.is_empty(), "{}: {:?}", module.name, module.diagnostics);
                    assert_eq!(module.state, AnalysisState::TypeChecked);
                }
                let first = outcome.modules[0].table.lookup("C0").unwrap();
                assert!(first.class.as_ref().unwrap().is_ready());
            }
        }
    }

    #[test]
    fn test_forward_chain_in_one_module_settles_in_one_pass() {
        let classes = "class D(C):\n    pass\n\nclass C(B):\n    pass\n\nclass B(A):\n    pass\n\nclass A:\n    pass\n";
        let outcome = check_sources(&[("m", classes)]);
        let module = &outcome.modules[0];
        assert!(module.diagnostics.is_empty(), "{:?}", module.diagnostics);
        assert_eq!(outcome.passes, 1);
        assert_eq!(module.state, AnalysisState::TypeChecked);
        let d = module.table.lookup("D").unwrap().class.as_ref().unwrap();
        assert_eq!(d.mro, vec!["m.D", "m.C", "m.B", "m.A", OBJECT]);

        let outcome = check_sources(&[("m", "a = b\nb = c\nc = d\nd: int = 1\n")]);
        let module = &outcome.modules[0];
        assert!(
            module.diagnostics.iter().all(|d| d.kind != DiagnosticKind::Internal),
            "{:?}",
            module.diagnostics
        );
        assert_eq!(module.state, AnalysisState::TypeChecked);
    }

    /// `A -> B -> C -> D` with the links alternating between two modules
    const ZIGZAG: [(&str, &str); 2] = [
        ("m0", "from m1 import B, D\n\nclass A(B):\n    pass\n\nclass C(D):\n    pass\n"),
        ("m1", "from m0 import C\n\nclass B(C):\n    pass\n\nclass D:\n    pass\n"),
    ];

    #[test]
    fn test_pass_cap_is_an_internal_error() {
        let options = AnalysisOptions {
            extra_pass_budget: 0,
            ..AnalysisOptions::default()
        };
        let outcome = check_sources_with(&ZIGZAG, &options);
        let internal: Vec<_> = outcome.modules[0]
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Internal)
            .collect();
        assert_eq!(internal.len(), 1, "{:?}", outcome.modules[0].diagnostics);
        assert!(internal[0]
            .message
            .contains("maximum semantic analysis iteration count reached (2 passes)"));
        assert_eq!(outcome.modules[0].state, AnalysisState::Stable);
        assert!(outcome.modules[1].diagnostics.is_empty(), "{:?}", outcome.modules[1].diagnostics);

        let outcome = check_sources(&ZIGZAG);
        assert_eq!(outcome.passes, 3);
        for module in &outcome.modules {
            assert!(module.diagnostics.is_empty(), "{}: {:?}", module.name, module.diagnostics);
        }
    }

    #[test]
    fn test_type_var_name_must_match() {
        let diagnostics = check_program("from typing import TypeVar\n\nT = TypeVar(\"U\")\n");
        assert_eq!(
            diagnostics,
            vec!["3:5: error: String argument 1 \"U\" to TypeVar(...) does not match variable name \"T\""]
        );
    }

    #[test]
    fn test_type_alias_expands() {
        let diagnostics = check_program(
            "from typing import Optional\n\nMaybeInt = Optional[int]\n\ndef f(x: MaybeInt) -> int:\n    if x is None:\n        return 0\n    return x\n",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_builtin_generics_are_version_gated() {
        let source = "def f(xs: list[int]) -> int:\n    return len(xs)\n";
        let old = AnalysisOptions {
            python_version: (3, 8),
            ..AnalysisOptions::default()
        };
        let outcome = check_sources_with(&[("m", source)], &old);
        assert_eq!(
            rendered(&outcome, "m"),
            vec!["1:11: error: \"list\" is not subscriptable, use \"typing.List\" instead"]
        );
        assert!(check_program(source).is_empty());

        let union = "def g(x: int | None) -> None:\n    pass\n";
        let old = AnalysisOptions {
            python_version: (3, 9),
            ..AnalysisOptions::default()
        };
        let outcome = check_sources_with(&[("m", union)], &old);
        let diagnostics = rendered(&outcome, "m");
        assert_eq!(diagnostics.len(), 1, "{:?}", diagnostics);
        assert!(diagnostics[0].contains("X | Y syntax for unions requires Python 3.10 or newer"));
    }
}
