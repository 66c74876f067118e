//! Main type checker
//!
//! Runs over one module whose symbol table is stable. Statements are walked
//! in order; a [`Binder`] tracks narrowed types per branch. Every bad
//! expression produces one diagnostic and an `Any` type, so checking
//! continues with the rest of the module.

use crate::binder::{Binder, Frame};
use crate::diagnostics::{messages, Diagnostic, DiagnosticKind, DiagnosticReporter};
use crate::env::Env;
use crate::join::simplify_union;
use crate::scope::Scope;
use crate::semanal::{collect_globals, function_signature, method_kind, MethodKind, SccModule};
use crate::subtype::is_subtype;
use crate::symbols::{ClassInfo, SymbolFlags, SymbolKind, SymbolNode, SymbolTable};
use crate::typeanal::TypeAnalyzer;
use crate::types::*;
use pyxis_syntax::{BoolOp, CmpOp, Expr, ForStmt, FunctionDef, HasSpan, IfStmt, Span, Stmt, UnaryOp, WhileStmt};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

/// A type inferred for a variable that was declared without one
#[derive(Debug, Clone, PartialEq)]
pub struct InferredType {
    /// Enclosing classes inside the module, outermost first
    pub classes: Vec<String>,
    pub name: String,
    pub ty: Type,
}

/// Result of checking one module
#[derive(Debug)]
pub struct CheckOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub inferred: Vec<InferredType>,
    /// An internal error stopped the check
    pub aborted: bool,
}

/// Narrowings that hold when a condition is true (or false)
pub(crate) type TypeMap = Vec<(String, Type)>;

pub(crate) struct FunctionFrame {
    pub(crate) locals: HashMap<String, Type>,
    pub(crate) globals: BTreeSet<String>,
    pub(crate) ret: Type,
    /// First parameter of a method
    pub(crate) self_name: Option<String>,
}

/// Type check one module
pub fn check_module(env: &Env<'_>, module: SccModule<'_>) -> CheckOutput {
    let mut checker = TypeChecker::new(env, module);
    checker.check_block(&module.ast.body);
    checker.finish()
}

pub struct TypeChecker<'e, 'a> {
    pub(crate) env: &'e Env<'a>,
    pub(crate) module: SccModule<'a>,
    pub(crate) reporter: DiagnosticReporter<'a>,
    pub(crate) binder: Binder,
    pub(crate) functions: Vec<FunctionFrame>,
    pub(crate) classes: Vec<String>,
    inferred: Vec<InferredType>,
    /// Inferred types by fullname, for reads later in the module
    pub(crate) inferred_by_name: HashMap<String, Type>,
    /// One entry per open loop: whether it has a `break`
    loops: Vec<bool>,
    pub(crate) aborted: bool,
}

impl<'e, 'a> TypeChecker<'e, 'a> {
    pub fn new(env: &'e Env<'a>, module: SccModule<'a>) -> Self {
        TypeChecker {
            env,
            module,
            reporter: DiagnosticReporter::new(module.name, module.lines),
            binder: Binder::new(),
            functions: Vec::new(),
            classes: Vec::new(),
            inferred: Vec::new(),
            inferred_by_name: HashMap::new(),
            loops: Vec::new(),
            aborted: false,
        }
    }

    pub fn finish(self) -> CheckOutput {
        debug!(
            module = self.module.name,
            inferred = self.inferred.len(),
            aborted = self.aborted,
            "module type checked"
        );
        CheckOutput {
            diagnostics: self.reporter.finish(),
            inferred: self.inferred,
            aborted: self.aborted,
        }
    }

    pub(crate) fn error(&mut self, span: Span, message: impl Into<String>) -> Type {
        self.reporter.report_error(DiagnosticKind::Type, span, message);
        Type::from_error()
    }

    /// Report a broken invariant and stop checking this module
    pub(crate) fn internal(&mut self, span: Span, message: impl fmt::Display) -> Type {
        self.reporter.report_internal(span, message);
        self.aborted = true;
        Type::from_error()
    }

    pub(crate) fn scope(&self) -> Scope<'_> {
        Scope {
            module: self.module.name,
            classes: &self.classes,
            in_function: !self.functions.is_empty(),
        }
    }

    /// Type of an annotation; problems were already reported by semantic analysis
    pub(crate) fn analyze_annotation(&self, expr: &Expr) -> Type {
        let mut ta = TypeAnalyzer::new(self.env, self.scope(), true, self.module.is_stub);
        ta.analyze(expr)
    }

    fn current_class(&self) -> Option<&'a ClassInfo> {
        let class = self.scope().class_fullname()?;
        self.env.class(&class)
    }

    /// Table of the innermost module or class scope
    fn current_table(&self) -> Option<&'a SymbolTable> {
        if self.classes.is_empty() {
            self.env.module(self.module.name)
        } else {
            Scope::class_body(self.module.name, &self.classes).class_table(self.env)
        }
    }

    fn record_inferred(&mut self, classes: Vec<String>, node: &SymbolNode, ty: Type) {
        debug!(name = %node.fullname, ty = %ty, "inferred variable type");
        self.inferred_by_name.insert(node.fullname.clone(), ty.clone());
        self.inferred.push(InferredType {
            classes,
            name: node.name.clone(),
            ty,
        });
    }

    /// Type check a block of statements
    pub(crate) fn check_block(&mut self, body: &[Stmt]) {
        for stmt in body {
            if self.aborted || self.binder.is_unreachable() {
                break;
            }
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Import(_) | Stmt::ImportFrom(_) | Stmt::Global { .. } | Stmt::Pass(_) => {}
            Stmt::FunctionDef(def) => self.check_function_def(def),
            Stmt::ClassDef(def) => {
                // classes nested in functions are bound but not checked
                if self.functions.is_empty() {
                    self.classes.push(def.name.clone());
                    self.check_block(&def.body);
                    self.classes.pop();
                }
            }
            Stmt::Assign { targets, value, .. } => self.check_assignment(targets, value),
            Stmt::AnnAssign {
                target,
                annotation,
                value,
                ..
            } => self.check_annotated_assignment(target, annotation, value.as_ref()),
            Stmt::AugAssign { target, op, value, span } => {
                let left = self.expr_type(target, None);
                let right = self.expr_type(value, None);
                let result = self.check_binary_op(*op, &left, &right, *span);
                self.assign_to(target, result, Some(value));
            }
            Stmt::Return { value, span } => self.check_return(value.as_ref(), *span),
            Stmt::If(s) => self.check_if(s),
            Stmt::While(s) => self.check_while(s),
            Stmt::For(s) => self.check_for(s),
            Stmt::Raise { exc, .. } => {
                if let Some(exc) = exc {
                    let ty = self.expr_type(exc, None);
                    let base = Instance {
                        class: "builtins.BaseException".to_string(),
                        args: Vec::new(),
                    };
                    let ok = is_subtype(self.env, &ty, &Type::Instance(base.clone()))
                        || is_subtype(self.env, &ty, &Type::ClassObject(base));
                    if !ok {
                        self.error(exc.span(), messages::BAD_EXCEPTION);
                    }
                }
                self.binder.mark_unreachable();
            }
            Stmt::Assert { test, msg, .. } => {
                let (_, if_true, _) = self.condition_maps(test);
                if let Some(msg) = msg {
                    self.expr_type(msg, None);
                }
                self.apply(if_true);
            }
            Stmt::Expr { value, .. } => {
                self.expr_type(value, None);
            }
            Stmt::Break(_) => {
                if let Some(broke) = self.loops.last_mut() {
                    *broke = true;
                }
                self.binder.mark_unreachable();
            }
            Stmt::Continue(_) => self.binder.mark_unreachable(),
        }
    }

    /// Type check a function definition and, when annotated, its body
    fn check_function_def(&mut self, def: &FunctionDef) {
        let class = if self.functions.is_empty() { self.current_class() } else { None };
        let signature = {
            let mut ta = TypeAnalyzer::new(self.env, self.scope(), true, self.module.is_stub);
            function_signature(&mut ta, def, class)
        };
        if let Some(frame) = self.functions.last_mut() {
            frame
                .locals
                .insert(def.name.clone(), Type::Callable(Box::new(signature.clone())));
        }

        if !self.module.is_stub {
            for (param, formal) in def.params.iter().zip(&signature.params) {
                let (Some(default), Some(_)) = (&param.default, &param.annotation) else {
                    continue;
                };
                let ty = self.expr_type(default, Some(&formal.ty));
                if !is_subtype(self.env, &ty, &formal.ty) {
                    self.error(
                        default.span(),
                        messages::incompatible_default(&param.name, &ty, &formal.ty),
                    );
                }
            }
        }

        let annotated = def.returns.is_some() || def.params.iter().any(|p| p.annotation.is_some());
        if self.module.is_stub || !annotated {
            return;
        }

        let mut locals = HashMap::new();
        for formal in &signature.params {
            let Some(name) = &formal.name else { continue };
            let ty = match formal.kind {
                CallableArgKind::Star => Type::instance(TUPLE, vec![formal.ty.clone()]),
                CallableArgKind::StarStar => Type::instance(DICT, vec![Type::named(STR), formal.ty.clone()]),
                _ => formal.ty.clone(),
            };
            locals.insert(name.clone(), ty);
        }
        let mut globals = BTreeSet::new();
        collect_globals(&def.body, &mut globals);
        let self_name = match class {
            Some(_) if method_kind(def) != MethodKind::Static => def.params.first().map(|p| p.name.clone()),
            _ => None,
        };
        self.functions.push(FunctionFrame {
            locals,
            globals,
            ret: signature.ret.clone(),
            self_name,
        });
        let outer = std::mem::take(&mut self.binder);
        self.check_block(&def.body);
        let falls_off = !self.binder.is_unreachable();
        self.binder = outer;
        self.functions.pop();

        if falls_off && !is_trivial_body(&def.body) && !is_subtype(self.env, &Type::None, &signature.ret) {
            self.error(def.span, messages::MISSING_RETURN);
        }
    }

    /// Type check a return statement against the enclosing signature
    fn check_return(&mut self, value: Option<&Expr>, span: Span) {
        let Some(expected) = self.functions.last().map(|f| f.ret.clone()) else {
            return;
        };
        match value {
            None => {
                if !expected.absorbs_errors() && !is_subtype(self.env, &Type::None, &expected) {
                    self.error(span, messages::RETURN_VALUE_EXPECTED);
                }
            }
            Some(value) => {
                let ty = self.expr_type(value, Some(&expected));
                if expected.is_none() {
                    if !ty.is_none() && !ty.absorbs_errors() {
                        self.error(value.span(), messages::NO_RETURN_VALUE_EXPECTED);
                    }
                } else if !is_subtype(self.env, &ty, &expected) {
                    self.error(value.span(), messages::incompatible_return(&ty, &expected));
                }
            }
        }
        self.binder.mark_unreachable();
    }

    fn check_if(&mut self, s: &IfStmt) {
        let (_, if_true, if_false) = self.condition_maps(&s.test);
        self.binder.push();
        self.apply(if_true);
        self.check_block(&s.body);
        let then = self.binder.pop();
        self.binder.push();
        self.apply(if_false);
        self.check_block(&s.orelse);
        let orelse = self.binder.pop();
        self.merge(vec![then, orelse]);
    }

    fn check_while(&mut self, s: &WhileStmt) {
        let (_, if_true, if_false) = self.condition_maps(&s.test);
        self.loops.push(false);
        self.binder.push();
        self.apply(if_true);
        self.check_block(&s.body);
        let mut body = self.binder.pop();
        let broke = self.loops.pop().unwrap_or(false);
        body.unreachable = false;

        let endless = matches!(s.test, Expr::Bool { value: true, .. });
        if endless {
            // only a `break` leaves the loop
            if broke {
                self.merge(vec![body]);
            } else {
                self.binder.mark_unreachable();
            }
            return;
        }
        self.binder.push();
        self.apply(if_false);
        self.check_block(&s.orelse);
        let exit = self.binder.pop();
        self.merge(vec![body, exit]);
    }

    fn check_for(&mut self, s: &ForStmt) {
        let iterable = self.expr_type(&s.iter, None);
        let item = self.iter_item_type(&iterable, s.iter.span());
        self.loops.push(false);
        self.binder.push();
        self.assign_to(&s.target, item, None);
        self.check_block(&s.body);
        let mut body = self.binder.pop();
        self.loops.pop();
        body.unreachable = false;
        self.binder.push();
        self.check_block(&s.orelse);
        let exit = self.binder.pop();
        self.merge(vec![body, exit]);
    }

    fn apply(&mut self, map: TypeMap) {
        for (key, ty) in map {
            if ty == Type::Never {
                self.binder.mark_unreachable();
            } else {
                self.binder.invalidate(&key);
                self.binder.put(key, ty);
            }
        }
    }

    fn merge(&mut self, branches: Vec<Frame>) {
        let keys: BTreeSet<String> = branches.iter().flat_map(|f| f.keys().cloned()).collect();
        let declared: HashMap<String, Option<Type>> = keys
            .into_iter()
            .map(|key| {
                let ty = self.declared_type(&key);
                (key, ty)
            })
            .collect();
        let lookup = |key: &str| declared.get(key).cloned().flatten();
        self.binder.merge(self.env, branches, &lookup);
    }

    /// Unnarrowed type of a simple name
    fn declared_type(&self, key: &str) -> Option<Type> {
        if key.contains('.') {
            return None;
        }
        for frame in self.functions.iter().rev() {
            if frame.globals.contains(key) {
                break;
            }
            if let Some(ty) = frame.locals.get(key) {
                return Some(ty.clone());
            }
        }
        match self.scope().lookup(self.env, key) {
            crate::scope::Lookup::Found(node) => Some(self.node_value_type(node)),
            _ => None,
        }
    }

    /// Type check `targets = value`
    fn check_assignment(&mut self, targets: &[Expr], value: &Expr) {
        // type variable and alias definitions were handled during binding
        if let [Expr::Name { id, .. }] = targets {
            let definition = self.functions.is_empty()
                && self
                    .current_table()
                    .and_then(|t| t.lookup(id))
                    .map_or(false, |n| matches!(n.kind, SymbolKind::TypeAlias | SymbolKind::TypeVar));
            if definition {
                return;
            }
        }
        let context = targets.first().and_then(|t| self.target_declared_type(t));
        let ty = self.expr_type(value, context.as_ref());
        for target in targets {
            self.assign_to(target, ty.clone(), Some(value));
        }
    }

    fn check_annotated_assignment(&mut self, target: &Expr, annotation: &Expr, value: Option<&Expr>) {
        let declared = self.analyze_annotation(annotation);
        if let (Expr::Name { id, .. }, Some(frame)) = (target, self.functions.last_mut()) {
            frame.locals.insert(id.clone(), declared.clone());
        }
        let Some(value) = value else {
            return;
        };
        if self.module.is_stub && matches!(value, Expr::Ellipsis(_)) {
            return;
        }
        let ty = self.expr_type(value, Some(&declared));
        if !is_subtype(self.env, &ty, &declared) {
            self.error(value.span(), messages::incompatible_assignment(&ty, &declared));
            return;
        }
        if let Some(key) = target.dotted_name() {
            self.binder.invalidate(&key);
            if matches!(declared, Type::Union(_)) {
                self.binder.put(key, ty);
            }
        }
    }

    /// Declared type of an assignment target, used as inference context
    fn target_declared_type(&self, target: &Expr) -> Option<Type> {
        match target {
            Expr::Name { id, .. } => {
                if let Some(frame) = self.functions.last() {
                    if !frame.globals.contains(id) {
                        return frame.locals.get(id).cloned();
                    }
                }
                let node = self.current_table()?.lookup(id)?;
                if node.kind != SymbolKind::Variable {
                    return None;
                }
                self.inferred_by_name.get(&node.fullname).cloned().or_else(|| node.ty.clone())
            }
            _ => None,
        }
    }

    /// Bind `ty` to an assignment target, checking it against the declared type
    pub(crate) fn assign_to(&mut self, target: &Expr, ty: Type, value: Option<&Expr>) {
        let span = value.map(|v| v.span()).unwrap_or_else(|| target.span());
        match target {
            Expr::Name { id, .. } => {
                let local = self.functions.last().filter(|f| !f.globals.contains(id)).is_some();
                let declared = if local {
                    self.functions.last().and_then(|f| f.locals.get(id).cloned())
                } else {
                    let Some(node) = self.current_table().and_then(|t| t.lookup(id)) else {
                        return;
                    };
                    if node.kind != SymbolKind::Variable {
                        return;
                    }
                    let known = self.inferred_by_name.get(&node.fullname).cloned().or_else(|| node.ty.clone());
                    if known.is_none() && !node.flags.contains(SymbolFlags::IMPORTED) {
                        let classes = self.classes.clone();
                        self.record_inferred(classes, node, ty.clone());
                    }
                    known
                };
                match declared {
                    Some(declared) => self.narrow_assigned(id, &declared, ty, span),
                    None => {
                        if let Some(frame) = self.functions.last_mut() {
                            if local {
                                frame.locals.insert(id.clone(), ty);
                            }
                        }
                        self.binder.invalidate(id);
                    }
                }
            }
            Expr::Attribute { value: receiver, attr, .. } => {
                let receiver_ty = self.expr_type(receiver, None);
                if let Some(declared) = self.attribute_declared_type(receiver, &receiver_ty, attr, &ty, target.span()) {
                    let key = target.dotted_name().unwrap_or_default();
                    self.narrow_assigned(&key, &declared, ty, span);
                }
            }
            Expr::Subscript { value: receiver, index, span: target_span } => {
                let receiver_ty = self.expr_type(receiver, None);
                let index_ty = self.expr_type(index, None);
                self.check_index_assignment(&receiver_ty, index_ty, index.span(), ty, span, *target_span);
            }
            Expr::Tuple { elts, .. } | Expr::List { elts, .. } => {
                let item = self.iter_item_type(&ty, span);
                for elt in elts {
                    self.assign_to(elt, item.clone(), None);
                }
            }
            other => {
                self.expr_type(other, None);
            }
        }
    }

    fn narrow_assigned(&mut self, key: &str, declared: &Type, ty: Type, span: Span) {
        if !is_subtype(self.env, &ty, declared) {
            self.error(span, messages::incompatible_assignment(&ty, declared));
            self.binder.invalidate(key);
            return;
        }
        self.binder.invalidate(key);
        if matches!(declared, Type::Union(_)) && !key.is_empty() {
            self.binder.put(key.to_string(), ty);
        }
    }

    /// Declared type of `receiver.attr` for an assignment; instance
    /// attributes first assigned in a method get their type inferred here
    fn attribute_declared_type(
        &mut self,
        receiver: &Expr,
        receiver_ty: &Type,
        attr: &str,
        assigned: &Type,
        span: Span,
    ) -> Option<Type> {
        let self_name = self.functions.last().and_then(|f| f.self_name.as_deref());
        let on_self = matches!(receiver, Expr::Name { id, .. } if Some(id.as_str()) == self_name);
        if let (true, Type::Instance(inst)) = (on_self, receiver_ty) {
            if let Some((owner, node)) = self.env.find_member(&inst.class, attr) {
                let untyped = node.kind == SymbolKind::Variable
                    && node.ty.is_none()
                    && !self.inferred_by_name.contains_key(&node.fullname);
                let prefix = format!("{}.", self.module.name);
                if untyped && node.flags.contains(SymbolFlags::INSTANCE_ATTR) {
                    if let Some(path) = owner.fullname.strip_prefix(&prefix) {
                        let classes = path.split('.').map(str::to_string).collect();
                        self.record_inferred(classes, node, assigned.clone());
                        return None;
                    }
                }
            }
        }
        match self.member_access(receiver_ty, attr, span) {
            Type::Any(_) => None,
            declared => Some(declared),
        }
    }

    /// Narrowing implied by a condition being true and false, plus the
    /// condition's own type
    pub(crate) fn condition_maps(&mut self, test: &Expr) -> (Type, TypeMap, TypeMap) {
        match test {
            Expr::UnaryOp {
                op: UnaryOp::Not,
                operand,
                ..
            } => {
                let (_, if_true, if_false) = self.condition_maps(operand);
                (Type::named(BOOL), if_false, if_true)
            }
            Expr::BoolOp { op, left, right, .. } => {
                let (left_ty, left_true, left_false) = self.condition_maps(left);
                let guard = if *op == BoolOp::And { &left_true } else { &left_false };
                self.binder.push();
                self.apply(guard.clone());
                let (right_ty, right_true, right_false) = self.condition_maps(right);
                self.binder.pop();
                match op {
                    BoolOp::And => {
                        let ty = simplify_union(self.env, vec![left_ty, right_ty]);
                        let mut if_true = left_true;
                        if_true.extend(right_true);
                        (ty, if_true, self.either(left_false, right_false))
                    }
                    BoolOp::Or => {
                        let ty = simplify_union(self.env, vec![left_ty.remove_none(), right_ty]);
                        let mut if_false = left_false;
                        if_false.extend(right_false);
                        (ty, self.either(left_true, right_true), if_false)
                    }
                }
            }
            Expr::Compare {
                left,
                ops,
                comparators,
                ..
            } if ops.len() == 1 && matches!(comparators[0], Expr::NoneLit(_)) => {
                let ty = self.expr_type(test, None);
                let Some(key) = left.dotted_name() else {
                    return (ty, Vec::new(), Vec::new());
                };
                let current = self.expr_type(left, None);
                let none = if is_subtype(self.env, &Type::None, &current) || current.is_any() {
                    Type::None
                } else {
                    Type::Never
                };
                let not_none = current.remove_none();
                match ops[0] {
                    CmpOp::Is | CmpOp::Eq => (ty, vec![(key.clone(), none)], vec![(key, not_none)]),
                    CmpOp::IsNot | CmpOp::NotEq => (ty, vec![(key.clone(), not_none)], vec![(key, none)]),
                    _ => (ty, Vec::new(), Vec::new()),
                }
            }
            Expr::Call { func, args, .. } if args.len() == 2 && self.is_isinstance(func) => {
                let ty = self.expr_type(test, None);
                let Some(key) = args[0].value.dotted_name() else {
                    return (ty, Vec::new(), Vec::new());
                };
                let Some(targets) = self.isinstance_targets(&args[1].value) else {
                    return (ty, Vec::new(), Vec::new());
                };
                let current = self.expr_type(&args[0].value, None);
                let yes = self.restrict_to(&current, &targets);
                let no = self.remove_instances(&current, &targets);
                (ty, vec![(key.clone(), yes)], vec![(key, no)])
            }
            other => {
                let ty = self.expr_type(other, None);
                match other.dotted_name() {
                    Some(key) if ty.contains_none() => (ty.clone(), vec![(key, ty.remove_none())], Vec::new()),
                    _ => (ty, Vec::new(), Vec::new()),
                }
            }
        }
    }

    /// Narrowings that hold whichever of two conditions held
    fn either(&self, a: TypeMap, b: TypeMap) -> TypeMap {
        a.into_iter()
            .filter_map(|(key, ty)| {
                let (_, other) = b.iter().find(|(k, _)| *k == key)?;
                Some((key, simplify_union(self.env, vec![ty, other.clone()])))
            })
            .collect()
    }

    fn is_isinstance(&self, func: &Expr) -> bool {
        let Expr::Name { id, .. } = func else {
            return false;
        };
        match self.scope().lookup(self.env, id) {
            crate::scope::Lookup::Found(node) => self.env.resolve_node(node).fullname == "builtins.isinstance",
            _ => false,
        }
    }

    /// Instance types named by the second argument of `isinstance`
    fn isinstance_targets(&mut self, expr: &Expr) -> Option<Vec<Type>> {
        let exprs: Vec<&Expr> = match expr {
            Expr::Tuple { elts, .. } => elts.iter().collect(),
            other => vec![other],
        };
        let mut targets = Vec::new();
        for expr in exprs {
            match self.expr_type(expr, None) {
                Type::ClassObject(inst) => {
                    let arity = self.env.class(&inst.class).map_or(0, |c| c.type_vars.len());
                    let args = if inst.args.is_empty() {
                        vec![Type::Any(AnyKind::Special); arity]
                    } else {
                        inst.args
                    };
                    targets.push(Type::instance(inst.class, args));
                }
                _ => return None,
            }
        }
        Some(targets)
    }

    fn restrict_to(&self, current: &Type, targets: &[Type]) -> Type {
        if current.is_any() {
            return make_union(targets.to_vec());
        }
        let mut kept = Vec::new();
        for item in current.items() {
            for target in targets {
                if is_subtype(self.env, &item, target) {
                    kept.push(item.clone());
                } else if is_subtype(self.env, target, &item) {
                    kept.push(target.clone());
                }
            }
        }
        simplify_union(self.env, kept)
    }

    fn remove_instances(&self, current: &Type, targets: &[Type]) -> Type {
        if current.is_any() {
            return current.clone();
        }
        let kept = current
            .items()
            .into_iter()
            .filter(|item| !targets.iter().any(|t| is_subtype(self.env, item, t)))
            .collect();
        make_union(kept)
    }
}

/// `pass`, `...`, a docstring or a bare `raise`
fn is_trivial_body(body: &[Stmt]) -> bool {
    body.iter().all(|stmt| {
        matches!(
            stmt,
            Stmt::Pass(_)
                | Stmt::Raise { .. }
                | Stmt::Expr {
                    value: Expr::Ellipsis(_) | Expr::Str { .. },
                    ..
                }
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{check_program, check_sources};

    #[test]
    fn test_bad_argument_keeps_declared_result() {
        let outcome = check_sources(&[(
            "m",
            "def f(x: int) -> str:\n    return \"a\"\n\ny = f(\"no\")\nz: int = f(1)\n",
        )]);
        let diagnostics: Vec<String> = outcome.modules[0].diagnostics.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            diagnostics,
            vec![
                "4:7: error: Argument 1 to \"f\" has incompatible type \"str\"; expected \"int\"",
                "5:10: error: Incompatible types in assignment (expression has type \"str\", variable has type \"int\")",
            ]
        );
        assert_eq!(
            outcome.modules[0].table.lookup("y").unwrap().ty,
            Some(Type::named(crate::types::STR))
        );
    }

    #[test]
    fn test_arity_errors() {
        let diagnostics = check_program(
            "def f(a: int, b: int) -> None:\n    pass\n\nf(1)\nf(1, 2, 3)\nf(1, c=2)\n",
        );
        assert_eq!(
            diagnostics,
            vec![
                "4:1: error: Too few arguments for \"f\"",
                "5:1: error: Too many arguments for \"f\"",
                "6:1: error: Missing positional argument \"b\" in call to \"f\"",
                "6:6: error: Unexpected keyword argument \"c\" for \"f\"",
            ]
        );
    }

    #[test]
    fn test_return_checks() {
        assert_eq!(
            check_program("def f() -> int:\n    return \"s\"\n"),
            vec!["2:12: error: Incompatible return value type (got \"str\", expected \"int\")"]
        );
        assert_eq!(
            check_program("def f(x: int) -> int:\n    if x:\n        return 1\n"),
            vec!["1:1: error: Missing return statement"]
        );
        // stub-like bodies and loops that never exit are fine
        assert!(check_program("def f() -> int:\n    ...\n").is_empty());
        assert!(check_program("def f() -> int:\n    while True:\n        pass\n").is_empty());
    }

    #[test]
    fn test_optional_narrowing() {
        let diagnostics = check_program(
            "from typing import Optional\n\ndef g(x: Optional[int]) -> int:\n    if x is None:\n        return 0\n    return x + 1\n",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let diagnostics = check_program("from typing import Optional\n\ndef h(x: Optional[int]) -> int:\n    return x + 1\n");
        assert_eq!(
            diagnostics,
            vec![
                "4:12: error: Unsupported operand types for + (\"None\" and \"int\")",
                "4:12: note: Left operand is of type \"Optional[int]\"",
            ]
        );
    }

    #[test]
    fn test_isinstance_narrowing() {
        let diagnostics = check_program(
            "from typing import Union\n\ndef f(x: Union[int, str]) -> int:\n    if isinstance(x, int):\n        return x + 1\n    return len(x)\n",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_missing_attribute() {
        let diagnostics = check_program(
            "class A:\n    def __init__(self) -> None:\n        self.x = 1\n\na = A()\na.x\na.y\n",
        );
        assert_eq!(diagnostics, vec!["7:1: error: \"A\" has no attribute \"y\""]);
    }

    #[test]
    fn test_generic_function_inference() {
        let diagnostics = check_program(
            "from typing import TypeVar, List\n\nT = TypeVar(\"T\")\n\ndef first(xs: List[T]) -> T:\n    return xs[0]\n\nn: int = first([1, 2])\ns: str = first([1])\n",
        );
        assert_eq!(
            diagnostics,
            vec!["9:10: error: Incompatible types in assignment (expression has type \"int\", variable has type \"str\")"]
        );
    }

    #[test]
    fn test_generic_class_constructor() {
        let diagnostics = check_program(
            "from typing import Generic, TypeVar\n\nT = TypeVar(\"T\")\n\nclass Box(Generic[T]):\n    def __init__(self, item: T) -> None:\n        self.item = item\n\n    def get(self) -> T:\n        return self.item\n\nb = Box(1)\nv: str = b.get()\n",
        );
        assert_eq!(
            diagnostics,
            vec!["13:10: error: Incompatible types in assignment (expression has type \"int\", variable has type \"str\")"]
        );
    }

    #[test]
    fn test_unknown_receiver_absorbs_errors() {
        let diagnostics = check_program(
            "from nowhere import thing\n\nresult = thing.method(1).attr + 3\nlength: int = thing\n",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }
}
