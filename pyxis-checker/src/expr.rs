//! Expression typing
//!
//! Bottom-up inference of expression types, including call checking with
//! type variable inference, operator methods and attribute access.

use crate::checker::{FunctionFrame, TypeChecker};
use crate::diagnostics::messages;
use crate::env::{class_bindings, TypeContext};
use crate::join::{join, join_all, simplify_union};
use crate::scope::{lookup_module_attr, Lookup};
use crate::subst::{substitute, TypeBindings};
use crate::subtype::is_subtype;
use crate::symbols::{ClassInfo, SymbolFlags, SymbolKind, SymbolNode};
use crate::types::*;
use pyxis_syntax::{Arg, ArgKind, BinOp, CmpOp, Expr, HasSpan, Param, Span, UnaryOp};
use std::collections::{BTreeSet, HashMap};

impl<'e, 'a> TypeChecker<'e, 'a> {
    /// Type of an expression; `context` is the type the surrounding code expects
    pub(crate) fn expr_type(&mut self, expr: &Expr, context: Option<&Type>) -> Type {
        if self.aborted {
            return Type::from_error();
        }
        match expr {
            Expr::Name { id, .. } => self.name_type(id),
            Expr::Int { .. } => Type::named(INT),
            Expr::Float { .. } => Type::named(FLOAT),
            Expr::Str { .. } => Type::named(STR),
            Expr::Bytes { .. } => Type::named(BYTES),
            Expr::Bool { .. } => Type::named(BOOL),
            Expr::NoneLit(_) => Type::None,
            Expr::Ellipsis(_) => Type::Any(AnyKind::Special),
            Expr::Attribute { value, attr, span } => {
                if let Some(narrowed) = expr.dotted_name().and_then(|key| self.binder.narrowed(&key)) {
                    return narrowed;
                }
                let receiver = self.expr_type(value, None);
                self.member_access(&receiver, attr, *span)
            }
            Expr::Subscript { value, index, span } => {
                let receiver = self.expr_type(value, None);
                if let Type::ClassObject(_) = receiver {
                    // generic alias such as `list[int]` used as a value
                    return receiver;
                }
                let index_ty = self.expr_type(index, None);
                self.check_index(&receiver, &index_ty, index.span(), *span)
            }
            Expr::Slice { lower, upper, step, .. } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr_type(part, None);
                }
                Type::named(SLICE)
            }
            Expr::Call { func, args, span } => {
                let callee = self.expr_type(func, None);
                self.check_call(&callee, args, *span)
            }
            Expr::BinOp { left, op, right, span } => {
                let left = self.expr_type(left, None);
                let right = self.expr_type(right, None);
                self.check_binary_op(*op, &left, &right, *span)
            }
            Expr::UnaryOp { op, operand, span } => {
                let ty = self.expr_type(operand, None);
                self.check_unary_op(*op, &ty, *span)
            }
            Expr::BoolOp { .. } => self.condition_maps(expr).0,
            Expr::Compare {
                left,
                ops,
                comparators,
                span,
            } => self.check_compare(left, ops, comparators, *span),
            Expr::IfExp { test, body, orelse, .. } => {
                let (_, if_true, if_false) = self.condition_maps(test);
                let body = self.with_narrowing(if_true, |checker| checker.expr_type(body, context));
                let orelse = self.with_narrowing(if_false, |checker| checker.expr_type(orelse, context));
                join(self.env, &body, &orelse)
            }
            Expr::List { elts, .. } => self.display_type(LIST, elts, context),
            Expr::Set { elts, .. } => self.display_type(SET, elts, context),
            Expr::Tuple { elts, .. } => self.display_type(TUPLE, elts, context),
            Expr::Dict { items, .. } => self.dict_display_type(items, context),
            Expr::Lambda { params, body, .. } => self.lambda_type(params, body),
        }
    }

    fn with_narrowing<T>(&mut self, map: Vec<(String, Type)>, f: impl FnOnce(&mut Self) -> T) -> T {
        self.binder.push();
        for (key, ty) in map {
            self.binder.put(key, ty);
        }
        let result = f(self);
        self.binder.pop();
        result
    }

    fn name_type(&mut self, id: &str) -> Type {
        if let Some(narrowed) = self.binder.narrowed(id) {
            return narrowed;
        }
        for frame in self.functions.iter().rev() {
            if frame.globals.contains(id) {
                break;
            }
            if let Some(ty) = frame.locals.get(id) {
                return ty.clone();
            }
        }
        match self.scope().lookup(self.env, id) {
            Lookup::Found(node) => self.node_value_type(node),
            Lookup::Module(name) => Type::Module(name),
            Lookup::Opaque => Type::Any(AnyKind::MissingImport),
            // already reported during semantic analysis
            Lookup::Pending | Lookup::Missing => Type::from_error(),
        }
    }

    /// Type of the value bound to a symbol
    pub(crate) fn node_value_type(&self, node: &SymbolNode) -> Type {
        let node = self.env.lookup_fullname(&node.fullname).filter(|n| n.kind == node.kind).unwrap_or(node);
        match node.kind {
            SymbolKind::Variable => self
                .inferred_by_name
                .get(&node.fullname)
                .cloned()
                .or_else(|| node.ty.clone())
                .unwrap_or(Type::Any(AnyKind::Unannotated)),
            SymbolKind::Function => node.ty.clone().unwrap_or(Type::Any(AnyKind::Unannotated)),
            SymbolKind::Class => {
                let class = node.class.as_ref().map_or(node.fullname.clone(), |c| c.fullname.clone());
                Type::ClassObject(Instance { class, args: Vec::new() })
            }
            SymbolKind::TypeAlias => match &node.ty {
                Some(Type::Instance(inst)) => Type::ClassObject(inst.clone()),
                _ => Type::Any(AnyKind::Special),
            },
            SymbolKind::ModuleRef => Type::Module(node.fullname.clone()),
            SymbolKind::TypeVar => Type::Any(AnyKind::Special),
            SymbolKind::Placeholder => Type::from_error(),
        }
    }

    /// Type of `receiver.attr`, reporting a missing attribute
    pub(crate) fn member_access(&mut self, receiver: &Type, attr: &str, span: Span) -> Type {
        match receiver {
            Type::Any(_) => receiver.clone(),
            Type::Never => Type::Never,
            Type::Module(module) => match lookup_module_attr(self.env, module, attr) {
                Lookup::Found(node) => self.node_value_type(node),
                Lookup::Module(submodule) => Type::Module(submodule),
                Lookup::Opaque => Type::Any(AnyKind::MissingImport),
                Lookup::Pending => Type::from_error(),
                Lookup::Missing => self.error(span, messages::module_has_no_attribute(module, attr)),
            },
            Type::Union(items) => {
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    match self.lookup_member(item, attr, span) {
                        Some(ty) => results.push(ty),
                        None => {
                            results.push(self.error(span, messages::item_has_no_attribute(item, receiver, attr)));
                        }
                    }
                }
                simplify_union(self.env, results)
            }
            other => match self.lookup_member(other, attr, span) {
                Some(ty) => ty,
                None => self.error(span, messages::has_no_attribute(other, attr)),
            },
        }
    }

    /// Member of a non-union type; `None` when there is no such member
    fn lookup_member(&mut self, receiver: &Type, attr: &str, span: Span) -> Option<Type> {
        match receiver {
            Type::Instance(inst) => self.instance_member(inst, attr, span),
            Type::ClassObject(inst) => self.class_member(inst, attr, span),
            Type::None | Type::TypeVar(_) => self.instance_member(&object_instance(), attr, span),
            Type::Callable(_) => self.instance_member(
                &Instance {
                    class: FUNCTION.to_string(),
                    args: Vec::new(),
                },
                attr,
                span,
            ),
            Type::Union(_) | Type::Module(_) => Some(self.member_access(receiver, attr, span)),
            Type::Never => Some(Type::Never),
            Type::Any(_) => Some(receiver.clone()),
            Type::Unresolved { .. } => Some(Type::from_error()),
        }
    }

    fn instance_member(&mut self, inst: &Instance, attr: &str, span: Span) -> Option<Type> {
        if self.env.class(&inst.class).is_none() {
            return Some(Type::Any(AnyKind::Special));
        }
        let Some((owner, node)) = self.env.find_member(&inst.class, attr) else {
            return self.falls_back_to_any(&inst.class).then_some(Type::Any(AnyKind::Special));
        };
        let raw = self.node_value_type(node);
        let ty = self.map_member(inst, owner, &raw, span);
        if node.kind == SymbolKind::Function && !node.flags.contains(SymbolFlags::STATICMETHOD) {
            return Some(bind_receiver(ty));
        }
        Some(ty)
    }

    fn class_member(&mut self, inst: &Instance, attr: &str, span: Span) -> Option<Type> {
        if self.env.class(&inst.class).is_none() {
            return Some(Type::Any(AnyKind::Special));
        }
        match self.env.find_member(&inst.class, attr) {
            Some((owner, node)) => {
                let raw = self.node_value_type(node);
                let ty = self.map_member(inst, owner, &raw, span);
                if node.flags.contains(SymbolFlags::CLASSMETHOD) {
                    return Some(bind_receiver(ty));
                }
                Some(ty)
            }
            None if self.falls_back_to_any(&inst.class) => Some(Type::Any(AnyKind::Special)),
            None => self.instance_member(
                &Instance {
                    class: TYPE.to_string(),
                    args: Vec::new(),
                },
                attr,
                span,
            ),
        }
    }

    fn falls_back_to_any(&self, class: &str) -> bool {
        self.env.class(class).map_or(true, |info| {
            info.mro
                .iter()
                .any(|c| self.env.class(c).map_or(false, |i| i.fallback_to_any))
        })
    }

    /// Express a member type declared in `owner` in terms of `inst`'s arguments
    fn map_member(&mut self, inst: &Instance, owner: &ClassInfo, raw: &Type, span: Span) -> Type {
        if owner.type_vars.is_empty() {
            return raw.clone();
        }
        let mapped = self.env.map_to_supertype(inst, &owner.fullname).unwrap_or_else(|| Instance {
            class: owner.fullname.clone(),
            args: Vec::new(),
        });
        let bindings = class_bindings(owner, &mapped.args);
        match substitute(raw, &bindings) {
            Ok(ty) => ty,
            Err(err) => self.internal(span, err),
        }
    }

    /// Type a call expression
    pub(crate) fn check_call(&mut self, callee: &Type, args: &[Arg], span: Span) -> Type {
        match callee {
            Type::Callable(callable) => self.check_callable_call(callable, args, span),
            Type::ClassObject(inst) => match self.constructor(inst, span) {
                Some(callable) => self.check_callable_call(&callable, args, span),
                None => {
                    self.type_args(args);
                    Type::Any(AnyKind::Special)
                }
            },
            Type::Union(items) => {
                let results: Vec<Type> = items.iter().map(|item| self.check_call(item, args, span)).collect();
                simplify_union(self.env, results)
            }
            Type::Instance(inst) => match self.instance_member(inst, "__call__", span) {
                Some(call @ (Type::Callable(_) | Type::Any(_))) => self.check_call(&call, args, span),
                _ => {
                    self.type_args(args);
                    self.error(span, messages::not_callable(callee))
                }
            },
            Type::Any(_) | Type::Never => {
                self.type_args(args);
                callee.clone()
            }
            other => {
                self.type_args(args);
                self.error(span, messages::not_callable(other))
            }
        }
    }

    fn type_args(&mut self, args: &[Arg]) {
        for arg in args {
            self.expr_type(&arg.value, None);
        }
    }

    /// Signature of calling a class: `__init__` without `self`, returning an
    /// instance
    fn constructor(&mut self, inst: &Instance, span: Span) -> Option<CallableType> {
        let info = self.env.class(&inst.class)?;
        let self_inst = info.self_instance();
        let init = match self.env.find_member(&inst.class, "__init__") {
            Some((owner, node)) => {
                let raw = node.ty.clone()?;
                match self.map_member(&self_inst, owner, &raw, span) {
                    Type::Callable(callable) => Some(callable.bind_self()),
                    _ => None,
                }
            }
            None => None,
        };
        let mut callable = init.unwrap_or_else(|| CallableType::new(Vec::new(), Type::None));
        callable.ret = Type::Instance(self_inst);
        let mut type_vars = info.type_vars.clone();
        type_vars.extend(callable.type_vars.drain(..));
        callable.type_vars = type_vars;
        callable.name = Some(short_name(&info.fullname).to_string());

        if !inst.args.is_empty() {
            let bindings = class_bindings(info, &inst.args);
            callable.type_vars.retain(|tv| !bindings.contains_key(&tv.fullname));
            let own = callable.type_vars.clone();
            match substitute(&Type::Callable(Box::new(callable)), &bindings) {
                Ok(Type::Callable(mut applied)) => {
                    applied.type_vars = own;
                    return Some(*applied);
                }
                Ok(_) => return None,
                Err(err) => {
                    self.internal(span, err);
                    return None;
                }
            }
        }
        Some(callable)
    }

    fn check_callable_call(&mut self, callable: &CallableType, args: &[Arg], span: Span) -> Type {
        let callee = callable.describe();
        let mapping = self.map_actuals_to_formals(callable, args, span);

        let mut actual_types: Vec<Option<Type>> = vec![None; args.len()];
        for (param, actuals) in callable.params.iter().zip(&mapping) {
            let mut vars = Vec::new();
            param.ty.collect_type_vars(&mut vars);
            let context = vars.is_empty().then_some(&param.ty);
            for &i in actuals {
                if actual_types[i].is_none() {
                    actual_types[i] = Some(self.expr_type(&args[i].value, context));
                }
            }
        }
        let mut effective = Vec::with_capacity(args.len());
        for (arg, ty) in args.iter().zip(actual_types) {
            let ty = match ty {
                Some(ty) => ty,
                None => self.expr_type(&arg.value, None),
            };
            effective.push(match arg.kind {
                ArgKind::Star => self.iter_item_type(&ty, arg.value.span()),
                ArgKind::DoubleStar => self.mapping_value_type(&ty),
                _ => ty,
            });
        }
        if self.aborted {
            return Type::from_error();
        }

        let pairs: Vec<(&Type, &Type)> = callable
            .params
            .iter()
            .zip(&mapping)
            .flat_map(|(param, actuals)| actuals.iter().map(move |&i| (&param.ty, i)))
            .map(|(formal, i)| (formal, &effective[i]))
            .collect();
        let Some(bound) = self.instantiate(callable, &pairs, span) else {
            return Type::from_error();
        };

        for (param, actuals) in bound.params.iter().zip(&mapping) {
            for &i in actuals {
                if !is_subtype(self.env, &effective[i], &param.ty) {
                    self.error(
                        args[i].value.span(),
                        messages::incompatible_argument(i + 1, &callee, &effective[i], &param.ty),
                    );
                }
            }
        }
        bound.ret
    }

    /// Formal parameter index to the indices of the actual arguments it
    /// receives; arity problems are reported here
    fn map_actuals_to_formals(&mut self, callable: &CallableType, args: &[Arg], span: Span) -> Vec<Vec<usize>> {
        let callee = callable.describe();
        let params = &callable.params;
        let takes_positional = |kind: CallableArgKind| kind.is_positional() || kind == CallableArgKind::Star;
        let mut mapping = vec![Vec::new(); params.len()];
        let mut next = 0;
        let mut too_many = false;

        for (i, arg) in args.iter().enumerate() {
            match arg.kind {
                ArgKind::Positional => {
                    match (next..params.len()).find(|&j| takes_positional(params[j].kind)) {
                        Some(j) => {
                            mapping[j].push(i);
                            if params[j].kind != CallableArgKind::Star {
                                next = j + 1;
                            } else {
                                next = j;
                            }
                        }
                        None => too_many = true,
                    }
                }
                ArgKind::Star => {
                    for j in next..params.len() {
                        if takes_positional(params[j].kind) {
                            mapping[j].push(i);
                        }
                    }
                    next = params.len();
                }
                ArgKind::Keyword => {
                    let name = arg.name.as_deref().unwrap_or_default();
                    let named = params
                        .iter()
                        .position(|p| p.name.as_deref() == Some(name) && !p.kind.is_star());
                    match named {
                        Some(j) if !mapping[j].is_empty() => {
                            self.error(arg.span, messages::multiple_values(name, &callee));
                        }
                        Some(j) => mapping[j].push(i),
                        None => match params.iter().position(|p| p.kind == CallableArgKind::StarStar) {
                            Some(j) => mapping[j].push(i),
                            None => {
                                self.error(arg.span, messages::unexpected_keyword(name, &callee));
                            }
                        },
                    }
                }
                ArgKind::DoubleStar => {
                    for (j, param) in params.iter().enumerate() {
                        let open = mapping[j].is_empty() && !param.kind.is_star();
                        if open || param.kind == CallableArgKind::StarStar {
                            mapping[j].push(i);
                        }
                    }
                }
            }
        }
        if too_many {
            self.error(span, messages::too_many_arguments(&callee));
        }

        let star_actual = args.iter().any(|a| a.kind == ArgKind::Star || a.kind == ArgKind::DoubleStar);
        let keywords = args.iter().any(|a| a.kind == ArgKind::Keyword);
        let mut missing_positional = Vec::new();
        for (param, actuals) in params.iter().zip(&mapping) {
            if !actuals.is_empty() || star_actual {
                continue;
            }
            let name = param.name.as_deref().unwrap_or("_");
            match param.kind {
                CallableArgKind::Positional => missing_positional.push(name),
                CallableArgKind::Named => {
                    self.error(span, messages::missing_named_argument(name, &callee));
                }
                _ => {}
            }
        }
        match missing_positional.as_slice() {
            [] => {}
            [name] if keywords => {
                self.error(span, messages::missing_positional_argument(name, &callee));
            }
            _ => {
                self.error(span, messages::too_few_arguments(&callee));
            }
        }
        mapping
    }

    /// Solve the callable's type variables from formal/actual pairs and
    /// apply the solution
    fn instantiate(&mut self, callable: &CallableType, pairs: &[(&Type, &Type)], span: Span) -> Option<CallableType> {
        if callable.type_vars.is_empty() {
            return Some(callable.clone());
        }
        let mut constraints = Vec::new();
        for (formal, actual) in pairs {
            infer_constraints(self.env, formal, actual, &mut constraints);
        }
        let mut bindings: TypeBindings = callable
            .type_vars
            .iter()
            .map(|tv| {
                let found: Vec<&Type> = constraints
                    .iter()
                    .filter(|(name, _)| *name == tv.fullname)
                    .map(|(_, ty)| ty)
                    .collect();
                let ty = if found.is_empty() {
                    Type::Any(AnyKind::Special)
                } else {
                    join_all(self.env, found)
                };
                (tv.fullname.clone(), ty)
            })
            .collect();
        // variables of an enclosing generic class stay as they are
        let whole = Type::Callable(Box::new(callable.clone()));
        let mut free = Vec::new();
        whole.walk(&mut |t| {
            if let Type::TypeVar(tv) = t {
                free.push(tv.clone());
            }
        });
        for tv in free {
            bindings
                .entry(tv.fullname.clone())
                .or_insert_with(|| Type::TypeVar(tv));
        }
        match substitute(&whole, &bindings) {
            Ok(Type::Callable(mut applied)) => {
                applied.type_vars.clear();
                Some(*applied)
            }
            Ok(_) => None,
            Err(err) => {
                self.internal(span, err);
                None
            }
        }
    }

    /// Apply a method to already-typed positional operands; `None` when
    /// the operands do not fit
    fn apply_typed(&mut self, method: &Type, actuals: &[Type], span: Span) -> Option<Type> {
        let callable = match method {
            Type::Callable(callable) => callable,
            Type::Any(_) => return Some(method.clone()),
            _ => return None,
        };
        let params = &callable.params;
        let star = params.iter().position(|p| p.kind == CallableArgKind::Star);
        let positional: Vec<usize> = (0..params.len()).filter(|&j| params[j].kind.is_positional()).collect();
        let mut slots = Vec::with_capacity(actuals.len());
        for i in 0..actuals.len() {
            match positional.get(i).copied().or(star) {
                Some(j) => slots.push(j),
                None => return None,
            }
        }
        let required_left = positional
            .iter()
            .skip(actuals.len())
            .any(|&j| params[j].kind == CallableArgKind::Positional);
        if required_left || params.iter().any(|p| p.kind == CallableArgKind::Named) {
            return None;
        }
        let pairs: Vec<(&Type, &Type)> = slots.iter().zip(actuals).map(|(&j, a)| (&params[j].ty, a)).collect();
        let bound = self.instantiate(callable, &pairs, span)?;
        let fits = slots
            .iter()
            .zip(actuals)
            .all(|(&j, actual)| is_subtype(self.env, actual, &bound.params[j].ty));
        fits.then_some(bound.ret)
    }

    /// Type check a binary operator application
    pub(crate) fn check_binary_op(&mut self, op: BinOp, left: &Type, right: &Type, span: Span) -> Type {
        if left.absorbs_errors() {
            return left.clone();
        }
        if right.absorbs_errors() {
            return right.clone();
        }
        if let Type::Union(items) = left {
            let mut results = Vec::with_capacity(items.len());
            for item in items {
                match self.binary_single(op, item, right, span) {
                    Some(ty) => results.push(ty),
                    None => {
                        self.error(span, messages::unsupported_operands(op.symbol(), item, right));
                        self.reporter.report_note(span, messages::operand_note("Left", left));
                        results.push(Type::from_error());
                    }
                }
            }
            return simplify_union(self.env, results);
        }
        if let Type::Union(items) = right {
            let mut results = Vec::with_capacity(items.len());
            for item in items {
                match self.binary_single(op, left, item, span) {
                    Some(ty) => results.push(ty),
                    None => {
                        self.error(span, messages::unsupported_operands(op.symbol(), left, item));
                        self.reporter.report_note(span, messages::operand_note("Right", right));
                        results.push(Type::from_error());
                    }
                }
            }
            return simplify_union(self.env, results);
        }
        match self.binary_single(op, left, right, span) {
            Some(ty) => ty,
            None => {
                let forward = self.lookup_member(left, op.method(), span).is_some();
                let reflected = self.lookup_member(right, &op.reflected_method(), span).is_some();
                if forward || reflected {
                    self.error(span, messages::unsupported_operands(op.symbol(), left, right))
                } else {
                    self.error(span, messages::unsupported_left_operand(op.symbol(), left))
                }
            }
        }
    }

    /// `left.__op__(right)`, then `right.__rop__(left)`
    fn binary_single(&mut self, op: BinOp, left: &Type, right: &Type, span: Span) -> Option<Type> {
        self.dunder_pair(op.method(), &op.reflected_method(), left, right, span)
    }

    fn dunder_pair(&mut self, method: &str, reflected: &str, left: &Type, right: &Type, span: Span) -> Option<Type> {
        if let Some(forward) = self.lookup_member(left, method, span) {
            if let Some(ty) = self.apply_typed(&forward, std::slice::from_ref(right), span) {
                return Some(ty);
            }
        }
        let backward = self.lookup_member(right, reflected, span)?;
        self.apply_typed(&backward, std::slice::from_ref(left), span)
    }

    fn check_unary_op(&mut self, op: UnaryOp, operand: &Type, span: Span) -> Type {
        let Some(method) = op.method() else {
            return Type::named(BOOL);
        };
        if operand.absorbs_errors() {
            return operand.clone();
        }
        let mut results = Vec::new();
        for item in operand.items() {
            let result = self
                .lookup_member(&item, method, span)
                .and_then(|m| self.apply_typed(&m, &[], span));
            match result {
                Some(ty) => results.push(ty),
                None => {
                    results.push(self.error(span, messages::unsupported_unary_operand(op.symbol(), &item)));
                }
            }
        }
        simplify_union(self.env, results)
    }

    /// Chained comparison; always `bool`
    fn check_compare(&mut self, left: &Expr, ops: &[CmpOp], comparators: &[Expr], span: Span) -> Type {
        let mut left_ty = self.expr_type(left, None);
        for (op, right) in ops.iter().zip(comparators) {
            let right_ty = self.expr_type(right, None);
            if left_ty.absorbs_errors() || right_ty.absorbs_errors() {
                left_ty = right_ty;
                continue;
            }
            match op {
                CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
                    let reflected = match op {
                        CmpOp::Lt => "__gt__",
                        CmpOp::Gt => "__lt__",
                        CmpOp::LtE => "__ge__",
                        _ => "__le__",
                    };
                    let method = op.method().unwrap_or("__lt__");
                    for item in left_ty.items() {
                        for other in right_ty.items() {
                            if self.dunder_pair(method, reflected, &item, &other, span).is_none() {
                                self.error(span, messages::unsupported_operands(op.symbol(), &item, &other));
                            }
                        }
                    }
                }
                CmpOp::In | CmpOp::NotIn => {
                    for container in right_ty.items() {
                        self.check_contains(&left_ty, &container, span);
                    }
                }
                CmpOp::Eq | CmpOp::NotEq | CmpOp::Is | CmpOp::IsNot => {}
            }
            left_ty = right_ty;
        }
        Type::named(BOOL)
    }

    fn check_contains(&mut self, item: &Type, container: &Type, span: Span) {
        if let Some(contains) = self.lookup_member(container, "__contains__", span) {
            if self.apply_typed(&contains, std::slice::from_ref(item), span).is_none() {
                self.error(span, messages::unsupported_operands("in", item, container));
            }
        } else if self.lookup_member(container, "__iter__", span).is_none() {
            self.error(span, messages::unsupported_right_operand("in", container));
        }
    }

    /// `receiver[index]`
    fn check_index(&mut self, receiver: &Type, index: &Type, index_span: Span, span: Span) -> Type {
        match receiver {
            Type::Any(_) => receiver.clone(),
            Type::Union(items) => {
                let results = items
                    .iter()
                    .map(|item| self.check_index(item, index, index_span, span))
                    .collect();
                simplify_union(self.env, results)
            }
            _ => {
                let Some(method) = self.lookup_member(receiver, "__getitem__", span) else {
                    return self.error(span, messages::not_indexable(receiver));
                };
                if let Some(ty) = self.apply_typed(&method, std::slice::from_ref(index), span) {
                    return ty;
                }
                let expected = first_param(&method).unwrap_or(Type::object());
                self.error(index_span, messages::invalid_index(index, receiver, &expected))
            }
        }
    }

    /// `receiver[index] = value`
    pub(crate) fn check_index_assignment(
        &mut self,
        receiver: &Type,
        index: Type,
        index_span: Span,
        value: Type,
        value_span: Span,
        target_span: Span,
    ) {
        for item in receiver.items() {
            if item.absorbs_errors() {
                continue;
            }
            let Some(method) = self.lookup_member(&item, "__setitem__", target_span) else {
                self.error(target_span, messages::unsupported_index_assignment(&item));
                continue;
            };
            if self
                .apply_typed(&method, &[index.clone(), value.clone()], target_span)
                .is_some()
            {
                continue;
            }
            let (key, target) = match &method {
                Type::Callable(c) if c.params.len() >= 2 => (c.params[0].ty.clone(), c.params[1].ty.clone()),
                _ => (Type::object(), Type::object()),
            };
            if !is_subtype(self.env, &index, &key) {
                self.error(index_span, messages::invalid_index(&index, &item, &key));
            } else {
                self.error(value_span, messages::incompatible_assignment(&value, &target));
            }
        }
    }

    /// Item type produced by iterating over `ty`
    pub(crate) fn iter_item_type(&mut self, ty: &Type, span: Span) -> Type {
        match ty {
            Type::Any(_) => ty.clone(),
            Type::Union(items) => {
                let results = items.iter().map(|item| self.iter_item_type(item, span)).collect();
                simplify_union(self.env, results)
            }
            _ => {
                let iterator = self
                    .lookup_member(ty, "__iter__", span)
                    .and_then(|m| self.apply_typed(&m, &[], span));
                let Some(iterator) = iterator else {
                    return self.error(span, messages::not_iterable(ty));
                };
                self.lookup_member(&iterator, "__next__", span)
                    .and_then(|m| self.apply_typed(&m, &[], span))
                    .unwrap_or(Type::Any(AnyKind::Special))
            }
        }
    }

    /// Value type of a `**mapping` argument
    fn mapping_value_type(&self, ty: &Type) -> Type {
        match ty {
            Type::Instance(inst) => self
                .env
                .map_to_supertype(inst, DICT)
                .and_then(|dict| dict.args.get(1).cloned())
                .unwrap_or(Type::Any(AnyKind::Special)),
            _ => Type::Any(AnyKind::Special),
        }
    }

    /// List, set and tuple displays
    fn display_type(&mut self, class: &str, elts: &[Expr], context: Option<&Type>) -> Type {
        let expected = context.and_then(|ctx| {
            ctx.items().into_iter().find_map(|t| match t {
                Type::Instance(inst) if inst.class == class && inst.args.len() == 1 => Some(inst.args[0].clone()),
                _ => None,
            })
        });
        let types: Vec<Type> = elts.iter().map(|e| self.expr_type(e, expected.as_ref())).collect();
        if let Some(item) = expected {
            if types.iter().all(|t| is_subtype(self.env, t, &item)) {
                return Type::instance(class, vec![item]);
            }
        }
        let item = if types.is_empty() {
            Type::Any(AnyKind::Special)
        } else {
            join_all(self.env, &types)
        };
        Type::instance(class, vec![item])
    }

    fn dict_display_type(&mut self, items: &[(Expr, Expr)], context: Option<&Type>) -> Type {
        let expected = context.and_then(|ctx| {
            ctx.items().into_iter().find_map(|t| match t {
                Type::Instance(inst) if inst.class == DICT && inst.args.len() == 2 => {
                    Some((inst.args[0].clone(), inst.args[1].clone()))
                }
                _ => None,
            })
        });
        let mut keys = Vec::with_capacity(items.len());
        let mut values = Vec::with_capacity(items.len());
        for (key, value) in items {
            keys.push(self.expr_type(key, expected.as_ref().map(|(k, _)| k)));
            values.push(self.expr_type(value, expected.as_ref().map(|(_, v)| v)));
        }
        if let Some((key, value)) = expected {
            let fits = keys.iter().all(|t| is_subtype(self.env, t, &key))
                && values.iter().all(|t| is_subtype(self.env, t, &value));
            if fits {
                return Type::instance(DICT, vec![key, value]);
            }
        }
        if items.is_empty() {
            let any = Type::Any(AnyKind::Special);
            return Type::instance(DICT, vec![any.clone(), any]);
        }
        Type::instance(DICT, vec![join_all(self.env, &keys), join_all(self.env, &values)])
    }

    fn lambda_type(&mut self, params: &[Param], body: &Expr) -> Type {
        for default in params.iter().filter_map(|p| p.default.as_ref()) {
            self.expr_type(default, None);
        }
        let locals: HashMap<String, Type> = params
            .iter()
            .map(|p| (p.name.clone(), Type::Any(AnyKind::Unannotated)))
            .collect();
        self.functions.push(FunctionFrame {
            locals,
            globals: BTreeSet::new(),
            ret: Type::Any(AnyKind::Unannotated),
            self_name: None,
        });
        let ret = self.expr_type(body, None);
        self.functions.pop();
        let params = params
            .iter()
            .map(|p| CallableParam {
                name: Some(p.name.clone()),
                ty: Type::Any(AnyKind::Unannotated),
                kind: if p.default.is_some() {
                    CallableArgKind::Optional
                } else {
                    CallableArgKind::Positional
                },
            })
            .collect();
        Type::Callable(Box::new(CallableType::new(params, ret)))
    }
}

fn object_instance() -> Instance {
    Instance {
        class: OBJECT.to_string(),
        args: Vec::new(),
    }
}

/// Method accessed through an instance: drop the receiver parameter
fn bind_receiver(ty: Type) -> Type {
    match ty {
        Type::Callable(callable) => Type::Callable(Box::new(callable.bind_self())),
        other => other,
    }
}

fn first_param(method: &Type) -> Option<Type> {
    match method {
        Type::Callable(callable) => callable.params.first().map(|p| p.ty.clone()),
        _ => None,
    }
}

/// Collect `(type variable, actual)` constraints by matching a formal type
/// against an actual argument type
pub(crate) fn infer_constraints(ctx: &dyn TypeContext, formal: &Type, actual: &Type, out: &mut Vec<(String, Type)>) {
    match (formal, actual) {
        (Type::TypeVar(tv), _) => out.push((tv.fullname.clone(), actual.clone())),
        (_, Type::Any(_)) => {
            let mut vars = Vec::new();
            formal.collect_type_vars(&mut vars);
            out.extend(vars.into_iter().map(|tv| (tv.fullname, actual.clone())));
        }
        (Type::Instance(template), Type::Instance(inst)) | (Type::ClassObject(template), Type::ClassObject(inst)) => {
            if let Some(mapped) = ctx.map_to_supertype(inst, &template.class) {
                for (f, a) in template.args.iter().zip(&mapped.args) {
                    infer_constraints(ctx, f, a, out);
                }
            }
        }
        (Type::Union(items), _) => {
            // match the non-variable members first, infer the rest
            let fixed: Vec<&Type> = items.iter().filter(|t| !matches!(t, Type::TypeVar(_))).collect();
            let rest: Vec<Type> = actual
                .items()
                .into_iter()
                .filter(|a| !fixed.iter().any(|f| is_subtype(ctx, a, f)))
                .collect();
            if rest.is_empty() {
                return;
            }
            let rest = make_union(rest);
            for item in items {
                if let Type::TypeVar(_) = item {
                    infer_constraints(ctx, item, &rest, out);
                } else {
                    infer_constraints(ctx, item, actual, out);
                }
            }
        }
        (_, Type::Union(actuals)) => {
            for item in actuals {
                infer_constraints(ctx, formal, item, out);
            }
        }
        (Type::Callable(template), Type::Callable(callable)) => {
            for (f, a) in template.params.iter().zip(&callable.params) {
                infer_constraints(ctx, &f.ty, &a.ty, out);
            }
            infer_constraints(ctx, &template.ret, &callable.ret, out);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ClassFixture;

    fn t() -> Type {
        Type::TypeVar(TypeVarDef {
            name: "T".into(),
            fullname: "m.f.T".into(),
            variance: Variance::Invariant,
        })
    }

    #[test]
    fn test_infer_constraints_through_supertype() {
        let fx = ClassFixture::standard();
        let formal = Type::instance(LIST, vec![t()]);
        let actual = Type::instance(LIST, vec![Type::named(INT)]);
        let mut out = Vec::new();
        infer_constraints(&fx, &formal, &actual, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1, Type::named(INT));
    }

    #[test]
    fn test_infer_constraints_optional_strips_none() {
        let fx = ClassFixture::standard();
        let formal = make_union(vec![t(), Type::None]);
        let actual = make_union(vec![Type::named(STR), Type::None]);
        let mut out = Vec::new();
        infer_constraints(&fx, &formal, &actual, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1, Type::named(STR));
    }
}
