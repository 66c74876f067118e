//! Annotation analysis
//!
//! Turns annotation expressions into [`Type`]s. Names that are not bound
//! yet produce `Type::Unresolved` and are reported back to the caller as
//! deferrals; in the final pass they become errors instead.

use crate::diagnostics::{messages, DiagnosticKind};
use crate::env::Env;
use crate::scope::{lookup_module_attr, Lookup, Scope};
use crate::subst::{substitute, TypeBindings};
use crate::symbols::{SymbolKind, SymbolNode};
use crate::types::*;
use pyxis_syntax::{BinOp, Expr, FileId, HasSpan, Parser, Span};

/// Builtin classes that need `typing` aliases before Python 3.9
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    (LIST, "List"),
    (DICT, "Dict"),
    (SET, "Set"),
    (TUPLE, "Tuple"),
    (TYPE, "Type"),
];

/// What a dotted name in an annotation refers to
enum Target<'a> {
    Node(&'a SymbolNode),
    Module(String),
    Any(AnyKind),
    /// Not bound yet, may appear in a later pass
    Pending(String),
    /// Bound to a placeholder whose own definition is still pending
    Placeholder(String),
    /// Not bound and never will be
    Undefined(String),
    Invalid,
}

/// Base class entry of a class definition
#[derive(Debug, Clone, PartialEq)]
pub enum BaseType {
    Instance(Instance),
    /// `Generic[T, ...]`
    Generic(Vec<TypeVarDef>),
    /// Base of unknown type; unknown attributes become `Any`
    Any,
    /// Not resolved yet
    Pending,
    Invalid,
}

pub struct TypeAnalyzer<'e, 'a> {
    env: &'e Env<'a>,
    scope: Scope<'e>,
    final_mode: bool,
    /// Stubs may use syntax newer than the target version
    is_stub: bool,
    /// Errors inside a string annotation are reported at the string
    span_override: Option<Span>,
    /// Names that must be retried in a later pass
    pub deferred: Vec<(String, Span)>,
    pub errors: Vec<(Span, DiagnosticKind, String)>,
}

impl<'e, 'a> TypeAnalyzer<'e, 'a> {
    pub fn new(env: &'e Env<'a>, scope: Scope<'e>, final_mode: bool, is_stub: bool) -> Self {
        TypeAnalyzer {
            env,
            scope,
            final_mode,
            is_stub,
            span_override: None,
            deferred: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn error(&mut self, span: Span, message: String) -> Type {
        self.errors
            .push((self.span_override.unwrap_or(span), DiagnosticKind::Type, message));
        Type::from_error()
    }

    fn defer(&mut self, name: String, span: Span) -> Type {
        self.deferred.push((name.clone(), self.span_override.unwrap_or(span)));
        Type::Unresolved { name }
    }

    fn unbound(&mut self, name: String, span: Span, pending: bool) -> Type {
        if pending && !self.final_mode {
            return self.defer(name, span);
        }
        self.errors.push((
            self.span_override.unwrap_or(span),
            DiagnosticKind::Binding,
            messages::name_not_defined(&name),
        ));
        Type::from_error()
    }

    /// Analyze one annotation
    pub fn analyze(&mut self, expr: &Expr) -> Type {
        match expr {
            Expr::NoneLit(_) => Type::None,
            Expr::Name { .. } | Expr::Attribute { .. } => self.named_type(expr, None, expr.span()),
            Expr::Subscript { value, index, span } => self.named_type(value, Some(index.as_ref()), *span),
            Expr::Str { value, span } => self.string_annotation(value, *span),
            Expr::BinOp {
                left,
                op: BinOp::BitOr,
                right,
                span,
            } => {
                if !self.is_stub && self.env.options.python_version < (3, 10) {
                    return self.error(
                        *span,
                        messages::version_gate("X | Y syntax for unions", (3, 10)),
                    );
                }
                let left = self.analyze(left);
                let right = self.analyze(right);
                make_union(vec![left, right])
            }
            other => self.error(other.span(), "Invalid type comment or annotation".to_string()),
        }
    }

    fn string_annotation(&mut self, text: &str, span: Span) -> Type {
        let parsed = Parser::new(text, FileId::INVALID).and_then(|mut p| p.parse_expression_public());
        match parsed {
            Ok(expr) => {
                let outer = self.span_override.replace(span);
                let ty = self.analyze(&expr);
                self.span_override = outer;
                ty
            }
            Err(_) => self.error(span, format!("Syntax error in type annotation \"{}\"", text)),
        }
    }

    /// Analyze a class base expression
    pub fn analyze_base(&mut self, expr: &Expr) -> BaseType {
        let (target, args) = match expr {
            Expr::Subscript { value, index, .. } => (value.as_ref(), Some(index.as_ref())),
            other => (other, None),
        };
        if let Some(node) = self.peek_node(target) {
            if node.fullname == "typing.Generic" {
                return self.generic_base(args, expr.span());
            }
        }
        let errors_before = self.errors.len();
        match self.analyze(expr) {
            Type::Instance(inst) => BaseType::Instance(inst),
            Type::Any(AnyKind::FromError) if self.errors.len() > errors_before => BaseType::Invalid,
            Type::Any(_) => BaseType::Any,
            Type::Unresolved { .. } => BaseType::Pending,
            _ => {
                let name = expr.dotted_name().unwrap_or_else(|| "?".to_string());
                self.error(expr.span(), format!("Invalid base class \"{}\"", name));
                BaseType::Invalid
            }
        }
    }

    fn generic_base(&mut self, args: Option<&Expr>, span: Span) -> BaseType {
        let Some(args) = args else {
            self.error(span, "Missing type parameters for generic type \"Generic\"".to_string());
            return BaseType::Invalid;
        };
        let mut vars = Vec::new();
        for arg in type_arg_exprs(args) {
            match self.analyze(arg) {
                Type::TypeVar(tv) => vars.push(tv),
                Type::Unresolved { .. } => return BaseType::Pending,
                Type::Any(AnyKind::FromError) => return BaseType::Invalid,
                _ => {
                    self.error(
                        arg.span(),
                        "Free type variable expected in Generic[...]".to_string(),
                    );
                    return BaseType::Invalid;
                }
            }
        }
        BaseType::Generic(vars)
    }

    /// Resolve without reporting anything
    fn peek_node(&self, expr: &Expr) -> Option<&'a SymbolNode> {
        match self.resolve_quiet(expr) {
            Target::Node(node) => Some(node),
            _ => None,
        }
    }

    fn resolve_quiet(&self, expr: &Expr) -> Target<'a> {
        match expr {
            Expr::Name { id, .. } => match self.scope.lookup(self.env, id) {
                Lookup::Found(node) => Target::Node(self.env.resolve_node(node)),
                Lookup::Module(name) => Target::Module(name),
                Lookup::Opaque => Target::Any(AnyKind::MissingImport),
                Lookup::Pending => Target::Placeholder(id.clone()),
                Lookup::Missing => Target::Pending(id.clone()),
            },
            Expr::Attribute { value, attr, .. } => {
                let dotted = || expr.dotted_name().unwrap_or_else(|| attr.clone());
                match self.resolve_quiet(value) {
                    Target::Node(node) if node.kind == SymbolKind::ModuleRef => {
                        self.module_attr(&node.fullname, attr, dotted())
                    }
                    Target::Module(module) => self.module_attr(&module, attr, dotted()),
                    Target::Node(node) => match node.class.as_ref().and_then(|c| c.members.lookup(attr)) {
                        Some(member) if member.kind == SymbolKind::Placeholder => Target::Placeholder(dotted()),
                        Some(member) => Target::Node(self.env.resolve_node(member)),
                        None if node.class.is_some() => Target::Undefined(dotted()),
                        None => match &node.ty {
                            Some(Type::Any(kind)) => Target::Any(*kind),
                            _ => Target::Invalid,
                        },
                    },
                    other => other,
                }
            }
            _ => Target::Invalid,
        }
    }

    fn module_attr(&self, module: &str, attr: &str, dotted: String) -> Target<'a> {
        match lookup_module_attr(self.env, module, attr) {
            Lookup::Found(node) => Target::Node(self.env.resolve_node(node)),
            Lookup::Module(name) => Target::Module(name),
            Lookup::Opaque => Target::Any(AnyKind::MissingImport),
            Lookup::Pending => Target::Placeholder(dotted),
            Lookup::Missing if self.env.is_local(module) => Target::Pending(dotted),
            Lookup::Missing => Target::Undefined(dotted),
        }
    }

    fn named_type(&mut self, target: &Expr, args: Option<&Expr>, span: Span) -> Type {
        match self.resolve_quiet(target) {
            Target::Node(node) => self.node_type(node, args, span),
            Target::Module(name) => self.error(span, messages::not_valid_as_type("Module", &name)),
            Target::Any(kind) => Type::Any(kind),
            Target::Pending(name) => self.unbound(name, target.span(), true),
            // the placeholder's own definition reports the root cause
            Target::Placeholder(_) if self.final_mode => Type::from_error(),
            Target::Placeholder(name) => self.defer(name, target.span()),
            Target::Undefined(name) => self.unbound(name, target.span(), false),
            Target::Invalid => self.error(span, "Invalid type comment or annotation".to_string()),
        }
    }

    fn node_type(&mut self, node: &'a SymbolNode, args: Option<&Expr>, span: Span) -> Type {
        if let Some(ty) = self.special_form(&node.fullname, args, span) {
            return ty;
        }
        match node.kind {
            SymbolKind::Class => self.instance_type(&node.fullname, args, span),
            SymbolKind::TypeAlias => {
                let aliased = node.ty.clone().unwrap_or_else(Type::from_error);
                match args {
                    Some(args) => self.apply_alias(aliased, args, &node.fullname, span),
                    None => aliased,
                }
            }
            SymbolKind::TypeVar => match (&node.ty, args) {
                (Some(ty), None) => ty.clone(),
                _ => self.error(span, messages::not_valid_as_type("Type variable", &node.fullname)),
            },
            SymbolKind::Variable => match &node.ty {
                Some(Type::Any(kind)) => Type::Any(*kind),
                _ => self.error(span, messages::not_valid_as_type("Variable", &node.fullname)),
            },
            SymbolKind::Function => self.error(span, messages::not_valid_as_type("Function", &node.fullname)),
            SymbolKind::ModuleRef => self.error(span, messages::not_valid_as_type("Module", &node.fullname)),
            SymbolKind::Placeholder => self.unbound(node.name.clone(), span, true),
        }
    }

    fn type_args(&mut self, index: &Expr) -> Vec<Type> {
        type_arg_exprs(index).into_iter().map(|e| self.analyze(e)).collect()
    }

    fn instance_type(&mut self, fullname: &str, args: Option<&Expr>, span: Span) -> Type {
        if args.is_some() && !self.is_stub && self.env.options.python_version < (3, 9) {
            if let Some((_, alias)) = BUILTIN_ALIASES.iter().find(|(name, _)| *name == fullname) {
                return self.error(
                    span,
                    messages::builtin_not_subscriptable(short_name(fullname), alias),
                );
            }
        }
        if fullname == TUPLE {
            return self.tuple_type(args);
        }
        let expected = self.env.class(fullname).map(|info| info.type_vars.len());
        let given = args.map(|a| self.type_args(a)).unwrap_or_default();
        let args = match expected {
            Some(n) if given.is_empty() => vec![Type::Any(AnyKind::Unannotated); n],
            Some(n) if n != given.len() => {
                self.error(span, messages::type_arg_count(short_name(fullname), n, given.len()));
                vec![Type::from_error(); n]
            }
            _ => given,
        };
        Type::instance(fullname, args)
    }

    /// `tuple[int, ...]` and `tuple[int, str]` are both modelled as a
    /// homogeneous tuple of the item join
    fn tuple_type(&mut self, args: Option<&Expr>) -> Type {
        let Some(args) = args else {
            return Type::instance(TUPLE, vec![Type::Any(AnyKind::Unannotated)]);
        };
        let exprs = type_arg_exprs(args);
        let items: Vec<Type> = exprs
            .iter()
            .filter(|e| !matches!(e, Expr::Ellipsis(_)))
            .map(|e| self.analyze(e))
            .collect();
        let item = if items.is_empty() {
            Type::Any(AnyKind::Unannotated)
        } else {
            make_union(items)
        };
        Type::instance(TUPLE, vec![item])
    }

    fn apply_alias(&mut self, aliased: Type, args: &Expr, name: &str, span: Span) -> Type {
        let mut vars = Vec::new();
        aliased.collect_type_vars(&mut vars);
        let given = self.type_args(args);
        if vars.len() != given.len() {
            return self.error(span, messages::type_arg_count(short_name(name), vars.len(), given.len()));
        }
        let bindings: TypeBindings = vars.into_iter().map(|tv| tv.fullname).zip(given).collect();
        match substitute(&aliased, &bindings) {
            Ok(ty) => ty,
            Err(err) => self.error(span, messages::internal(err)),
        }
    }

    fn special_form(&mut self, fullname: &str, args: Option<&Expr>, span: Span) -> Option<Type> {
        let ty = match fullname {
            "typing.Any" => Type::Any(AnyKind::Explicit),
            "typing.Optional" => {
                let items = args.map(|a| self.type_args(a)).unwrap_or_default();
                if items.len() != 1 {
                    return Some(self.error(
                        span,
                        "Optional[...] must have exactly one type argument".to_string(),
                    ));
                }
                make_union(vec![items[0].clone(), Type::None])
            }
            "typing.Union" => {
                let items = args.map(|a| self.type_args(a)).unwrap_or_default();
                make_union(items)
            }
            "typing.List" => self.instance_type_unchecked(LIST, args, span),
            "typing.Dict" => self.instance_type_unchecked(DICT, args, span),
            "typing.Set" => self.instance_type_unchecked(SET, args, span),
            "typing.Tuple" => self.tuple_type(args),
            "typing.Type" | TYPE if args.is_some() => {
                let items = args.map(|a| self.type_args(a)).unwrap_or_default();
                match items.as_slice() {
                    [Type::Instance(inst)] => Type::ClassObject(inst.clone()),
                    [Type::Any(kind)] => Type::Any(*kind),
                    _ => Type::instance(TYPE, Vec::new()),
                }
            }
            "typing.Type" => Type::named(TYPE),
            "typing.Callable" => self.callable_type(args, span),
            _ => return None,
        };
        Some(ty)
    }

    /// Typing aliases are exempt from the version gate
    fn instance_type_unchecked(&mut self, fullname: &str, args: Option<&Expr>, span: Span) -> Type {
        let stub = std::mem::replace(&mut self.is_stub, true);
        let ty = self.instance_type(fullname, args, span);
        self.is_stub = stub;
        ty
    }

    fn callable_type(&mut self, args: Option<&Expr>, span: Span) -> Type {
        let any = || Type::Any(AnyKind::Explicit);
        let Some(args) = args else {
            return Type::Callable(Box::new(CallableType::new(varargs_any(), any())));
        };
        let (params, ret) = match args {
            Expr::Tuple { elts, .. } if elts.len() == 2 => (&elts[0], &elts[1]),
            _ => {
                return self.error(
                    span,
                    "Please use \"Callable[[<parameters>], <return type>]\"".to_string(),
                )
            }
        };
        let ret = self.analyze(ret);
        let params = match params {
            Expr::Ellipsis(_) => varargs_any(),
            Expr::List { elts, .. } => elts
                .iter()
                .map(|e| CallableParam {
                    name: None,
                    ty: self.analyze(e),
                    kind: CallableArgKind::Positional,
                })
                .collect(),
            other => {
                return self.error(
                    other.span(),
                    "The first argument to Callable must be a list of types or \"...\"".to_string(),
                )
            }
        };
        Type::Callable(Box::new(CallableType::new(params, ret)))
    }
}

fn varargs_any() -> Vec<CallableParam> {
    vec![
        CallableParam {
            name: Some("args".to_string()),
            ty: Type::Any(AnyKind::Explicit),
            kind: CallableArgKind::Star,
        },
        CallableParam {
            name: Some("kwargs".to_string()),
            ty: Type::Any(AnyKind::Explicit),
            kind: CallableArgKind::StarStar,
        },
    ]
}

fn type_arg_exprs(index: &Expr) -> Vec<&Expr> {
    match index {
        Expr::Tuple { elts, .. } => elts.iter().collect(),
        other => vec![other],
    }
}
