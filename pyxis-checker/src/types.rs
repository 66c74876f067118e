//! Type model
//!
//! Types are plain values: cheap to clone, comparable, and serializable so
//! that symbol tables can be written to the incremental cache. Class types
//! refer to their class by fully-qualified name; the class definition itself
//! lives in the owning module's symbol table.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const OBJECT: &str = "builtins.object";
pub const INT: &str = "builtins.int";
pub const FLOAT: &str = "builtins.float";
pub const BOOL: &str = "builtins.bool";
pub const STR: &str = "builtins.str";
pub const BYTES: &str = "builtins.bytes";
pub const LIST: &str = "builtins.list";
pub const DICT: &str = "builtins.dict";
pub const SET: &str = "builtins.set";
pub const TUPLE: &str = "builtins.tuple";
pub const TYPE: &str = "builtins.type";
pub const FUNCTION: &str = "builtins.function";
pub const SLICE: &str = "builtins.slice";

/// Why a type is `Any`
///
/// The reason only matters for error suppression and messages; all kinds
/// behave identically in the type algebra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnyKind {
    /// Written as `Any`
    Explicit,
    /// Missing annotation
    Unannotated,
    /// Produced by error recovery
    FromError,
    /// Comes from a module that could not be found or analyzed
    MissingImport,
    /// Implementation artifact (unsolved type variables and the like)
    Special,
}

/// Declared variance of a type parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variance {
    Invariant,
    Covariant,
    Contravariant,
}

/// A type variable, identified by its fully-qualified name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeVarDef {
    pub name: String,
    pub fullname: String,
    pub variance: Variance,
}

/// Instance of a class, possibly generic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    pub class: String,
    pub args: Vec<Type>,
}

/// How a callable parameter may be passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallableArgKind {
    /// Required positional-or-keyword
    Positional,
    /// Positional-or-keyword with a default
    Optional,
    /// `*args`
    Star,
    /// Required keyword-only
    Named,
    /// Keyword-only with a default
    NamedOptional,
    /// `**kwargs`
    StarStar,
}

impl CallableArgKind {
    pub fn is_positional(self) -> bool {
        matches!(self, CallableArgKind::Positional | CallableArgKind::Optional)
    }

    pub fn is_required(self) -> bool {
        matches!(self, CallableArgKind::Positional | CallableArgKind::Named)
    }

    pub fn is_star(self) -> bool {
        matches!(self, CallableArgKind::Star | CallableArgKind::StarStar)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallableParam {
    pub name: Option<String>,
    pub ty: Type,
    pub kind: CallableArgKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallableType {
    pub params: Vec<CallableParam>,
    pub ret: Type,
    /// Type variables bound by this callable (generic functions)
    pub type_vars: Vec<TypeVarDef>,
    /// Name used in diagnostics, e.g. `"f"` or `"append" of "list"`
    pub name: Option<String>,
}

impl CallableType {
    pub fn new(params: Vec<CallableParam>, ret: Type) -> Self {
        CallableType {
            params,
            ret,
            type_vars: Vec::new(),
            name: None,
        }
    }

    /// Drop the first parameter (`self` or `cls`) of a method
    pub fn bind_self(&self) -> CallableType {
        let mut bound = self.clone();
        if bound
            .params
            .first()
            .map(|p| p.kind.is_positional())
            .unwrap_or(false)
        {
            bound.params.remove(0);
        }
        bound
    }

    /// Name for messages: `"f"` when known
    pub fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("\"{}\"", name),
            None => "function".to_string(),
        }
    }
}

/// Types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Any(AnyKind),
    None,
    /// Bottom type
    Never,
    Instance(Instance),
    /// Always flattened and in canonical order; build with [`make_union`]
    Union(Vec<Type>),
    Callable(Box<CallableType>),
    TypeVar(TypeVarDef),
    /// Forward reference that has not been bound yet
    Unresolved { name: String },
    /// The value of a class name, `type[C]`
    ClassObject(Instance),
    /// The value of an imported module name
    Module(String),
}

impl Type {
    pub fn instance(class: impl Into<String>, args: Vec<Type>) -> Type {
        Type::Instance(Instance {
            class: class.into(),
            args,
        })
    }

    pub fn named(class: &str) -> Type {
        Type::instance(class, Vec::new())
    }

    pub fn object() -> Type {
        Type::named(OBJECT)
    }

    pub fn from_error() -> Type {
        Type::Any(AnyKind::FromError)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Type::None)
    }

    /// Errors involving this type are not reported
    pub fn absorbs_errors(&self) -> bool {
        match self {
            Type::Any(_) => true,
            Type::Union(items) => items.iter().any(|t| t.is_any()),
            _ => false,
        }
    }

    pub fn is_instance_of(&self, class: &str) -> bool {
        matches!(self, Type::Instance(inst) if inst.class == class)
    }

    /// Union members, or the type itself
    pub fn items(&self) -> Vec<Type> {
        match self {
            Type::Union(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// `Optional[T]` minus the `None`
    pub fn remove_none(&self) -> Type {
        match self {
            Type::Union(items) => make_union(items.iter().filter(|t| !t.is_none()).cloned().collect()),
            Type::None => Type::Never,
            other => other.clone(),
        }
    }

    pub fn contains_none(&self) -> bool {
        match self {
            Type::None => true,
            Type::Union(items) => items.iter().any(|t| t.is_none()),
            _ => false,
        }
    }

    /// Whether any `Unresolved` forward reference remains inside
    pub fn has_unresolved(&self) -> bool {
        let mut found = false;
        self.walk(&mut |t| {
            if matches!(t, Type::Unresolved { .. }) {
                found = true;
            }
        });
        found
    }

    /// Collect type variables in order of first appearance
    pub fn collect_type_vars(&self, out: &mut Vec<TypeVarDef>) {
        self.walk(&mut |t| {
            if let Type::TypeVar(tv) = t {
                if !out.iter().any(|v| v.fullname == tv.fullname) {
                    out.push(tv.clone());
                }
            }
        });
    }

    /// Pre-order traversal of this type and its components
    pub fn walk(&self, f: &mut dyn FnMut(&Type)) {
        f(self);
        match self {
            Type::Instance(inst) | Type::ClassObject(inst) => {
                for arg in &inst.args {
                    arg.walk(f);
                }
            }
            Type::Union(items) => {
                for item in items {
                    item.walk(f);
                }
            }
            Type::Callable(callable) => {
                for param in &callable.params {
                    param.ty.walk(f);
                }
                callable.ret.walk(f);
            }
            _ => {}
        }
    }

    /// Replace every `Unresolved` with `Any`
    pub fn erase_unresolved(&self) -> Type {
        self.map(&|t| match t {
            Type::Unresolved { .. } => Some(Type::from_error()),
            _ => None,
        })
    }

    /// Bottom-up rebuild; `f` returns `Some` to replace a node
    pub fn map(&self, f: &dyn Fn(&Type) -> Option<Type>) -> Type {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        match self {
            Type::Instance(inst) => Type::Instance(Instance {
                class: inst.class.clone(),
                args: inst.args.iter().map(|a| a.map(f)).collect(),
            }),
            Type::ClassObject(inst) => Type::ClassObject(Instance {
                class: inst.class.clone(),
                args: inst.args.iter().map(|a| a.map(f)).collect(),
            }),
            Type::Union(items) => make_union(items.iter().map(|t| t.map(f)).collect()),
            Type::Callable(callable) => Type::Callable(Box::new(CallableType {
                params: callable
                    .params
                    .iter()
                    .map(|p| CallableParam {
                        name: p.name.clone(),
                        ty: p.ty.map(f),
                        kind: p.kind,
                    })
                    .collect(),
                ret: callable.ret.map(f),
                type_vars: callable.type_vars.clone(),
                name: callable.name.clone(),
            })),
            other => other.clone(),
        }
    }
}

/// Short name of a dotted fullname
pub fn short_name(fullname: &str) -> &str {
    fullname.rsplit('.').next().unwrap_or(fullname)
}

/// Build a union: flattened, deduplicated, sorted by rendered form with
/// `None` last. Zero items is `Never`, one item is the item itself.
///
/// No subtype simplification happens here; see [`crate::join`].
pub fn make_union(items: Vec<Type>) -> Type {
    let mut flat: Vec<Type> = Vec::new();
    for item in items {
        match item {
            Type::Union(inner) => {
                for t in inner {
                    if !flat.contains(&t) {
                        flat.push(t);
                    }
                }
            }
            Type::Never => {}
            t => {
                if !flat.contains(&t) {
                    flat.push(t);
                }
            }
        }
    }
    if let Some(any) = flat.iter().filter(|t| t.is_any()).min_by_key(|t| match t {
        Type::Any(kind) => *kind,
        _ => AnyKind::Special,
    }) {
        return any.clone();
    }
    sort_canonical(&mut flat);
    match flat.len() {
        0 => Type::Never,
        1 => flat.remove(0),
        _ => Type::Union(flat),
    }
}

pub(crate) fn sort_canonical(items: &mut [Type]) {
    items.sort_by_cached_key(|t| (t.is_none(), t.to_string(), format!("{:?}", t)));
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any(_) => write!(f, "Any"),
            Type::None => write!(f, "None"),
            Type::Never => write!(f, "Never"),
            Type::Instance(inst) => write!(f, "{}", inst),
            Type::Union(items) => {
                let non_none: Vec<&Type> = items.iter().filter(|t| !t.is_none()).collect();
                if non_none.len() == 1 && items.len() == 2 {
                    write!(f, "Optional[{}]", non_none[0])
                } else {
                    write!(f, "Union[{}]", join_display(items.iter()))
                }
            }
            Type::Callable(callable) => write!(f, "{}", callable),
            Type::TypeVar(tv) => write!(f, "{}", tv.name),
            Type::Unresolved { name } => write!(f, "{}?", name),
            Type::ClassObject(inst) => write!(f, "type[{}]", inst),
            Type::Module(name) => write!(f, "Module({})", name),
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", short_name(&self.class))?;
        if !self.args.is_empty() {
            write!(f, "[{}]", join_display(self.args.iter()))?;
        }
        Ok(())
    }
}

impl fmt::Display for CallableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self
            .params
            .iter()
            .all(|p| p.kind == CallableArgKind::Positional);
        if simple {
            write!(
                f,
                "Callable[[{}], {}]",
                join_display(self.params.iter().map(|p| &p.ty)),
                self.ret
            )
        } else {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|p| {
                    let name = p.name.as_deref().unwrap_or("_");
                    match p.kind {
                        CallableArgKind::Positional => format!("{}: {}", name, p.ty),
                        CallableArgKind::Optional => format!("{}: {} = ...", name, p.ty),
                        CallableArgKind::Star => format!("*{}: {}", name, p.ty),
                        CallableArgKind::Named => format!("{}: {}", name, p.ty),
                        CallableArgKind::NamedOptional => format!("{}: {} = ...", name, p.ty),
                        CallableArgKind::StarStar => format!("**{}: {}", name, p.ty),
                    }
                })
                .collect();
            write!(f, "def ({}) -> {}", params.join(", "), self.ret)
        }
    }
}

fn join_display<'a>(items: impl Iterator<Item = &'a Type>) -> String {
    items.map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_canonical_order() {
        let a = make_union(vec![Type::None, Type::named(STR), Type::named(INT)]);
        let b = make_union(vec![Type::named(INT), Type::None, Type::named(STR)]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Union[int, str, None]");
    }

    #[test]
    fn test_union_flattening() {
        let inner = make_union(vec![Type::named(INT), Type::None]);
        let outer = make_union(vec![inner.clone(), Type::named(INT), Type::Never]);
        assert_eq!(outer, inner);
        assert_eq!(outer.to_string(), "Optional[int]");
        assert_eq!(make_union(vec![]), Type::Never);
        assert_eq!(make_union(vec![Type::named(INT)]), Type::named(INT));
    }

    #[test]
    fn test_union_with_any() {
        let t = make_union(vec![Type::named(INT), Type::Any(AnyKind::Unannotated)]);
        assert!(t.is_any());
    }

    #[test]
    fn test_display() {
        let list = Type::instance(LIST, vec![Type::named(INT)]);
        assert_eq!(list.to_string(), "list[int]");
        let callable = Type::Callable(Box::new(CallableType::new(
            vec![CallableParam {
                name: Some("x".into()),
                ty: Type::named(INT),
                kind: CallableArgKind::Positional,
            }],
            Type::named(STR),
        )));
        assert_eq!(callable.to_string(), "Callable[[int], str]");
    }

    #[test]
    fn test_remove_none_and_unresolved() {
        let opt = make_union(vec![Type::named(INT), Type::None]);
        assert_eq!(opt.remove_none(), Type::named(INT));
        let fwd = Type::instance(LIST, vec![Type::Unresolved { name: "A".into() }]);
        assert!(fwd.has_unresolved());
        assert!(!fwd.erase_unresolved().has_unresolved());
    }
}
