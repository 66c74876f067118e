//! Subtype relation
//!
//! `Any` is compatible in both directions. Generic instances follow the
//! declared variance of each class type parameter, callables are
//! contravariant in their parameters and covariant in their return type,
//! and `int` is promoted to `float`.

use crate::env::TypeContext;
use crate::subst::{substitute, TypeBindings};
use crate::types::*;

/// Is `left` compatible with `right`?
pub fn is_subtype(ctx: &dyn TypeContext, left: &Type, right: &Type) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Type::Any(_), _) | (_, Type::Any(_)) => true,
        (Type::Never, _) => true,
        (Type::Unresolved { .. }, _) | (_, Type::Unresolved { .. }) => true,
        (Type::Union(items), _) => items.iter().all(|item| is_subtype(ctx, item, right)),
        (_, Type::Union(items)) => items.iter().any(|item| is_subtype(ctx, left, item)),
        (Type::None, Type::None) => true,
        (Type::None, Type::Instance(inst)) => inst.class == OBJECT || !ctx.strict_optional(),
        (Type::None, _) => !ctx.strict_optional(),
        (_, Type::Never) => false,
        (Type::TypeVar(a), Type::TypeVar(b)) => a.fullname == b.fullname,
        (Type::TypeVar(_), _) => right.is_instance_of(OBJECT),
        (_, Type::TypeVar(_)) => false,
        (Type::Instance(a), Type::Instance(b)) => is_instance_subtype(ctx, a, b),
        (Type::Callable(a), Type::Callable(b)) => is_callable_subtype(ctx, a, b),
        (Type::Callable(_), Type::Instance(b)) => b.class == FUNCTION || b.class == OBJECT,
        (Type::ClassObject(a), Type::ClassObject(b)) => is_instance_subtype(ctx, a, b),
        (Type::ClassObject(_), Type::Instance(b)) => b.class == TYPE || b.class == OBJECT,
        (Type::ClassObject(a), Type::Callable(b)) => {
            is_subtype(ctx, &Type::Instance(a.clone()), &b.ret)
        }
        (Type::Module(_), Type::Instance(b)) => b.class == OBJECT,
        _ => false,
    }
}

/// Mutual subtyping; used for invariant type arguments
pub fn is_same_type(ctx: &dyn TypeContext, a: &Type, b: &Type) -> bool {
    a == b || (is_subtype(ctx, a, b) && is_subtype(ctx, b, a))
}

fn is_instance_subtype(ctx: &dyn TypeContext, left: &Instance, right: &Instance) -> bool {
    if right.class == OBJECT {
        return true;
    }
    if right.class == FLOAT && ctx.map_to_supertype(left, INT).is_some() {
        return true;
    }
    let Some(mapped) = ctx.map_to_supertype(left, &right.class) else {
        return false;
    };
    let variances: Vec<Variance> = match ctx.class_info(&right.class) {
        Some(info) => info.type_vars.iter().map(|tv| tv.variance).collect(),
        None => Vec::new(),
    };
    for (i, right_arg) in right.args.iter().enumerate() {
        let Some(left_arg) = mapped.args.get(i) else {
            continue;
        };
        let ok = match variances.get(i).copied().unwrap_or(Variance::Invariant) {
            Variance::Covariant => is_subtype(ctx, left_arg, right_arg),
            Variance::Contravariant => is_subtype(ctx, right_arg, left_arg),
            Variance::Invariant => is_same_type(ctx, left_arg, right_arg),
        };
        if !ok {
            return false;
        }
    }
    true
}

/// Erase a generic callable's own type variables to `Any`
fn erase_type_vars(callable: &CallableType) -> CallableType {
    if callable.type_vars.is_empty() {
        return callable.clone();
    }
    let bindings: TypeBindings = callable
        .type_vars
        .iter()
        .map(|tv| (tv.fullname.clone(), Type::Any(AnyKind::Special)))
        .collect();
    match substitute(&Type::Callable(Box::new(callable.clone())), &bindings) {
        Ok(Type::Callable(erased)) => *erased,
        _ => callable.clone(),
    }
}

fn is_callable_subtype(ctx: &dyn TypeContext, left: &CallableType, right: &CallableType) -> bool {
    let left = erase_type_vars(left);
    let right = erase_type_vars(right);

    if !is_subtype(ctx, &left.ret, &right.ret) {
        return false;
    }

    let left_star = left.params.iter().find(|p| p.kind == CallableArgKind::Star);
    let left_kwargs = left.params.iter().find(|p| p.kind == CallableArgKind::StarStar);
    let left_pos: Vec<&CallableParam> = left.params.iter().filter(|p| p.kind.is_positional()).collect();
    let right_pos: Vec<&CallableParam> = right.params.iter().filter(|p| p.kind.is_positional()).collect();

    for (i, right_param) in right_pos.iter().enumerate() {
        let accepted = match left_pos.get(i) {
            Some(left_param) => &left_param.ty,
            None => match left_star {
                Some(star) => &star.ty,
                None => return false,
            },
        };
        if !is_subtype(ctx, &right_param.ty, accepted) {
            return false;
        }
    }
    let right_has_star = right.params.iter().any(|p| p.kind == CallableArgKind::Star);
    for left_param in left_pos.iter().skip(right_pos.len()) {
        if left_param.kind.is_required() && !right_has_star {
            return false;
        }
    }
    if right_has_star && left_star.is_none() {
        return false;
    }

    for right_param in right
        .params
        .iter()
        .filter(|p| matches!(p.kind, CallableArgKind::Named | CallableArgKind::NamedOptional))
    {
        let accepted = left
            .params
            .iter()
            .find(|p| p.name == right_param.name && !p.kind.is_star())
            .or(left_kwargs);
        match accepted {
            Some(param) if is_subtype(ctx, &right_param.ty, &param.ty) => {}
            _ => return false,
        }
    }
    for left_param in left.params.iter().filter(|p| p.kind == CallableArgKind::Named) {
        if !right.params.iter().any(|p| p.name == left_param.name) {
            return false;
        }
    }
    if right.params.iter().any(|p| p.kind == CallableArgKind::StarStar) && left_kwargs.is_none() {
        return false;
    }
    true
}
