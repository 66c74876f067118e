//! Least upper bounds
//!
//! `join` is used wherever control flow merges (branches, conditional
//! expressions, collection displays). It is commutative and idempotent;
//! unions come out flattened, simplified and in canonical order.

use crate::env::TypeContext;
use crate::subtype::{is_same_type, is_subtype};
use crate::types::*;
use tracing::warn;

/// Least upper bound of two types
pub fn join(ctx: &dyn TypeContext, a: &Type, b: &Type) -> Type {
    if a == b {
        return a.clone();
    }
    match (a, b) {
        (Type::Any(x), Type::Any(y)) => Type::Any((*x).min(*y)),
        (Type::Any(_), _) => a.clone(),
        (_, Type::Any(_)) => b.clone(),
        (Type::Unresolved { .. }, _) | (_, Type::Unresolved { .. }) => Type::from_error(),
        (Type::Never, _) => b.clone(),
        (_, Type::Never) => a.clone(),
        (Type::Union(_), _) | (_, Type::Union(_)) => {
            let mut items = a.items();
            items.extend(b.items());
            simplify_union(ctx, items)
        }
        (Type::None, other) | (other, Type::None) => {
            if ctx.strict_optional() {
                simplify_union(ctx, vec![other.clone(), Type::None])
            } else {
                other.clone()
            }
        }
        (Type::Instance(x), Type::Instance(y)) => join_instances(ctx, x, y),
        _ => {
            let (x, y) = (fallback_instance(a), fallback_instance(b));
            join_instances(ctx, &x, &y)
        }
    }
}

/// Join of any number of types; `Never` for none
pub fn join_all<'t>(ctx: &dyn TypeContext, types: impl IntoIterator<Item = &'t Type>) -> Type {
    types
        .into_iter()
        .fold(Type::Never, |acc, t| join(ctx, &acc, t))
}

/// Union with redundant members removed: a member that is a proper subtype
/// of another member is dropped
pub fn simplify_union(ctx: &dyn TypeContext, items: Vec<Type>) -> Type {
    let items = match make_union(items) {
        Type::Union(items) => items,
        single => return single,
    };
    let kept: Vec<Type> = items
        .iter()
        .enumerate()
        .filter(|(i, x)| {
            !items.iter().enumerate().any(|(j, y)| {
                j != *i && is_subtype(ctx, x, y) && (!is_subtype(ctx, y, x) || j < *i)
            })
        })
        .map(|(_, x)| x.clone())
        .collect();
    make_union(kept)
}

/// Instance type standing in for non-instance types in a join
fn fallback_instance(ty: &Type) -> Instance {
    let class = match ty {
        Type::Instance(inst) => return inst.clone(),
        Type::Callable(_) => FUNCTION,
        Type::ClassObject(_) => TYPE,
        _ => OBJECT,
    };
    Instance {
        class: class.to_string(),
        args: Vec::new(),
    }
}

/// Deterministic choice between two equivalent types
fn pick_canonical(a: &Type, b: &Type) -> Type {
    let key = |t: &Type| (t.to_string(), format!("{:?}", t));
    if key(a) <= key(b) {
        a.clone()
    } else {
        b.clone()
    }
}

fn join_instances(ctx: &dyn TypeContext, a: &Instance, b: &Instance) -> Type {
    let (ta, tb) = (Type::Instance(a.clone()), Type::Instance(b.clone()));
    let a_sub_b = is_subtype(ctx, &ta, &tb);
    let b_sub_a = is_subtype(ctx, &tb, &ta);
    match (a_sub_b, b_sub_a) {
        (true, true) => return pick_canonical(&ta, &tb),
        (true, false) => return tb,
        (false, true) => return ta,
        (false, false) => {}
    }

    if a.class == b.class {
        return join_same_class(ctx, a, b);
    }

    let Some(common) = nearest_common_base(ctx, &a.class, &b.class) else {
        return object_or_any(ctx, a, b);
    };
    match (
        ctx.map_to_supertype(a, &common),
        ctx.map_to_supertype(b, &common),
    ) {
        (Some(x), Some(y)) => join_same_class(ctx, &x, &y),
        _ => object_or_any(ctx, a, b),
    }
}

/// Common ancestor minimizing the summed MRO positions; ties broken by name
fn nearest_common_base(ctx: &dyn TypeContext, a: &str, b: &str) -> Option<String> {
    let mro_a = &ctx.class_info(a)?.mro;
    let mro_b = &ctx.class_info(b)?.mro;
    mro_a
        .iter()
        .enumerate()
        .filter_map(|(i, name)| {
            mro_b
                .iter()
                .position(|other| other == name)
                .map(|j| (i + j, name.clone()))
        })
        .min()
        .map(|(_, name)| name)
}

fn join_same_class(ctx: &dyn TypeContext, a: &Instance, b: &Instance) -> Type {
    if a.args == b.args {
        return Type::Instance(a.clone());
    }
    let variances: Vec<Variance> = ctx
        .class_info(&a.class)
        .map(|info| info.type_vars.iter().map(|tv| tv.variance).collect())
        .unwrap_or_default();
    let mut args = Vec::with_capacity(a.args.len());
    for (i, (x, y)) in a.args.iter().zip(b.args.iter()).enumerate() {
        if x == y {
            args.push(x.clone());
            continue;
        }
        match variances.get(i).copied().unwrap_or(Variance::Invariant) {
            Variance::Covariant => args.push(join(ctx, x, y)),
            _ if is_same_type(ctx, x, y) => args.push(pick_canonical(x, y)),
            _ => return object_or_any(ctx, a, b),
        }
    }
    Type::Instance(Instance {
        class: a.class.clone(),
        args,
    })
}

fn object_or_any(ctx: &dyn TypeContext, a: &Instance, b: &Instance) -> Type {
    if ctx.has_object() {
        Type::object()
    } else {
        warn!(left = %a, right = %b, "no common supertype, joining to Any");
        Type::Any(AnyKind::Special)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ClassFixture;

    fn sample_types(fx: &ClassFixture) -> Vec<Type> {
        let (a, b, c, d, e) = (
            fx.inst("m.A"),
            fx.inst("m.B"),
            fx.inst("m.C"),
            fx.inst("m.D"),
            fx.inst("m.E"),
        );
        vec![
            Type::Never,
            Type::None,
            Type::Any(AnyKind::Explicit),
            Type::named(INT),
            Type::named(FLOAT),
            Type::named(BOOL),
            Type::named(STR),
            a.clone(),
            b.clone(),
            c.clone(),
            d.clone(),
            e.clone(),
            make_union(vec![Type::named(INT), Type::None]),
            make_union(vec![b.clone(), e.clone()]),
            make_union(vec![Type::named(STR), c.clone(), Type::None]),
            Type::instance(LIST, vec![b.clone()]),
            Type::instance(LIST, vec![c.clone()]),
            Type::instance("m.Box", vec![b.clone()]),
            Type::instance("m.Box", vec![d.clone()]),
            Type::instance("m.Sink", vec![a.clone()]),
        ]
    }

    #[test]
    fn test_join_is_idempotent_and_commutative() {
        let fx = ClassFixture::standard();
        let types = sample_types(&fx);
        for x in &types {
            assert_eq!(join(&fx, x, x), *x, "join({x}, {x})");
            for y in &types {
                assert_eq!(join(&fx, x, y), join(&fx, y, x), "join({x}, {y})");
            }
        }
    }

    #[test]
    fn test_join_is_an_upper_bound() {
        let fx = ClassFixture::standard();
        let types = sample_types(&fx);
        for x in &types {
            for y in &types {
                let j = join(&fx, x, y);
                assert!(is_subtype(&fx, x, &j), "{x} <: join({x}, {y}) = {j}");
                assert!(is_subtype(&fx, y, &j), "{y} <: join({x}, {y}) = {j}");
            }
        }
    }

    #[test]
    fn test_join_instances() {
        let fx = ClassFixture::standard();
        assert_eq!(join(&fx, &fx.inst("m.B"), &fx.inst("m.C")), fx.inst("m.A"));
        assert_eq!(join(&fx, &fx.inst("m.D"), &fx.inst("m.C")), fx.inst("m.A"));
        assert_eq!(join(&fx, &fx.inst("m.D"), &fx.inst("m.B")), fx.inst("m.B"));
        assert_eq!(join(&fx, &fx.inst("m.B"), &fx.inst("m.E")), Type::object());
        assert_eq!(join(&fx, &Type::named(INT), &Type::named(FLOAT)), Type::named(FLOAT));
    }

    #[test]
    fn test_join_optional() {
        let fx = ClassFixture::standard();
        let int = Type::named(INT);
        let joined = join(&fx, &Type::None, &int);
        assert_eq!(joined.to_string(), "Optional[int]");
        let lax = ClassFixture::standard().non_strict();
        assert_eq!(join(&lax, &Type::None, &int), int);
    }

    #[test]
    fn test_join_generic_args() {
        let fx = ClassFixture::standard();
        let list_b = Type::instance(LIST, vec![fx.inst("m.B")]);
        let list_c = Type::instance(LIST, vec![fx.inst("m.C")]);
        assert_eq!(join(&fx, &list_b, &list_c), Type::object());
        let box_b = Type::instance("m.Box", vec![fx.inst("m.B")]);
        let box_c = Type::instance("m.Box", vec![fx.inst("m.C")]);
        assert_eq!(
            join(&fx, &box_b, &box_c),
            Type::instance("m.Box", vec![fx.inst("m.A")])
        );
    }

    #[test]
    fn test_union_simplification() {
        let fx = ClassFixture::standard();
        let u = simplify_union(&fx, vec![fx.inst("m.B"), fx.inst("m.A"), fx.inst("m.D")]);
        assert_eq!(u, fx.inst("m.A"));
        let v = join(
            &fx,
            &make_union(vec![Type::named(INT), Type::None]),
            &Type::named(STR),
        );
        assert_eq!(v.to_string(), "Union[int, str, None]");
    }

    #[test]
    fn test_join_without_object_falls_back_to_any() {
        let fx = ClassFixture::standard().without_object();
        assert!(join(&fx, &fx.inst("m.B"), &fx.inst("m.E")).is_any());
    }
}
